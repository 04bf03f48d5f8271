//! Scopes: disposal boundaries of per-scope and per-request instances.
//!
//! Each thread has its own stack of scopes per container. [`crate::Container::begin_scope`] pushes a child
//! of the calling thread's current scope, ending it pops it. A scope can also be used explicitly,
//! resolving through [`Scope`] binds instances to it regardless of the calling thread.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::{
    fmt::{self, Debug, Formatter},
    mem,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Weak,
    },
    thread::{self, ThreadId},
};
use tracing::{debug, info_span, warn};

use crate::{
    container::ContainerInner,
    context::{ResolveContext, ServiceFactory},
    dispose::Disposable,
    errors::{ResolveError, ResolveErrorKind, ScopeErrorKind},
    instance::Instance,
    service_type::ServiceType,
};

static NEXT_SCOPE: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeState {
    Active,
    Completing,
    Ended,
}

type CompletedCallback = Box<dyn FnOnce(&ScopeHandle) + Send>;

struct ScopeInner {
    id: u64,
    parent: Option<ScopeHandle>,
    child: Mutex<Weak<ScopeInner>>,
    state: Mutex<ScopeState>,
    disposables: Mutex<Vec<Disposable>>,
    completed: Mutex<Vec<CompletedCallback>>,
    /// Set when the guard is dropped while a child is active, the scope then ends with its child.
    is_abandoned: AtomicBool,
    manager: Weak<ScopeManager>,
}

/// Shared handle of a scope.
#[derive(Clone)]
pub struct ScopeHandle(Arc<ScopeInner>);

impl ScopeHandle {
    fn new(parent: Option<ScopeHandle>, manager: Weak<ScopeManager>) -> Self {
        let scope = Self(Arc::new(ScopeInner {
            id: NEXT_SCOPE.fetch_add(1, Ordering::Relaxed),
            parent,
            child: Mutex::new(Weak::new()),
            state: Mutex::new(ScopeState::Active),
            disposables: Mutex::new(Vec::new()),
            completed: Mutex::new(Vec::new()),
            is_abandoned: AtomicBool::new(false),
            manager,
        }));
        if let Some(parent) = &scope.0.parent {
            *parent.0.child.lock() = Arc::downgrade(&scope.0);
        }
        scope
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.0.id
    }

    #[inline]
    #[must_use]
    pub fn state(&self) -> ScopeState {
        *self.0.state.lock()
    }

    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<&ScopeHandle> {
        self.0.parent.as_ref()
    }

    /// Tracks an instance to be disposed when the scope ends.
    ///
    /// # Errors
    /// Returns [`ScopeErrorKind::Ended`] if the scope is no longer active.
    pub fn track(&self, disposable: Disposable) -> Result<(), ScopeErrorKind> {
        let state = self.0.state.lock();
        if *state != ScopeState::Active {
            return Err(ScopeErrorKind::Ended { scope_id: self.0.id });
        }
        self.0.disposables.lock().push(disposable);
        Ok(())
    }

    /// Subscribes to the completion of the scope.
    /// Callbacks run after the tracked instances are disposed, in subscription order.
    ///
    /// # Errors
    /// Returns [`ScopeErrorKind::Ended`] if the scope is no longer active.
    pub fn on_completed<F>(&self, callback: F) -> Result<(), ScopeErrorKind>
    where
        F: FnOnce(&ScopeHandle) + Send + 'static,
    {
        let state = self.0.state.lock();
        if *state != ScopeState::Active {
            return Err(ScopeErrorKind::Ended { scope_id: self.0.id });
        }
        self.0.completed.lock().push(Box::new(callback));
        Ok(())
    }

    /// Ends the scope: disposes tracked instances in the order they were tracked,
    /// notifies subscribers and makes the parent scope current again. Ending an ended scope does nothing.
    ///
    /// A parent whose guard was dropped while this scope was active ends right after it.
    ///
    /// # Errors
    /// Returns [`ScopeErrorKind::ActiveChildScope`] if a child scope hasn't ended yet.
    pub fn end(&self) -> Result<(), ScopeErrorKind> {
        {
            let mut state = self.0.state.lock();
            if *state != ScopeState::Active {
                return Ok(());
            }
            if let Some(child) = self.0.child.lock().upgrade() {
                if *child.state.lock() != ScopeState::Ended {
                    return Err(ScopeErrorKind::ActiveChildScope {
                        scope_id: self.0.id,
                        child_id: child.id,
                    });
                }
            }
            *state = ScopeState::Completing;
        }

        let disposables = mem::take(&mut *self.0.disposables.lock());
        debug!(scope_id = self.0.id, count = disposables.len(), "Disposing scoped instances");
        for disposable in disposables {
            disposable.dispose();
        }

        let callbacks = mem::take(&mut *self.0.completed.lock());
        for callback in callbacks {
            callback(self);
        }

        if let Some(manager) = self.0.manager.upgrade() {
            manager.pop(self);
        }
        if let Some(parent) = &self.0.parent {
            let mut child = parent.0.child.lock();
            if child.as_ptr() == Arc::as_ptr(&self.0) {
                *child = Weak::new();
            }
        }

        *self.0.state.lock() = ScopeState::Ended;
        debug!(scope_id = self.0.id, "Scope ended");

        if let Some(parent) = self.0.parent.as_ref().filter(|parent| parent.0.is_abandoned.load(Ordering::Acquire)) {
            debug!(scope_id = parent.0.id, "Ending abandoned parent scope");
            if let Err(err) = parent.end() {
                warn!(scope_id = parent.0.id, %err, "Abandoned parent scope not ended");
            }
        }
        Ok(())
    }

    fn abandon(&self) {
        self.0.is_abandoned.store(true, Ordering::Release);
    }
}

impl PartialEq for ScopeHandle {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for ScopeHandle {}

impl Debug for ScopeHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeHandle")
            .field("id", &self.0.id)
            .field("state", &self.state())
            .field("parent", &self.0.parent.as_ref().map(ScopeHandle::id))
            .finish()
    }
}

type Managers = DashMap<ThreadId, Arc<ScopeManager>>;

/// Scope stack of a single thread.
struct ScopeManager {
    thread: ThreadId,
    current: Mutex<Option<ScopeHandle>>,
    managers: Weak<Managers>,
}

impl ScopeManager {
    fn begin(self: &Arc<Self>) -> ScopeHandle {
        let mut current = self.current.lock();
        let scope = ScopeHandle::new(current.clone(), Arc::downgrade(self));
        *current = Some(scope.clone());
        scope
    }

    /// Makes the parent of the scope current. The manager of a thread left without a scope is removed.
    fn pop(&self, scope: &ScopeHandle) {
        let is_empty = {
            let mut current = self.current.lock();
            if current.as_ref() == Some(scope) {
                *current = scope.parent().cloned();
            }
            current.is_none()
        };
        if !is_empty {
            return;
        }
        if let Some(managers) = self.managers.upgrade() {
            if managers
                .remove_if(&self.thread, |_, manager| manager.current.lock().is_none())
                .is_some()
            {
                debug!(thread = ?self.thread, "Scope manager removed");
            }
        }
    }
}

/// Scope stacks of a container, one per thread.
#[derive(Default)]
pub(crate) struct ScopeManagers {
    managers: Arc<Managers>,
}

impl ScopeManagers {
    pub(crate) fn current(&self) -> Option<ScopeHandle> {
        let manager = self.managers.get(&thread::current().id())?.clone();
        let current = manager.current.lock().clone();
        current
    }

    /// Begins a scope on the calling thread. The entry stays locked while the scope is pushed,
    /// so a scope ended concurrently from another thread can't remove the manager in between.
    pub(crate) fn begin(&self) -> ScopeHandle {
        let thread = thread::current().id();
        let manager = self.managers.entry(thread).or_insert_with(|| {
            Arc::new(ScopeManager {
                thread,
                current: Mutex::new(None),
                managers: Arc::downgrade(&self.managers),
            })
        });
        manager.begin()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.managers.len()
    }
}

/// Scope guard returned by [`crate::Container::begin_scope`]. Ends the scope when dropped.
///
/// Resolving through the guard binds per-scope and per-request instances to this scope,
/// whichever scope is current on the calling thread.
pub struct Scope {
    handle: ScopeHandle,
    container: Weak<ContainerInner>,
}

impl Scope {
    #[inline]
    #[must_use]
    pub(crate) fn new(handle: ScopeHandle, container: Weak<ContainerInner>) -> Self {
        Self { handle, container }
    }

    #[inline]
    #[must_use]
    pub fn handle(&self) -> &ScopeHandle {
        &self.handle
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.handle.id()
    }

    /// # Errors
    /// Returns [`ScopeErrorKind::ActiveChildScope`] if a child scope hasn't ended yet.
    #[inline]
    pub fn dispose(&self) -> Result<(), ScopeErrorKind> {
        self.handle.end()
    }

    /// See [`ScopeHandle::on_completed`].
    ///
    /// # Errors
    /// Returns [`ScopeErrorKind::Ended`] if the scope is no longer active.
    #[inline]
    pub fn on_completed<F>(&self, callback: F) -> Result<(), ScopeErrorKind>
    where
        F: FnOnce(&ScopeHandle) + Send + 'static,
    {
        self.handle.on_completed(callback)
    }

    fn context(&self, service_type: &ServiceType, service_name: &str) -> Result<ResolveContext, ResolveError> {
        if self.handle.state() != ScopeState::Active {
            return Err(ResolveError {
                service_type: service_type.clone(),
                service_name: service_name.to_owned(),
                kind: ResolveErrorKind::Scope(ScopeErrorKind::Ended { scope_id: self.handle.id() }),
            });
        }
        Ok(ResolveContext::new(self.container.clone(), Some(self.handle.clone())))
    }
}

impl ServiceFactory for Scope {
    fn get_named_instance(&self, service_type: &ServiceType, service_name: &str) -> Result<Instance, ResolveError> {
        let span = info_span!("get_instance", %service_type, service_name, scope_id = self.handle.id());
        let _guard = span.enter();

        self.context(service_type, service_name)?.get_named_instance(service_type, service_name)
    }

    fn try_get_named_instance(&self, service_type: &ServiceType, service_name: &str) -> Option<Instance> {
        self.context(service_type, service_name)
            .ok()?
            .try_get_named_instance(service_type, service_name)
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        match self.handle.end() {
            Ok(()) => {}
            Err(err @ ScopeErrorKind::ActiveChildScope { .. }) => {
                warn!(scope_id = self.handle.id(), %err, "Scope dropped with an active child, it ends with the child");
                self.handle.abandon();
            }
            Err(err) => warn!(scope_id = self.handle.id(), %err, "Scope dropped without being ended"),
        }
    }
}

impl Debug for Scope {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Scope").field(&self.handle).finish()
    }
}
