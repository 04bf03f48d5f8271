//! Reuse and disposal policies of service instances.
//!
//! A registration without a lifetime is transient: every request creates a new instance
//! and the container never disposes it.

use parking_lot::{Mutex, ReentrantMutex, RwLock};
use std::{
    collections::HashMap,
    fmt::{self, Debug, Formatter},
    sync::{Arc, Weak},
};
use tracing::debug;

use crate::{
    context::ResolveContext,
    errors::{ResolveErrorKind, ScopeErrorKind},
    instance::{Activation, Instance},
};

/// Reuse policy wrapped around the construction of a service.
pub trait Lifetime: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns the reused instance, calling `create` when a new one is needed.
    ///
    /// # Errors
    /// Returns the error of `create`, or a scope error if the lifetime needs a scope that isn't active.
    fn get_instance(
        &self,
        create: &dyn Fn() -> Result<Activation, ResolveErrorKind>,
        context: &ResolveContext,
    ) -> Result<Instance, ResolveErrorKind>;

    /// New lifetime of the same kind with no instances, used for each closed version of an open generic service.
    fn fresh(&self) -> Arc<dyn Lifetime>;
}

/// One instance for the whole life of the container, disposed with the container.
#[derive(Default)]
pub struct PerContainerLifetime {
    instance: RwLock<Option<Instance>>,
    create_lock: ReentrantMutex<()>,
}

impl Lifetime for PerContainerLifetime {
    #[inline]
    fn name(&self) -> &'static str {
        "PerContainer"
    }

    fn get_instance(
        &self,
        create: &dyn Fn() -> Result<Activation, ResolveErrorKind>,
        context: &ResolveContext,
    ) -> Result<Instance, ResolveErrorKind> {
        if let Some(instance) = &*self.instance.read() {
            return Ok(instance.clone());
        }

        let _guard = self.create_lock.lock();
        if let Some(instance) = &*self.instance.read() {
            return Ok(instance.clone());
        }

        let Activation { instance, disposable } = create()?;
        if let Some(disposable) = disposable {
            context.track_for_container(disposable)?;
        }
        *self.instance.write() = Some(instance.clone());
        Ok(instance)
    }

    #[inline]
    fn fresh(&self) -> Arc<dyn Lifetime> {
        Arc::new(Self::default())
    }
}

impl Debug for PerContainerLifetime {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("PerContainerLifetime")
            .field("is_created", &self.instance.read().is_some())
            .finish()
    }
}

/// One instance per active scope, disposed and forgotten when the scope ends.
#[derive(Default)]
pub struct PerScopeLifetime {
    instances: Arc<Mutex<HashMap<u64, Instance>>>,
    create_lock: ReentrantMutex<()>,
}

impl PerScopeLifetime {
    #[inline]
    fn cached(&self, scope_id: u64) -> Option<Instance> {
        self.instances.lock().get(&scope_id).cloned()
    }
}

impl Lifetime for PerScopeLifetime {
    #[inline]
    fn name(&self) -> &'static str {
        "PerScope"
    }

    fn get_instance(
        &self,
        create: &dyn Fn() -> Result<Activation, ResolveErrorKind>,
        context: &ResolveContext,
    ) -> Result<Instance, ResolveErrorKind> {
        let scope = context.current_scope().ok_or(ScopeErrorKind::NoActiveScope { lifetime: self.name() })?;
        if let Some(instance) = self.cached(scope.id()) {
            return Ok(instance);
        }

        let _guard = self.create_lock.lock();
        if let Some(instance) = self.cached(scope.id()) {
            return Ok(instance);
        }

        let Activation { instance, disposable } = create()?;
        if let Some(disposable) = disposable {
            scope.track(disposable)?;
        }
        let instances: Weak<Mutex<HashMap<u64, Instance>>> = Arc::downgrade(&self.instances);
        scope.on_completed(move |scope| {
            if let Some(instances) = instances.upgrade() {
                instances.lock().remove(&scope.id());
                debug!(scope_id = scope.id(), "Scoped instance released");
            }
        })?;
        self.instances.lock().insert(scope.id(), instance.clone());
        Ok(instance)
    }

    #[inline]
    fn fresh(&self) -> Arc<dyn Lifetime> {
        Arc::new(Self::default())
    }
}

impl Debug for PerScopeLifetime {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("PerScopeLifetime")
            .field("scopes", &self.instances.lock().len())
            .finish()
    }
}

/// New instance per request. Disposable instances are tracked by the active scope,
/// so resolving one outside of a scope is an error.
#[derive(Debug, Default, Clone, Copy)]
pub struct PerRequestLifetime;

impl Lifetime for PerRequestLifetime {
    #[inline]
    fn name(&self) -> &'static str {
        "PerRequest"
    }

    fn get_instance(
        &self,
        create: &dyn Fn() -> Result<Activation, ResolveErrorKind>,
        context: &ResolveContext,
    ) -> Result<Instance, ResolveErrorKind> {
        let Activation { instance, disposable } = create()?;
        if let Some(disposable) = disposable {
            let scope = context.current_scope().ok_or(ScopeErrorKind::NoActiveScope { lifetime: self.name() })?;
            scope.track(disposable)?;
        }
        Ok(instance)
    }

    #[inline]
    fn fresh(&self) -> Arc<dyn Lifetime> {
        Arc::new(Self)
    }
}
