use dashmap::DashMap;
use parking_lot::Mutex;
use std::{
    any::{type_name, Any},
    fmt::{self, Debug, Formatter},
    mem,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};
use tracing::{debug, error, info_span};

use crate::{
    compiler::CompileStack,
    config::ContainerOptions,
    construction::{property_dependency, ConstructionInfo},
    context::{ResolveContext, ServiceFactory},
    dispose::Disposable,
    errors::{ActivateErrorKind, ResolveError, ResolveErrorKind},
    factory::{FactoryExpression, FactoryRule, ServiceRequest},
    instance::Instance,
    lifetime::{Lifetime, PerContainerLifetime},
    registration::{DecoratorRegistration, ImplementationSource, Initializer, ServiceKey, ServiceRegistration},
    registry::RegistrationStore,
    resolver::Resolver,
    scope::{Scope, ScopeHandle, ScopeManagers},
    service_type::ServiceType,
    shape::{ImplementationType, TypeShape},
};

pub(crate) struct ContainerInner {
    pub(crate) options: ContainerOptions,
    pub(crate) store: RegistrationStore,
    pub(crate) resolvers: DashMap<ServiceKey, Resolver>,
    pub(crate) construction_infos: DashMap<u64, Arc<ConstructionInfo>>,
    /// Bumped on every invalidation, resolvers compiled across a bump aren't cached.
    pub(crate) generation: AtomicU64,
    pub(crate) scopes: ScopeManagers,
    shapes: DashMap<ServiceType, TypeShape>,
    disposables: Mutex<Vec<Disposable>>,
    is_disposed: AtomicBool,
}

impl ContainerInner {
    fn new(options: ContainerOptions) -> Self {
        Self {
            options,
            store: RegistrationStore::default(),
            resolvers: DashMap::new(),
            construction_infos: DashMap::new(),
            generation: AtomicU64::new(0),
            scopes: ScopeManagers::default(),
            shapes: DashMap::new(),
            disposables: Mutex::new(Vec::new()),
            is_disposed: AtomicBool::new(false),
        }
    }

    /// Resolves a top-level request. Every request compiles with its own stack.
    pub(crate) fn request(&self, service_type: &ServiceType, service_name: &str, context: &ResolveContext) -> Result<Instance, ResolveError> {
        let key = ServiceKey::new(service_type.clone(), service_name);
        let resolved = if self.is_disposed.load(Ordering::Acquire) {
            Err(ResolveErrorKind::ContainerDisposed)
        } else {
            self.resolver(&key, &mut CompileStack::default())
                .and_then(|resolver| resolver.resolve(context))
        };
        resolved.map_err(|kind| ResolveError {
            service_type: service_type.clone(),
            service_name: service_name.to_owned(),
            kind,
        })
    }

    /// Tracks a per-container instance. Once the container is disposed the instance is disposed right away.
    pub(crate) fn track(&self, disposable: Disposable) -> Result<(), ResolveErrorKind> {
        let mut disposables = self.disposables.lock();
        if self.is_disposed.load(Ordering::Acquire) {
            drop(disposables);
            disposable.dispose();
            return Err(ResolveErrorKind::ContainerDisposed);
        }
        disposables.push(disposable);
        Ok(())
    }

    /// Drops every compiled resolver, they may have baked in a dependency shape that changed.
    pub(crate) fn invalidate(&self) {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.resolvers.clear();
        self.construction_infos.clear();
        debug!(generation, "Caches invalidated");
    }

    fn dispose(&self) {
        if self.is_disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let disposables = mem::take(&mut *self.disposables.lock());
        let count = disposables.len();
        for disposable in disposables {
            disposable.dispose();
        }
        debug!(count, "Container disposed");
    }
}

impl Drop for ContainerInner {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Inversion of control container.
///
/// Registrations can be added and replaced at any time, also while other threads resolve services.
/// Resolvers are compiled on the first request of a service and cached until a registration changes.
///
/// Cloning the container is cheap, clones share registrations, caches and instances.
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

impl Container {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(ContainerOptions::default())
    }

    #[inline]
    #[must_use]
    pub fn with_options(options: ContainerOptions) -> Self {
        Self {
            inner: Arc::new(ContainerInner::new(options)),
        }
    }

    #[inline]
    #[must_use]
    pub fn options(&self) -> &ContainerOptions {
        &self.inner.options
    }

    /// Adds or replaces the registration of its service type and name.
    ///
    /// A read-only registration is never replaced, the existing one is returned instead.
    pub fn register(&self, registration: ServiceRegistration) -> Arc<ServiceRegistration> {
        if let ImplementationSource::Type(ImplementationType::Closed(shape)) = registration.source() {
            self.inner.shapes.insert(shape.implementing_type().clone(), shape.clone());
        }
        let span = info_span!(
            "register",
            service_type = %registration.service_type(),
            service_name = registration.service_name()
        );
        let _guard = span.enter();

        let outcome = self.inner.store.register(registration);
        if outcome.is_changed() {
            self.inner.invalidate();
        } else {
            debug!("Read-only registration kept");
        }
        outcome.registration().clone()
    }

    #[inline]
    pub fn register_type(&self, service_type: ServiceType, implementation: impl Into<ImplementationType>) -> Arc<ServiceRegistration> {
        self.register(ServiceRegistration::for_type(service_type, implementation))
    }

    #[inline]
    pub fn register_factory(&self, service_type: ServiceType, factory: impl Into<FactoryExpression>) -> Arc<ServiceRegistration> {
        self.register(ServiceRegistration::for_factory(service_type, factory))
    }

    /// Registers an existing value. Every request returns the same handle.
    #[inline]
    pub fn register_instance<S>(&self, value: Arc<S>) -> Arc<ServiceRegistration>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        self.register_named_instance(value, "")
    }

    pub fn register_named_instance<S>(&self, value: Arc<S>, service_name: impl Into<String>) -> Arc<ServiceRegistration>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        self.register(
            ServiceRegistration::for_instance(value)
                .with_name(service_name)
                .with_lifetime(PerContainerLifetime::default()),
        )
    }

    /// Adds a fallback for services that no registration or built-in strategy provides.
    ///
    /// The predicate receives the requested service type and the lowercased service name.
    /// Each matching request registers the factory under its key with a fresh copy of `lifetime`.
    pub fn register_factory_rule<P, F, E>(&self, predicate: P, factory: F, lifetime: Option<Arc<dyn Lifetime>>)
    where
        P: Fn(&ServiceType, &str) -> bool + Send + Sync + 'static,
        F: Fn(&ServiceRequest<'_>) -> Result<Instance, E> + Send + Sync + 'static,
        E: Into<ActivateErrorKind> + 'static,
    {
        self.inner.store.add_factory_rule(FactoryRule {
            predicate: Arc::new(predicate),
            factory: Arc::new(move |request: &ServiceRequest<'_>| factory(request).map_err(Into::into)),
            lifetime,
        });
        self.inner.invalidate();
    }

    /// Adds shape metadata of a type that isn't registered by type, used by [`Self::inject_properties`].
    pub fn add_type_metadata(&self, shape: TypeShape) {
        self.inner.shapes.insert(shape.implementing_type().clone(), shape);
    }

    /// Adds a decorator. Decorators of a service apply in the order they were added,
    /// the last one being the outermost.
    pub fn decorate(&self, decorator: DecoratorRegistration) {
        let decorator = self.inner.store.add_decorator(decorator);
        debug!(service_type = %decorator.service_type(), index = decorator.index(), "Decorator added");
        self.inner.invalidate();
    }

    /// Adds an action run on each new instance of the registrations matching the predicate,
    /// after decoration and before the instance is handed to its lifetime.
    pub fn initialize<P, F, E>(&self, predicate: P, action: F)
    where
        P: Fn(&ServiceRegistration) -> bool + Send + Sync + 'static,
        F: Fn(&ResolveContext, &Instance) -> Result<(), E> + Send + Sync + 'static,
        E: Into<ActivateErrorKind> + 'static,
    {
        self.inner.store.add_initializer(Initializer {
            predicate: Arc::new(predicate),
            action: Arc::new(move |context: &ResolveContext, instance: &Instance| action(context, instance).map_err(Into::into)),
        });
        self.inner.invalidate();
    }

    /// Begins a child of the calling thread's current scope and makes it current.
    #[must_use]
    pub fn begin_scope(&self) -> Scope {
        let handle = self.inner.scopes.begin();
        debug!(scope_id = handle.id(), parent_id = handle.parent().map(ScopeHandle::id), "Scope began");
        Scope::new(handle, Arc::downgrade(&self.inner))
    }

    #[inline]
    #[must_use]
    pub fn current_scope(&self) -> Option<ScopeHandle> {
        self.inner.scopes.current()
    }

    /// Injects the settable properties of an externally constructed value.
    /// Types without known metadata are returned unchanged.
    ///
    /// # Errors
    /// Returns an error if a required property can't be resolved.
    pub fn inject_properties<T>(&self, mut value: T) -> Result<T, ResolveError>
    where
        T: Send + Sync + 'static,
    {
        let service_type = ServiceType::of::<T>();
        let Some(shape) = self.inner.shapes.get(&service_type).map(|shape| shape.value().clone()) else {
            debug!(%service_type, "No type metadata, properties not injected");
            return Ok(value);
        };

        let properties: Vec<_> = shape.properties().iter().filter_map(property_dependency).collect();
        self.inner
            .inject_properties_into(&mut value as &mut (dyn Any + Send + Sync), &properties, &self.context(), type_name::<T>())
            .map_err(|kind| ResolveError {
                service_type,
                service_name: String::new(),
                kind,
            })?;
        Ok(value)
    }

    /// Whether the request would resolve, compiling its resolver if needed.
    #[must_use]
    pub fn can_get_instance(&self, service_type: &ServiceType, service_name: &str) -> bool {
        let key = ServiceKey::new(service_type.clone(), service_name);
        self.inner.resolver(&key, &mut CompileStack::default()).is_ok()
    }

    /// Compiles the resolvers of every registered service up front.
    /// Open generic registrations are compiled on demand for each closed type.
    ///
    /// # Errors
    /// Returns the first compilation error.
    pub fn compile(&self) -> Result<(), ResolveError> {
        let snapshot = self.inner.store.snapshot();
        let keys = snapshot
            .services()
            .filter(|registration| {
                !matches!(registration.source(), ImplementationSource::Type(implementation) if implementation.is_open())
            })
            .map(|registration| registration.key());

        let mut count = 0;
        for key in keys {
            self.inner.resolver(&key, &mut CompileStack::default()).map_err(|kind| {
                let err = ResolveError {
                    service_type: key.service_type.clone(),
                    service_name: key.service_name.clone(),
                    kind,
                };
                error!("{}", err);
                err
            })?;
            count += 1;
        }
        debug!(count, "Services compiled");
        Ok(())
    }

    /// Creates an instance of a concrete type that may not be registered.
    /// The type is registered as itself, without a lifetime, the first time.
    ///
    /// # Errors
    /// Returns an error if the type or its dependencies can't be resolved.
    pub fn create(&self, shape: TypeShape) -> Result<Instance, ResolveError> {
        let service_type = shape.implementing_type().clone();
        if self.inner.store.snapshot().lookup(&service_type, "").is_none() {
            self.inner.shapes.entry(service_type.clone()).or_insert_with(|| shape.clone());
            self.inner
                .store
                .register_if_absent(ServiceRegistration::for_type(service_type.clone(), shape));
        }
        self.get_instance(&service_type)
    }

    /// Disposes per-container instances in creation order. Later calls do nothing.
    ///
    /// Also called when the last handle of the container is dropped.
    #[inline]
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    #[inline]
    fn context(&self) -> ResolveContext {
        ResolveContext::new(Arc::downgrade(&self.inner), None)
    }
}

impl Default for Container {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceFactory for Container {
    fn get_named_instance(&self, service_type: &ServiceType, service_name: &str) -> Result<Instance, ResolveError> {
        let span = info_span!("get_instance", %service_type, service_name);
        let _guard = span.enter();

        self.inner.request(service_type, service_name, &self.context()).map_err(|err| {
            error!("{}", err);
            err
        })
    }

    fn try_get_named_instance(&self, service_type: &ServiceType, service_name: &str) -> Option<Instance> {
        let span = info_span!("try_get_instance", %service_type, service_name);
        let _guard = span.enter();

        match self.inner.request(service_type, service_name, &self.context()) {
            Ok(instance) => Some(instance),
            Err(err) => {
                debug!(%err, "Service not available");
                None
            }
        }
    }
}

impl Debug for Container {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("options", &self.inner.options)
            .field("services", &self.inner.store.snapshot().services().count())
            .field("compiled", &self.inner.resolvers.len())
            .finish_non_exhaustive()
    }
}
