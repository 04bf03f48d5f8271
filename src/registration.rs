use std::{
    fmt::{self, Debug, Display, Formatter},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use crate::{
    context::ResolveContext,
    dispose::{instance_disposer, Dispose, InstanceDisposer},
    errors::ActivateErrorKind,
    factory::FactoryExpression,
    instance::{cast, wrap, Instance},
    lifetime::Lifetime,
    service_type::ServiceType,
    shape::ImplementationType,
};

static NEXT_REGISTRATION: AtomicU64 = AtomicU64::new(1);

pub type RegistrationPredicate = Arc<dyn Fn(&ServiceRegistration) -> bool + Send + Sync>;
pub type DecoratorFactory = Arc<dyn Fn(&ResolveContext, Instance) -> Result<Instance, ActivateErrorKind> + Send + Sync>;
pub type DeferredImplementation = Arc<dyn Fn(&ServiceRegistration) -> Option<ImplementationType> + Send + Sync>;
pub(crate) type InitializeFn = Arc<dyn Fn(&ResolveContext, &Instance) -> Result<(), ActivateErrorKind> + Send + Sync>;

/// Key of a registration: the service type and the lowercased service name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct ServiceKey {
    pub(crate) service_type: ServiceType,
    pub(crate) service_name: String,
}

impl ServiceKey {
    #[inline]
    #[must_use]
    pub(crate) fn new(service_type: ServiceType, service_name: &str) -> Self {
        Self {
            service_type,
            service_name: service_name.to_lowercase(),
        }
    }
}

impl Display for ServiceKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.service_name.is_empty() {
            Display::fmt(&self.service_type, f)
        } else {
            write!(f, "{} ({})", self.service_type, self.service_name)
        }
    }
}

/// How instances of a registered service are produced.
#[derive(Clone)]
pub enum ImplementationSource {
    Type(ImplementationType),
    Factory(FactoryExpression),
    Value(Instance),
}

impl Debug for ImplementationSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type(implementation) => f.debug_tuple("Type").field(implementation).finish(),
            Self::Factory(factory) => f.debug_tuple("Factory").field(factory).finish(),
            Self::Value(_) => f.write_str("Value"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Registration {
    id: u64,
    service_type: ServiceType,
    source: ImplementationSource,
}

impl Registration {
    #[must_use]
    pub fn new(service_type: ServiceType, source: ImplementationSource) -> Self {
        Self {
            id: NEXT_REGISTRATION.fetch_add(1, Ordering::Relaxed),
            service_type,
            source,
        }
    }

    /// Unique per registration. Construction recipes are cached by it.
    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn service_type(&self) -> &ServiceType {
        &self.service_type
    }

    #[inline]
    #[must_use]
    pub fn source(&self) -> &ImplementationSource {
        &self.source
    }

    #[must_use]
    pub fn implementing_type(&self) -> Option<&ServiceType> {
        match &self.source {
            ImplementationSource::Type(implementation) => Some(implementation.implementing_type()),
            ImplementationSource::Factory(factory) => factory.implementing_type(),
            ImplementationSource::Value(_) => None,
        }
    }
}

/// Registration of a service under a name, with its lifetime.
///
/// Two registrations are equal when their service types and case-insensitive names match.
#[derive(Clone)]
pub struct ServiceRegistration {
    registration: Registration,
    service_name: String,
    lifetime: Option<Arc<dyn Lifetime>>,
    is_read_only: bool,
    disposer: Option<InstanceDisposer>,
}

impl ServiceRegistration {
    #[must_use]
    pub fn new(service_type: ServiceType, source: ImplementationSource) -> Self {
        Self {
            registration: Registration::new(service_type, source),
            service_name: String::new(),
            lifetime: None,
            is_read_only: false,
            disposer: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn for_type(service_type: ServiceType, implementation: impl Into<ImplementationType>) -> Self {
        Self::new(service_type, ImplementationSource::Type(implementation.into()))
    }

    #[inline]
    #[must_use]
    pub fn for_factory(service_type: ServiceType, factory: impl Into<FactoryExpression>) -> Self {
        Self::new(service_type, ImplementationSource::Factory(factory.into()))
    }

    /// Registration of a fixed value, returned as is by every request.
    #[inline]
    #[must_use]
    pub fn for_instance<S>(value: Arc<S>) -> Self
    where
        S: ?Sized + Send + Sync + 'static,
    {
        Self::new(ServiceType::of::<S>(), ImplementationSource::Value(wrap(value)))
    }

    #[inline]
    #[must_use]
    pub fn with_name(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = service_name.into();
        self
    }

    #[inline]
    #[must_use]
    pub fn with_lifetime(self, lifetime: impl Lifetime + 'static) -> Self {
        self.with_shared_lifetime(Arc::new(lifetime))
    }

    #[inline]
    #[must_use]
    pub fn with_shared_lifetime(mut self, lifetime: Arc<dyn Lifetime>) -> Self {
        self.lifetime = Some(lifetime);
        self
    }

    /// Marks the registration as not replaceable by later registrations of the same key.
    #[inline]
    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.is_read_only = true;
        self
    }

    /// Disposes instances of the registration through the service type `S`.
    ///
    /// Needed for factories and fixed values: implementations built from a type shape
    /// declare disposability in the shape.
    #[inline]
    #[must_use]
    pub fn disposable<S>(mut self) -> Self
    where
        S: ?Sized + Dispose + 'static,
    {
        self.disposer = Some(instance_disposer::<S>());
        self
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.registration.id()
    }

    #[inline]
    #[must_use]
    pub fn service_type(&self) -> &ServiceType {
        self.registration.service_type()
    }

    #[inline]
    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    #[inline]
    #[must_use]
    pub fn source(&self) -> &ImplementationSource {
        self.registration.source()
    }

    #[inline]
    #[must_use]
    pub fn implementing_type(&self) -> Option<&ServiceType> {
        self.registration.implementing_type()
    }

    #[inline]
    #[must_use]
    pub fn lifetime(&self) -> Option<&Arc<dyn Lifetime>> {
        self.lifetime.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.is_read_only
    }

    #[inline]
    pub(crate) fn key(&self) -> ServiceKey {
        ServiceKey::new(self.service_type().clone(), &self.service_name)
    }

    #[inline]
    pub(crate) fn disposer(&self) -> Option<&InstanceDisposer> {
        self.disposer.as_ref()
    }

    /// Closed version of an open generic registration, with a fresh lifetime of the same kind.
    pub(crate) fn closed(&self, service_type: ServiceType, implementation: ImplementationType) -> Self {
        Self {
            registration: Registration::new(service_type, ImplementationSource::Type(implementation)),
            service_name: self.service_name.clone(),
            lifetime: self.lifetime.as_ref().map(|lifetime| lifetime.fresh()),
            is_read_only: false,
            disposer: self.disposer.clone(),
        }
    }
}

impl PartialEq for ServiceRegistration {
    fn eq(&self, other: &Self) -> bool {
        self.service_type() == other.service_type() && self.service_name.to_lowercase() == other.service_name.to_lowercase()
    }
}

impl Eq for ServiceRegistration {}

impl Debug for ServiceRegistration {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistration")
            .field("id", &self.id())
            .field("service_type", self.service_type())
            .field("service_name", &self.service_name)
            .field("source", self.source())
            .field("lifetime", &self.lifetime.as_ref().map(|lifetime| lifetime.name()))
            .field("is_read_only", &self.is_read_only)
            .finish()
    }
}

#[derive(Clone)]
pub enum DecoratorKind {
    /// Decorator constructed from a type. The constructor parameter of the decorated service type
    /// (or a lazy wrapper of it) receives the decorated instance.
    Type(ImplementationType),
    Factory(DecoratorFactory),
    /// Decorator type computed from the decorated registration.
    Deferred(DeferredImplementation),
}

impl Debug for DecoratorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type(implementation) => f.debug_tuple("Type").field(implementation).finish(),
            Self::Factory(_) => f.write_str("Factory"),
            Self::Deferred(_) => f.write_str("Deferred"),
        }
    }
}

#[derive(Clone)]
pub struct DecoratorRegistration {
    service_type: ServiceType,
    kind: DecoratorKind,
    predicate: Option<RegistrationPredicate>,
    pub(crate) index: usize,
}

impl DecoratorRegistration {
    #[must_use]
    pub fn new(service_type: ServiceType, kind: DecoratorKind) -> Self {
        Self {
            service_type,
            kind,
            predicate: None,
            index: 0,
        }
    }

    #[inline]
    #[must_use]
    pub fn of_type(service_type: ServiceType, implementation: impl Into<ImplementationType>) -> Self {
        Self::new(service_type, DecoratorKind::Type(implementation.into()))
    }

    /// Decorator factory receiving the decorated service.
    #[must_use]
    pub fn factory<S, F, E>(factory: F) -> Self
    where
        S: ?Sized + Send + Sync + 'static,
        F: Fn(&ResolveContext, Arc<S>) -> Result<Arc<S>, E> + Send + Sync + 'static,
        E: Into<ActivateErrorKind> + 'static,
    {
        let service_type = ServiceType::of::<S>();
        let factory: DecoratorFactory = Arc::new(move |context: &ResolveContext, instance: Instance| {
            let decorated = cast::<S>(&instance).ok_or(ActivateErrorKind::IncorrectArgument {
                expected: std::any::type_name::<S>(),
            })?;
            factory(context, decorated).map(wrap).map_err(Into::into)
        });
        Self::new(service_type, DecoratorKind::Factory(factory))
    }

    #[must_use]
    pub fn deferred<F>(service_type: ServiceType, implementation: F) -> Self
    where
        F: Fn(&ServiceRegistration) -> Option<ImplementationType> + Send + Sync + 'static,
    {
        Self::new(service_type, DecoratorKind::Deferred(Arc::new(implementation)))
    }

    /// Restricts the decorator to registrations matching the predicate.
    #[must_use]
    pub fn when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&ServiceRegistration) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    #[inline]
    #[must_use]
    pub fn service_type(&self) -> &ServiceType {
        &self.service_type
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> &DecoratorKind {
        &self.kind
    }

    /// Position in registration order.
    #[inline]
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    #[must_use]
    pub fn is_deferred(&self) -> bool {
        matches!(self.kind, DecoratorKind::Deferred(_))
    }

    #[inline]
    #[must_use]
    pub fn applies_to(&self, registration: &ServiceRegistration) -> bool {
        self.predicate.as_ref().map_or(true, |predicate| predicate(registration))
    }
}

impl Debug for DecoratorRegistration {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoratorRegistration")
            .field("service_type", &self.service_type)
            .field("kind", &self.kind)
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

/// Action run on every new instance of the registrations matching the predicate.
#[derive(Clone)]
pub(crate) struct Initializer {
    pub(crate) predicate: RegistrationPredicate,
    pub(crate) action: InitializeFn,
}
