use std::{
    any::type_name,
    fmt::{self, Debug, Formatter},
    marker::PhantomData,
    ops::Deref,
    sync::Arc,
};

use crate::{
    argument::Argument,
    errors::{ActivateErrorKind, ResolveError},
    instance::{cast, Instance},
    service_type::ServiceType,
    wrappers::{Factory, InstanceCollection, Lazy, NamedFactory},
};

fn extract<S>(instance: Option<Instance>) -> Result<Arc<S>, ActivateErrorKind>
where
    S: ?Sized + Send + Sync + 'static,
{
    instance
        .as_ref()
        .and_then(cast::<S>)
        .ok_or(ActivateErrorKind::IncorrectArgument { expected: type_name::<S>() })
}

/// Required dependency on the service `Dep`.
pub struct Inject<Dep: ?Sized>(pub Arc<Dep>);

impl<Dep> Argument for Inject<Dep>
where
    Dep: ?Sized + Send + Sync + 'static,
{
    #[inline]
    fn service_type() -> ServiceType {
        ServiceType::of::<Dep>()
    }

    #[inline]
    fn from_instance(instance: Option<Instance>) -> Result<Self, ActivateErrorKind> {
        extract(instance).map(Self)
    }
}

impl<Dep: ?Sized> Deref for Inject<Dep> {
    type Target = Dep;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<Dep: ?Sized> Clone for Inject<Dep> {
    #[inline]
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<Dep: ?Sized> Debug for Inject<Dep> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Inject").field(&type_name::<Dep>()).finish()
    }
}

/// Dependency on a lazily created `Dep`.
pub struct InjectLazy<Dep: ?Sized> {
    lazy: Arc<Lazy>,
    _marker: PhantomData<fn() -> Arc<Dep>>,
}

impl<Dep> InjectLazy<Dep>
where
    Dep: ?Sized + Send + Sync + 'static,
{
    /// Creates the instance on the first call.
    ///
    /// # Errors
    /// Returns an error if the instance can't be activated.
    #[inline]
    pub fn get(&self) -> Result<Arc<Dep>, ResolveError> {
        self.lazy.cast_value()
    }

    #[inline]
    #[must_use]
    pub fn is_value_created(&self) -> bool {
        self.lazy.is_value_created()
    }
}

impl<Dep> Argument for InjectLazy<Dep>
where
    Dep: ?Sized + Send + Sync + 'static,
{
    #[inline]
    fn service_type() -> ServiceType {
        ServiceType::lazy(ServiceType::of::<Dep>())
    }

    #[inline]
    fn from_instance(instance: Option<Instance>) -> Result<Self, ActivateErrorKind> {
        extract(instance).map(|lazy| Self {
            lazy,
            _marker: PhantomData,
        })
    }
}

/// Dependency on a parameterless factory function of `Dep`.
pub struct InjectFactory<Dep: ?Sized> {
    factory: Arc<Factory>,
    _marker: PhantomData<fn() -> Arc<Dep>>,
}

impl<Dep> InjectFactory<Dep>
where
    Dep: ?Sized + Send + Sync + 'static,
{
    /// # Errors
    /// Returns an error if the instance can't be activated.
    #[inline]
    pub fn create(&self) -> Result<Arc<Dep>, ResolveError> {
        self.factory.cast_create()
    }
}

impl<Dep> Argument for InjectFactory<Dep>
where
    Dep: ?Sized + Send + Sync + 'static,
{
    #[inline]
    fn service_type() -> ServiceType {
        ServiceType::factory(ServiceType::of::<Dep>())
    }

    #[inline]
    fn from_instance(instance: Option<Instance>) -> Result<Self, ActivateErrorKind> {
        extract(instance).map(|factory| Self {
            factory,
            _marker: PhantomData,
        })
    }
}

/// Dependency on a factory function of `Dep` taking a service name.
pub struct InjectNamedFactory<Dep: ?Sized> {
    factory: Arc<NamedFactory>,
    _marker: PhantomData<fn() -> Arc<Dep>>,
}

impl<Dep> InjectNamedFactory<Dep>
where
    Dep: ?Sized + Send + Sync + 'static,
{
    /// # Errors
    /// Returns an error if no service is registered under the name or it can't be activated.
    #[inline]
    pub fn create(&self, service_name: &str) -> Result<Arc<Dep>, ResolveError> {
        self.factory.cast_create(service_name)
    }
}

impl<Dep> Argument for InjectNamedFactory<Dep>
where
    Dep: ?Sized + Send + Sync + 'static,
{
    #[inline]
    fn service_type() -> ServiceType {
        ServiceType::named_factory(ServiceType::of::<Dep>())
    }

    #[inline]
    fn from_instance(instance: Option<Instance>) -> Result<Self, ActivateErrorKind> {
        extract(instance).map(|factory| Self {
            factory,
            _marker: PhantomData,
        })
    }
}

/// Dependency on every registered implementation of `Dep`.
pub struct InjectAll<Dep: ?Sized> {
    collection: Arc<InstanceCollection>,
    _marker: PhantomData<fn() -> Arc<Dep>>,
}

impl<Dep> InjectAll<Dep>
where
    Dep: ?Sized + Send + Sync + 'static,
{
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.collection.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.collection.is_empty()
    }

    /// Constructs the implementations on the first call.
    ///
    /// # Errors
    /// Returns the first error raised while constructing the implementations.
    #[inline]
    pub fn get(&self) -> Result<Vec<Arc<Dep>>, ResolveError> {
        self.collection.cast()
    }
}

impl<Dep> Argument for InjectAll<Dep>
where
    Dep: ?Sized + Send + Sync + 'static,
{
    #[inline]
    fn service_type() -> ServiceType {
        ServiceType::collection(ServiceType::of::<Dep>())
    }

    #[inline]
    fn from_instance(instance: Option<Instance>) -> Result<Self, ActivateErrorKind> {
        extract(instance).map(|collection| Self {
            collection,
            _marker: PhantomData,
        })
    }
}
