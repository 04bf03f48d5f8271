//! Structural wrappers synthesized for any service type: lazy values, factory functions and collections.

use std::{
    any::type_name,
    collections::HashMap,
    fmt::{self, Debug, Formatter},
    sync::{Arc, OnceLock},
};

use crate::{
    context::{ResolveContext, ServiceFactory as _},
    errors::{ResolveError, ResolveErrorKind},
    instance::{cast, Instance},
    resolver::Resolver,
    service_type::ServiceType,
};

fn cast_or_error<S>(instance: &Instance, service_type: &ServiceType, service_name: &str) -> Result<Arc<S>, ResolveError>
where
    S: ?Sized + Send + Sync + 'static,
{
    cast::<S>(instance).ok_or_else(|| ResolveError {
        service_type: service_type.clone(),
        service_name: service_name.to_owned(),
        kind: ResolveErrorKind::IncorrectType {
            expected: type_name::<S>().to_owned(),
        },
    })
}

/// Deferred instance of a service, created on the first [`Lazy::value`] call and reused afterwards.
pub struct Lazy {
    service_type: ServiceType,
    service_name: String,
    resolver: Resolver,
    context: ResolveContext,
    value: OnceLock<Instance>,
}

impl Lazy {
    #[inline]
    #[must_use]
    pub(crate) fn new(service_type: ServiceType, service_name: impl Into<String>, resolver: Resolver, context: ResolveContext) -> Self {
        Self {
            service_type,
            service_name: service_name.into(),
            resolver,
            context,
            value: OnceLock::new(),
        }
    }

    /// # Errors
    /// Returns an error if the underlying service can't be activated.
    pub fn value(&self) -> Result<Instance, ResolveError> {
        if let Some(value) = self.value.get() {
            return Ok(value.clone());
        }
        let value = self.resolver.resolve(&self.context).map_err(|kind| ResolveError {
            service_type: self.service_type.clone(),
            service_name: self.service_name.clone(),
            kind,
        })?;
        Ok(self.value.get_or_init(|| value).clone())
    }

    #[inline]
    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    #[inline]
    #[must_use]
    pub fn is_value_created(&self) -> bool {
        self.value.get().is_some()
    }

    #[inline]
    #[must_use]
    pub fn service_type(&self) -> &ServiceType {
        &self.service_type
    }

    pub(crate) fn cast_value<S>(&self) -> Result<Arc<S>, ResolveError>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        cast_or_error(&self.value()?, &self.service_type, &self.service_name)
    }
}

impl Debug for Lazy {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lazy")
            .field("service_type", &self.service_type)
            .field("service_name", &self.service_name)
            .field("is_value_created", &self.is_value_created())
            .finish()
    }
}

/// Parameterless factory function of a service. Every call runs the compiled resolver,
/// so the service's lifetime decides whether a new instance is created.
pub struct Factory {
    service_type: ServiceType,
    service_name: String,
    resolver: Resolver,
    context: ResolveContext,
}

impl Factory {
    #[inline]
    #[must_use]
    pub(crate) fn new(service_type: ServiceType, service_name: impl Into<String>, resolver: Resolver, context: ResolveContext) -> Self {
        Self {
            service_type,
            service_name: service_name.into(),
            resolver,
            context,
        }
    }

    /// # Errors
    /// Returns an error if the service can't be activated.
    pub fn create(&self) -> Result<Instance, ResolveError> {
        self.resolver.resolve(&self.context).map_err(|kind| ResolveError {
            service_type: self.service_type.clone(),
            service_name: self.service_name.clone(),
            kind,
        })
    }

    #[inline]
    #[must_use]
    pub fn service_type(&self) -> &ServiceType {
        &self.service_type
    }

    #[inline]
    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub(crate) fn cast_create<S>(&self) -> Result<Arc<S>, ResolveError>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        cast_or_error(&self.create()?, &self.service_type, &self.service_name)
    }
}

impl Debug for Factory {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Factory")
            .field("service_type", &self.service_type)
            .field("service_name", &self.service_name)
            .finish_non_exhaustive()
    }
}

/// Factory function taking a service name.
///
/// Resolvers of names registered when the factory was compiled are ready to run,
/// other names go through a regular request.
pub struct NamedFactory {
    service_type: ServiceType,
    resolvers: HashMap<String, Resolver>,
    context: ResolveContext,
}

impl NamedFactory {
    #[inline]
    #[must_use]
    pub(crate) fn new(service_type: ServiceType, resolvers: HashMap<String, Resolver>, context: ResolveContext) -> Self {
        Self {
            service_type,
            resolvers,
            context,
        }
    }

    /// # Errors
    /// Returns an error if no service is registered under the name or it can't be activated.
    pub fn create(&self, service_name: &str) -> Result<Instance, ResolveError> {
        match self.resolvers.get(&service_name.to_lowercase()) {
            Some(resolver) => resolver.resolve(&self.context).map_err(|kind| ResolveError {
                service_type: self.service_type.clone(),
                service_name: service_name.to_owned(),
                kind,
            }),
            None => self.context.get_named_instance(&self.service_type, service_name),
        }
    }

    #[inline]
    #[must_use]
    pub fn service_type(&self) -> &ServiceType {
        &self.service_type
    }

    pub(crate) fn cast_create<S>(&self, service_name: &str) -> Result<Arc<S>, ResolveError>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        cast_or_error(&self.create(service_name)?, &self.service_type, service_name)
    }
}

impl Debug for NamedFactory {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.resolvers.keys().collect();
        names.sort();
        f.debug_struct("NamedFactory")
            .field("service_type", &self.service_type)
            .field("names", &names)
            .finish_non_exhaustive()
    }
}

/// All implementations of a service type.
///
/// The element count is known from the start, the elements are constructed once, on first access.
pub struct InstanceCollection {
    element_type: ServiceType,
    resolvers: Vec<Resolver>,
    context: ResolveContext,
    instances: OnceLock<Vec<Instance>>,
}

impl InstanceCollection {
    #[inline]
    #[must_use]
    pub(crate) fn new(element_type: ServiceType, resolvers: Vec<Resolver>, context: ResolveContext) -> Self {
        Self {
            element_type,
            resolvers,
            context,
            instances: OnceLock::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn is_created(&self) -> bool {
        self.instances.get().is_some()
    }

    #[inline]
    #[must_use]
    pub fn element_type(&self) -> &ServiceType {
        &self.element_type
    }

    /// # Errors
    /// Returns the first error raised while constructing the elements.
    pub fn instances(&self) -> Result<&[Instance], ResolveError> {
        if let Some(instances) = self.instances.get() {
            return Ok(instances);
        }
        let instances = self
            .resolvers
            .iter()
            .map(|resolver| resolver.resolve(&self.context))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|kind| ResolveError {
                service_type: ServiceType::collection(self.element_type.clone()),
                service_name: String::new(),
                kind,
            })?;
        Ok(self.instances.get_or_init(|| instances))
    }

    /// # Errors
    /// Returns an error if the elements can't be constructed or one of them isn't an `Arc<S>`.
    pub fn cast<S>(&self) -> Result<Vec<Arc<S>>, ResolveError>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        self.instances()?
            .iter()
            .map(|instance| cast_or_error(instance, &self.element_type, ""))
            .collect()
    }
}

impl Debug for InstanceCollection {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceCollection")
            .field("element_type", &self.element_type)
            .field("len", &self.len())
            .field("is_created", &self.is_created())
            .finish()
    }
}
