use std::{
    any::type_name,
    sync::{Arc, Weak},
};
use tracing::{debug, error};

use crate::{
    container::ContainerInner,
    dispose::Disposable,
    errors::{ResolveError, ResolveErrorKind},
    instance::{cast, Instance},
    scope::ScopeHandle,
    service_type::ServiceType,
    wrappers::InstanceCollection,
};

/// Resolution operations shared by the container, explicit scopes and the context handed to factories.
pub trait ServiceFactory {
    /// # Errors
    /// Returns a [`ResolveError`] naming the requested service if it can't be resolved or activated.
    fn get_named_instance(&self, service_type: &ServiceType, service_name: &str) -> Result<Instance, ResolveError>;

    /// # Errors
    /// See [`ServiceFactory::get_named_instance`].
    #[inline]
    fn get_instance(&self, service_type: &ServiceType) -> Result<Instance, ResolveError> {
        self.get_named_instance(service_type, "")
    }

    /// Like [`ServiceFactory::get_named_instance`], but any failure yields `None`.
    #[inline]
    fn try_get_named_instance(&self, service_type: &ServiceType, service_name: &str) -> Option<Instance> {
        self.get_named_instance(service_type, service_name).ok()
    }

    #[inline]
    fn try_get_instance(&self, service_type: &ServiceType) -> Option<Instance> {
        self.try_get_named_instance(service_type, "")
    }

    /// Collection of every registered implementation of the service type.
    /// Elements are constructed on first access.
    ///
    /// # Errors
    /// Returns an error if the collection can't be compiled.
    fn get_all_instances(&self, service_type: &ServiceType) -> Result<Arc<InstanceCollection>, ResolveError> {
        let collection_type = ServiceType::collection(service_type.clone());
        let instance = self.get_instance(&collection_type)?;
        cast::<InstanceCollection>(&instance).ok_or_else(|| ResolveError {
            service_type: collection_type,
            service_name: String::new(),
            kind: ResolveErrorKind::IncorrectType {
                expected: type_name::<InstanceCollection>().to_owned(),
            },
        })
    }

    /// # Errors
    /// See [`ServiceFactory::get_named`].
    #[inline]
    fn get<S>(&self) -> Result<Arc<S>, ResolveError>
    where
        Self: Sized,
        S: ?Sized + Send + Sync + 'static,
    {
        self.get_named::<S>("")
    }

    /// # Errors
    /// Returns an error if the service can't be resolved or the resolved instance isn't an `Arc<S>`.
    fn get_named<S>(&self, service_name: &str) -> Result<Arc<S>, ResolveError>
    where
        Self: Sized,
        S: ?Sized + Send + Sync + 'static,
    {
        let service_type = ServiceType::of::<S>();
        let instance = self.get_named_instance(&service_type, service_name)?;
        cast::<S>(&instance).ok_or_else(|| ResolveError {
            service_type,
            service_name: service_name.to_owned(),
            kind: ResolveErrorKind::IncorrectType {
                expected: type_name::<S>().to_owned(),
            },
        })
    }

    #[inline]
    fn try_get<S>(&self) -> Option<Arc<S>>
    where
        Self: Sized,
        S: ?Sized + Send + Sync + 'static,
    {
        let instance = self.try_get_instance(&ServiceType::of::<S>())?;
        cast::<S>(&instance)
    }

    #[inline]
    fn try_get_named<S>(&self, service_name: &str) -> Option<Arc<S>>
    where
        Self: Sized,
        S: ?Sized + Send + Sync + 'static,
    {
        let instance = self.try_get_named_instance(&ServiceType::of::<S>(), service_name)?;
        cast::<S>(&instance)
    }

    /// Every registered implementation of `S`, constructed in registration order.
    ///
    /// # Errors
    /// Returns an error if any of the implementations can't be resolved.
    fn get_all<S>(&self) -> Result<Vec<Arc<S>>, ResolveError>
    where
        Self: Sized,
        S: ?Sized + Send + Sync + 'static,
    {
        self.get_all_instances(&ServiceType::of::<S>())?.cast::<S>()
    }
}

/// Context of a resolution: the container and the scope instances are bound to.
///
/// Factories and decorator factories receive it to resolve further services,
/// and lazy and factory wrappers keep it to resolve later in the same scope.
#[derive(Clone)]
pub struct ResolveContext {
    container: Weak<ContainerInner>,
    scope: Option<ScopeHandle>,
}

impl ResolveContext {
    #[inline]
    #[must_use]
    pub(crate) fn new(container: Weak<ContainerInner>, scope: Option<ScopeHandle>) -> Self {
        Self { container, scope }
    }

    pub(crate) fn container(&self) -> Result<Arc<ContainerInner>, ResolveErrorKind> {
        self.container.upgrade().ok_or(ResolveErrorKind::ContainerDropped)
    }

    /// The explicit scope of the request, otherwise the current scope of the calling thread.
    #[must_use]
    pub fn current_scope(&self) -> Option<ScopeHandle> {
        match &self.scope {
            Some(scope) => Some(scope.clone()),
            None => self.container.upgrade()?.scopes.current(),
        }
    }

    /// Tracks an instance to be disposed together with the container.
    pub(crate) fn track_for_container(&self, disposable: Disposable) -> Result<(), ResolveErrorKind> {
        self.container()?.track(disposable)
    }

    fn request(&self, service_type: &ServiceType, service_name: &str) -> Result<Instance, ResolveError> {
        let container = self.container().map_err(|kind| ResolveError {
            service_type: service_type.clone(),
            service_name: service_name.to_owned(),
            kind,
        })?;
        container.request(service_type, service_name, self)
    }
}

impl ServiceFactory for ResolveContext {
    fn get_named_instance(&self, service_type: &ServiceType, service_name: &str) -> Result<Instance, ResolveError> {
        self.request(service_type, service_name).map_err(|err| {
            error!("{}", err);
            err
        })
    }

    fn try_get_named_instance(&self, service_type: &ServiceType, service_name: &str) -> Option<Instance> {
        match self.request(service_type, service_name) {
            Ok(instance) => Some(instance),
            Err(err) => {
                debug!(%err, "Service not available");
                None
            }
        }
    }
}
