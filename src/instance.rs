//! Type-erased service instances.
//!
//! An [`Instance`] always carries the service handle `Arc<S>` of its service type `S`,
//! so `dyn Trait` services and concrete ones share a single representation.

use std::{any::Any, sync::Arc};

use crate::dispose::Disposable;

pub type Instance = Arc<dyn Any + Send + Sync>;

#[inline]
#[must_use]
pub fn wrap<S>(handle: Arc<S>) -> Instance
where
    S: ?Sized + Send + Sync + 'static,
{
    Arc::new(handle)
}

#[inline]
#[must_use]
pub fn cast<S>(instance: &Instance) -> Option<Arc<S>>
where
    S: ?Sized + Send + Sync + 'static,
{
    instance.downcast_ref::<Arc<S>>().cloned()
}

/// Result of a construction step: the instance and, if it's disposable, its disposal handle.
#[derive(Clone)]
pub struct Activation {
    pub instance: Instance,
    pub disposable: Option<Disposable>,
}

impl Activation {
    #[inline]
    #[must_use]
    pub fn new(instance: Instance) -> Self {
        Self {
            instance,
            disposable: None,
        }
    }
}
