use std::sync::Arc;

use crate::{
    context::ResolveContext,
    errors::ResolveErrorKind,
    instance::{Activation, Instance},
};

type ResolveFn = dyn Fn(&ResolveContext) -> Result<Instance, ResolveErrorKind> + Send + Sync;

/// Compiled resolution routine of a single `(service type, service name)` pair.
///
/// A resolver is a chain of closures composed once at compile time. Invoking it runs no analysis:
/// every dependency it needs is already compiled into the chain.
#[derive(Clone)]
pub(crate) struct Resolver(Arc<ResolveFn>);

impl Resolver {
    #[inline]
    #[must_use]
    pub(crate) fn new<F>(resolve: F) -> Self
    where
        F: Fn(&ResolveContext) -> Result<Instance, ResolveErrorKind> + Send + Sync + 'static,
    {
        Self(Arc::new(resolve))
    }

    #[inline]
    pub(crate) fn resolve(&self, context: &ResolveContext) -> Result<Instance, ResolveErrorKind> {
        (self.0)(context)
    }
}

/// Step producing a new activation, the unit decorators and lifetimes are composed from.
pub(crate) type ConstructionStep = Arc<dyn Fn(&ResolveContext) -> Result<Activation, ResolveErrorKind> + Send + Sync>;

impl From<ConstructionStep> for Resolver {
    #[inline]
    fn from(step: ConstructionStep) -> Self {
        Self::new(move |context| step(context).map(|activation| activation.instance))
    }
}
