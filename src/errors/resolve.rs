use super::{ActivateErrorKind, ConfigurationErrorKind, ScopeErrorKind};
use crate::service_type::ServiceType;

#[derive(thiserror::Error, Debug)]
pub enum ResolveErrorKind {
    #[error("Unresolved dependency: service type {service_type}, service name {service_name:?}")]
    Unresolved { service_type: ServiceType, service_name: String },
    #[error("Failed to resolve {dependency} required by {dependent}")]
    Dependency {
        dependent: String,
        dependency: String,
        #[source]
        source: Box<ResolveErrorKind>,
    },
    #[error("Recursive dependency detected: service type {service_type}, service name {service_name:?}")]
    RecursiveDependency { service_type: ServiceType, service_name: String },
    #[error(transparent)]
    Configuration(#[from] ConfigurationErrorKind),
    #[error(transparent)]
    Scope(#[from] ScopeErrorKind),
    #[error("Activation of {implementing_type} failed")]
    Activate {
        implementing_type: String,
        #[source]
        source: ActivateErrorKind,
    },
    #[error("Incorrect instance type. Expected handle of {expected}")]
    IncorrectType { expected: String },
    #[error("Container has been dropped")]
    ContainerDropped,
    #[error("Container has been disposed")]
    ContainerDisposed,
}

impl ResolveErrorKind {
    /// Innermost cause, skipping the dependency chain wrappers.
    #[must_use]
    pub fn root(&self) -> &ResolveErrorKind {
        match self {
            Self::Dependency { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Error of a top-level request, naming the requested service regardless of how deep the failure occurred.
#[derive(thiserror::Error, Debug)]
#[error("Unable to resolve type {service_type}, service name {service_name:?}")]
pub struct ResolveError {
    pub service_type: ServiceType,
    pub service_name: String,
    #[source]
    pub kind: ResolveErrorKind,
}

impl ResolveError {
    #[inline]
    #[must_use]
    pub fn kind(&self) -> &ResolveErrorKind {
        &self.kind
    }

    #[inline]
    #[must_use]
    pub fn root_kind(&self) -> &ResolveErrorKind {
        self.kind.root()
    }
}
