#[macro_use]
pub(crate) mod macros;

pub(crate) mod activator;
pub(crate) mod argument;
pub(crate) mod compiler;
pub(crate) mod config;
pub(crate) mod construction;
pub(crate) mod container;
pub(crate) mod context;
pub(crate) mod decorator;
pub(crate) mod dispose;
pub(crate) mod errors;
pub(crate) mod factory;
pub(crate) mod generic;
pub(crate) mod inject;
pub(crate) mod instance;
pub(crate) mod lifetime;
pub(crate) mod registration;
pub(crate) mod registry;
pub(crate) mod resolver;
pub(crate) mod scope;
pub(crate) mod service_type;
pub(crate) mod shape;
pub(crate) mod wrappers;

pub use activator::Activator;
pub use argument::{Argument, Arguments};
pub use config::ContainerOptions;
pub use container::Container;
pub use context::{ResolveContext, ServiceFactory};
pub use dispose::{Disposable, Dispose};
pub use errors::{ActivateErrorKind, ConfigurationErrorKind, ResolveError, ResolveErrorKind, ScopeErrorKind};
pub use factory::{ArgumentExpression, FactoryDelegate, FactoryExpression, NewExpression, ServiceRequest};
pub use inject::{Inject, InjectAll, InjectFactory, InjectLazy, InjectNamedFactory};
pub use instance::{cast, wrap, Activation, Instance};
pub use lifetime::{Lifetime, PerContainerLifetime, PerRequestLifetime, PerScopeLifetime};
pub use registration::{
    DecoratorFactory, DecoratorKind, DecoratorRegistration, DeferredImplementation, ImplementationSource, Registration,
    RegistrationPredicate, ServiceRegistration,
};
pub use scope::{Scope, ScopeHandle, ScopeState};
pub use service_type::ServiceType;
pub use shape::{Constructor, ImplementationType, OpenGenericImplementation, Parameter, Property, TypeShape, TypeShapeBuilder};
pub use wrappers::{Factory, InstanceCollection, Lazy, NamedFactory};
