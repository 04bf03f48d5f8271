use crate::service_type::ServiceType;

#[derive(thiserror::Error, Debug, Clone)]
pub enum ConfigurationErrorKind {
    #[error("No public constructor found for type {implementing_type}")]
    NoPublicConstructor { implementing_type: ServiceType },
    #[error("Type {implementing_type} isn't assignable to service type {service_type}")]
    NotAssignable {
        implementing_type: ServiceType,
        service_type: ServiceType,
    },
    #[error(
        "Factory expression for {implementing_type} passes {actual} arguments, but the constructor expects {expected}"
    )]
    FactoryArgumentCount {
        implementing_type: ServiceType,
        expected: usize,
        actual: usize,
    },
    #[error("Factory expression initializes unknown or read-only property {property} of {implementing_type}")]
    FactoryUnknownProperty {
        implementing_type: ServiceType,
        property: String,
    },
    #[error("Type {service_type} isn't an open generic definition")]
    NotGenericDefinition { service_type: ServiceType },
    #[error("Generic definition {service_type} expects {expected} type arguments, got {actual}")]
    GenericArity {
        service_type: ServiceType,
        expected: usize,
        actual: usize,
    },
    #[error("Open generic implementation {implementing_type} can't be activated before it's closed")]
    OpenImplementation { implementing_type: ServiceType },
    #[error("Decorator {decorator_type} has no constructor parameter of the decorated service type {service_type}")]
    DecoratorTarget {
        decorator_type: ServiceType,
        service_type: ServiceType,
    },
}
