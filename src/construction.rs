//! Construction recipes: the constructor to call and the dependencies to resolve for it.

use std::{
    borrow::Cow,
    fmt::{self, Debug, Formatter},
};
use tracing::debug;

use crate::{
    errors::ConfigurationErrorKind,
    factory::{ArgumentExpression, FactoryDelegate, FactoryExpression, NewExpression},
    instance::Instance,
    registration::{ImplementationSource, ServiceRegistration},
    service_type::ServiceType,
    shape::{Constructor, Parameter, Property, SetterFn, TypeShape},
};

/// Dependency of a constructor parameter or a property.
#[derive(Clone)]
pub(crate) struct Dependency {
    pub(crate) service_type: ServiceType,
    pub(crate) service_name: String,
    pub(crate) is_required: bool,
    /// Inline factory sub-expression producing the value instead of a container request.
    pub(crate) factory: Option<ArgumentExpression>,
}

impl Dependency {
    fn from_argument(parameter_type: &ServiceType, is_required: bool, argument: &ArgumentExpression) -> Self {
        match argument {
            ArgumentExpression::Resolve { service_type, service_name } => Self {
                service_type: service_type.clone(),
                service_name: service_name.clone(),
                is_required,
                factory: None,
            },
            ArgumentExpression::Value(_) | ArgumentExpression::Call(_) => Self {
                service_type: parameter_type.clone(),
                service_name: String::new(),
                is_required,
                factory: Some(argument.clone()),
            },
        }
    }

    fn from_parameter(parameter: &Parameter) -> Self {
        Self {
            service_type: parameter.service_type.clone(),
            service_name: String::new(),
            is_required: parameter.is_required,
            factory: None,
        }
    }
}

impl Debug for Dependency {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependency")
            .field("service_type", &self.service_type)
            .field("service_name", &self.service_name)
            .field("is_required", &self.is_required)
            .field("factory", &self.factory)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ConstructorDependency {
    pub(crate) dependency: Dependency,
    /// The parameter receives the decorated instance.
    pub(crate) is_decorator_target: bool,
}

#[derive(Clone)]
pub(crate) struct PropertyDependency {
    pub(crate) name: Cow<'static, str>,
    pub(crate) dependency: Dependency,
    pub(crate) setter: SetterFn,
}

impl Debug for PropertyDependency {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyDependency")
            .field("name", &self.name)
            .field("dependency", &self.dependency)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub(crate) enum Construction {
    Constructor { shape: TypeShape, constructor: Constructor },
    Delegate(FactoryDelegate),
    Value(Instance),
}

/// Construction recipe of a registration, independent of its lifetime and decorators.
#[derive(Clone)]
pub(crate) struct ConstructionInfo {
    pub(crate) construction: Construction,
    pub(crate) constructor_dependencies: Vec<ConstructorDependency>,
    pub(crate) property_dependencies: Vec<PropertyDependency>,
}

impl ConstructionInfo {
    /// Builds the recipe of a registration.
    ///
    /// # Errors
    /// Returns a [`ConfigurationErrorKind`] if the implementation has no constructor, is an open generic,
    /// or a factory expression doesn't match the implementation's shape.
    pub(crate) fn build(registration: &ServiceRegistration, inject_properties: bool) -> Result<Self, ConfigurationErrorKind> {
        match registration.source() {
            ImplementationSource::Type(implementation) => Self::from_shape(implementation.shape()?, inject_properties),
            ImplementationSource::Factory(FactoryExpression::New(expression)) => Self::from_new_expression(expression),
            ImplementationSource::Factory(FactoryExpression::Opaque(delegate)) => Ok(Self::leaf(Construction::Delegate(delegate.clone()))),
            ImplementationSource::Value(instance) => Ok(Self::leaf(Construction::Value(instance.clone()))),
        }
    }

    /// Recipe of a type: the constructor with the most parameters, ties going to the first declared,
    /// and every settable property if property injection is on.
    pub(crate) fn from_shape(shape: &TypeShape, inject_properties: bool) -> Result<Self, ConfigurationErrorKind> {
        let constructor = select_constructor(shape)?;
        debug!(
            implementing_type = %shape.implementing_type(),
            parameters = constructor.parameters().len(),
            "Constructor selected"
        );

        let constructor_dependencies = constructor
            .parameters()
            .iter()
            .map(|parameter| ConstructorDependency {
                dependency: Dependency::from_parameter(parameter),
                is_decorator_target: false,
            })
            .collect();
        let property_dependencies = if inject_properties {
            shape.properties().iter().filter_map(property_dependency).collect()
        } else {
            Vec::new()
        };

        Ok(Self {
            construction: Construction::Constructor {
                shape: shape.clone(),
                constructor: constructor.clone(),
            },
            constructor_dependencies,
            property_dependencies,
        })
    }

    fn from_new_expression(expression: &NewExpression) -> Result<Self, ConfigurationErrorKind> {
        let shape = &expression.shape;
        let implementing_type = shape.implementing_type();
        let constructors = shape.constructors();
        let constructor = match expression.constructor {
            Some(index) => constructors.get(index),
            None => constructors
                .iter()
                .find(|constructor| constructor.parameters().len() == expression.arguments.len())
                .or_else(|| constructors.first()),
        }
        .ok_or_else(|| ConfigurationErrorKind::NoPublicConstructor {
            implementing_type: implementing_type.clone(),
        })?;

        if constructor.parameters().len() != expression.arguments.len() {
            return Err(ConfigurationErrorKind::FactoryArgumentCount {
                implementing_type: implementing_type.clone(),
                expected: constructor.parameters().len(),
                actual: expression.arguments.len(),
            });
        }

        let constructor_dependencies = constructor
            .parameters()
            .iter()
            .zip(&expression.arguments)
            .map(|(parameter, argument)| ConstructorDependency {
                dependency: Dependency::from_argument(&parameter.service_type, parameter.is_required, argument),
                is_decorator_target: false,
            })
            .collect();

        let property_dependencies = expression
            .initializers
            .iter()
            .map(|(name, argument)| {
                let property = shape
                    .properties()
                    .iter()
                    .find(|property| property.name == *name && property.is_settable())
                    .ok_or_else(|| ConfigurationErrorKind::FactoryUnknownProperty {
                        implementing_type: implementing_type.clone(),
                        property: name.to_string(),
                    })?;
                let mut dependency = property_dependency(property).ok_or_else(|| ConfigurationErrorKind::FactoryUnknownProperty {
                    implementing_type: implementing_type.clone(),
                    property: name.to_string(),
                })?;
                dependency.dependency = Dependency::from_argument(&property.service_type, property.is_required, argument);
                Ok::<_, ConfigurationErrorKind>(dependency)
            })
            .collect::<Result<_, _>>()?;

        Ok(Self {
            construction: Construction::Constructor {
                shape: shape.clone(),
                constructor: constructor.clone(),
            },
            constructor_dependencies,
            property_dependencies,
        })
    }

    fn leaf(construction: Construction) -> Self {
        Self {
            construction,
            constructor_dependencies: Vec::new(),
            property_dependencies: Vec::new(),
        }
    }

    #[inline]
    pub(crate) fn implementing_type(&self) -> Option<&ServiceType> {
        match &self.construction {
            Construction::Constructor { shape, .. } => Some(shape.implementing_type()),
            Construction::Delegate(_) | Construction::Value(_) => None,
        }
    }

    /// Marks the constructor parameters receiving the decorated service, directly or through a lazy wrapper.
    /// Returns whether any parameter matched.
    pub(crate) fn mark_decorator_target(&mut self, service_type: &ServiceType) -> bool {
        let lazy = ServiceType::lazy(service_type.clone());
        let mut found = false;
        for dependency in &mut self.constructor_dependencies {
            if dependency.dependency.factory.is_none()
                && (dependency.dependency.service_type == *service_type || dependency.dependency.service_type == lazy)
            {
                dependency.is_decorator_target = true;
                found = true;
            }
        }
        found
    }
}

impl Debug for ConstructionInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstructionInfo")
            .field("implementing_type", &self.implementing_type())
            .field("constructor_dependencies", &self.constructor_dependencies)
            .field("property_dependencies", &self.property_dependencies)
            .finish_non_exhaustive()
    }
}

fn select_constructor(shape: &TypeShape) -> Result<&Constructor, ConfigurationErrorKind> {
    shape
        .constructors()
        .iter()
        .fold(None, |selected: Option<&Constructor>, constructor| match selected {
            Some(selected) if selected.parameters().len() >= constructor.parameters().len() => Some(selected),
            _ => Some(constructor),
        })
        .ok_or_else(|| ConfigurationErrorKind::NoPublicConstructor {
            implementing_type: shape.implementing_type().clone(),
        })
}

pub(crate) fn property_dependency(property: &Property) -> Option<PropertyDependency> {
    Some(PropertyDependency {
        name: property.name.clone(),
        dependency: Dependency {
            service_type: property.service_type.clone(),
            service_name: String::new(),
            is_required: property.is_required,
            factory: None,
        },
        setter: property.setter()?.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::{Construction, ConstructionInfo};
    use crate::{
        errors::ConfigurationErrorKind,
        factory::{ArgumentExpression, NewExpression},
        inject::Inject,
        registration::ServiceRegistration,
        service_type::ServiceType,
        shape::TypeShape,
    };

    use std::{convert::Infallible, sync::Arc};
    use tracing_test::traced_test;

    struct Database;
    struct Cache;

    #[derive(Default)]
    struct Repository {
        cache: Option<Arc<Cache>>,
    }

    fn repository_shape() -> TypeShape {
        TypeShape::builder::<Repository>()
            .constructor(|| Ok::<_, Infallible>(Repository::default()))
            .constructor(|Inject(_): Inject<Database>, Inject(cache): Inject<Cache>| {
                Ok::<_, Infallible>(Repository { cache: Some(cache) })
            })
            .constructor(|Inject(_): Inject<Cache>, Inject(_): Inject<Database>| Ok::<_, Infallible>(Repository::default()))
            .property("cache", |repository: &mut Repository, cache: Option<Inject<Cache>>| {
                repository.cache = cache.map(|Inject(cache)| cache);
            })
            .read_only_property("size", ServiceType::of::<usize>())
            .build()
    }

    #[test]
    #[traced_test]
    fn test_greediest_first_constructor_selected() {
        let info = ConstructionInfo::from_shape(&repository_shape(), true).unwrap();

        assert_eq!(info.constructor_dependencies.len(), 2);
        assert_eq!(info.constructor_dependencies[0].dependency.service_type, ServiceType::of::<Database>());
        assert!(info.constructor_dependencies.iter().all(|dependency| dependency.dependency.is_required));
        assert_eq!(info.property_dependencies.len(), 1);
        assert_eq!(info.property_dependencies[0].name, "cache");
        assert!(!info.property_dependencies[0].dependency.is_required);
    }

    #[test]
    #[traced_test]
    fn test_property_injection_disabled() {
        let info = ConstructionInfo::from_shape(&repository_shape(), false).unwrap();
        assert!(info.property_dependencies.is_empty());
    }

    #[test]
    #[traced_test]
    fn test_no_constructor() {
        let shape = TypeShape::builder::<Database>().build();

        assert!(matches!(
            ConstructionInfo::from_shape(&shape, true),
            Err(ConfigurationErrorKind::NoPublicConstructor { .. })
        ));
    }

    #[test]
    #[traced_test]
    fn test_new_expression_decomposed() {
        let expression = NewExpression::new(repository_shape())
            .argument(ArgumentExpression::resolve_named(ServiceType::of::<Database>(), "Primary"))
            .argument(ArgumentExpression::value(Arc::new(Cache)))
            .initialize("cache", ArgumentExpression::resolve(ServiceType::of::<Cache>()));
        let registration = ServiceRegistration::for_factory(ServiceType::of::<Repository>(), expression);

        let info = ConstructionInfo::build(&registration, false).unwrap();

        assert!(matches!(info.construction, Construction::Constructor { .. }));
        assert_eq!(info.constructor_dependencies[0].dependency.service_name, "Primary");
        assert!(info.constructor_dependencies[1].dependency.factory.is_some());
        assert_eq!(info.constructor_dependencies[1].dependency.service_type, ServiceType::of::<Cache>());
        assert_eq!(info.property_dependencies.len(), 1);
    }

    #[test]
    #[traced_test]
    fn test_new_expression_mismatches() {
        let wrong_arity = NewExpression::new(repository_shape()).constructor(1).argument(ArgumentExpression::resolve(ServiceType::of::<Database>()));
        let unknown_property = NewExpression::new(repository_shape()).initialize("size", ArgumentExpression::value(Arc::new(1usize)));

        assert!(matches!(
            ConstructionInfo::build(&ServiceRegistration::for_factory(ServiceType::of::<Repository>(), wrong_arity), true),
            Err(ConfigurationErrorKind::FactoryArgumentCount { expected: 2, actual: 1, .. })
        ));
        assert!(matches!(
            ConstructionInfo::build(&ServiceRegistration::for_factory(ServiceType::of::<Repository>(), unknown_property), true),
            Err(ConfigurationErrorKind::FactoryUnknownProperty { .. })
        ));
    }

    #[test]
    #[traced_test]
    fn test_mark_decorator_target() {
        let shape = TypeShape::builder::<Repository>()
            .constructor(|Inject(_): Inject<Repository>, Inject(cache): Inject<Cache>| {
                Ok::<_, Infallible>(Repository { cache: Some(cache) })
            })
            .build();
        let mut info = ConstructionInfo::from_shape(&shape, true).unwrap();

        assert!(info.mark_decorator_target(&ServiceType::of::<Repository>()));
        assert!(info.constructor_dependencies[0].is_decorator_target);
        assert!(!info.constructor_dependencies[1].is_decorator_target);
        assert!(!info.clone().mark_decorator_target(&ServiceType::of::<Database>()));
    }
}
