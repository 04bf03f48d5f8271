//! Declarative factory expressions.
//!
//! A factory is either a [`NewExpression`], the "construct with member initializers" shape that the engine
//! decomposes into individually resolved dependencies, or an opaque delegate running user code as a single unit.

use std::{
    borrow::Cow,
    fmt::{self, Debug, Formatter},
    sync::Arc,
};

use crate::{
    context::ResolveContext,
    errors::ActivateErrorKind,
    instance::{wrap, Instance},
    lifetime::Lifetime,
    service_type::ServiceType,
    shape::TypeShape,
};

pub type FactoryDelegate = Arc<dyn Fn(&ResolveContext) -> Result<Instance, ActivateErrorKind> + Send + Sync>;

fn delegate<S, F, E>(factory: F) -> FactoryDelegate
where
    S: ?Sized + Send + Sync + 'static,
    F: Fn(&ResolveContext) -> Result<Arc<S>, E> + Send + Sync + 'static,
    E: Into<ActivateErrorKind> + 'static,
{
    Arc::new(move |context: &ResolveContext| factory(context).map(wrap).map_err(Into::into))
}

/// Argument of a [`NewExpression`].
#[derive(Clone)]
pub enum ArgumentExpression {
    /// Call back into the container, compiled as a regular dependency, so registration updates
    /// and decorators of the requested service apply to it.
    Resolve { service_type: ServiceType, service_name: String },
    Value(Instance),
    Call(FactoryDelegate),
}

impl ArgumentExpression {
    #[inline]
    #[must_use]
    pub fn resolve(service_type: ServiceType) -> Self {
        Self::resolve_named(service_type, "")
    }

    #[inline]
    #[must_use]
    pub fn resolve_named(service_type: ServiceType, service_name: impl Into<String>) -> Self {
        Self::Resolve {
            service_type,
            service_name: service_name.into(),
        }
    }

    #[inline]
    #[must_use]
    pub fn value<S>(value: Arc<S>) -> Self
    where
        S: ?Sized + Send + Sync + 'static,
    {
        Self::Value(wrap(value))
    }

    #[inline]
    #[must_use]
    pub fn call<S, F, E>(factory: F) -> Self
    where
        S: ?Sized + Send + Sync + 'static,
        F: Fn(&ResolveContext) -> Result<Arc<S>, E> + Send + Sync + 'static,
        E: Into<ActivateErrorKind> + 'static,
    {
        Self::Call(delegate(factory))
    }
}

impl Debug for ArgumentExpression {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolve { service_type, service_name } => f
                .debug_struct("Resolve")
                .field("service_type", service_type)
                .field("service_name", service_name)
                .finish(),
            Self::Value(_) => f.write_str("Value"),
            Self::Call(_) => f.write_str("Call"),
        }
    }
}

/// Construction of an implementation through one of its constructors, followed by property initializers.
#[derive(Clone)]
pub struct NewExpression {
    pub(crate) shape: TypeShape,
    pub(crate) constructor: Option<usize>,
    pub(crate) arguments: Vec<ArgumentExpression>,
    pub(crate) initializers: Vec<(Cow<'static, str>, ArgumentExpression)>,
}

impl NewExpression {
    #[inline]
    #[must_use]
    pub fn new(shape: TypeShape) -> Self {
        Self {
            shape,
            constructor: None,
            arguments: Vec::new(),
            initializers: Vec::new(),
        }
    }

    /// Selects the constructor by its declaration index.
    /// Without it, the first constructor taking as many parameters as there are arguments is used.
    #[inline]
    #[must_use]
    pub fn constructor(mut self, index: usize) -> Self {
        self.constructor = Some(index);
        self
    }

    #[inline]
    #[must_use]
    pub fn argument(mut self, argument: ArgumentExpression) -> Self {
        self.arguments.push(argument);
        self
    }

    #[inline]
    #[must_use]
    pub fn initialize(mut self, property: impl Into<Cow<'static, str>>, argument: ArgumentExpression) -> Self {
        self.initializers.push((property.into(), argument));
        self
    }

    #[inline]
    #[must_use]
    pub fn shape(&self) -> &TypeShape {
        &self.shape
    }
}

impl Debug for NewExpression {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewExpression")
            .field("implementing_type", self.shape.implementing_type())
            .field("constructor", &self.constructor)
            .field("arguments", &self.arguments)
            .field("initializers", &self.initializers)
            .finish()
    }
}

#[derive(Clone)]
pub enum FactoryExpression {
    New(NewExpression),
    Opaque(FactoryDelegate),
}

impl FactoryExpression {
    /// Factory running user code. Services it resolves through the context aren't analyzed by the engine.
    #[inline]
    #[must_use]
    pub fn opaque<S, F, E>(factory: F) -> Self
    where
        S: ?Sized + Send + Sync + 'static,
        F: Fn(&ResolveContext) -> Result<Arc<S>, E> + Send + Sync + 'static,
        E: Into<ActivateErrorKind> + 'static,
    {
        Self::Opaque(delegate(factory))
    }

    #[inline]
    #[must_use]
    pub fn new(expression: NewExpression) -> Self {
        Self::New(expression)
    }

    /// Implementing type of a decomposable factory.
    #[inline]
    #[must_use]
    pub fn implementing_type(&self) -> Option<&ServiceType> {
        match self {
            Self::New(expression) => Some(expression.shape.implementing_type()),
            Self::Opaque(_) => None,
        }
    }
}

impl From<NewExpression> for FactoryExpression {
    #[inline]
    fn from(expression: NewExpression) -> Self {
        Self::New(expression)
    }
}

impl Debug for FactoryExpression {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::New(expression) => Debug::fmt(expression, f),
            Self::Opaque(_) => f.write_str("Opaque"),
        }
    }
}

/// Request passed to the factory of a factory rule.
pub struct ServiceRequest<'a> {
    pub service_type: &'a ServiceType,
    pub service_name: &'a str,
    pub context: &'a ResolveContext,
}

pub(crate) type RulePredicate = Arc<dyn Fn(&ServiceType, &str) -> bool + Send + Sync>;
pub(crate) type RuleFactory = Arc<dyn Fn(&ServiceRequest<'_>) -> Result<Instance, ActivateErrorKind> + Send + Sync>;

/// Fallback for services unknown to the registry.
#[derive(Clone)]
pub(crate) struct FactoryRule {
    pub(crate) predicate: RulePredicate,
    pub(crate) factory: RuleFactory,
    pub(crate) lifetime: Option<Arc<dyn Lifetime>>,
}

impl FactoryRule {
    #[inline]
    pub(crate) fn matches(&self, service_type: &ServiceType, service_name: &str) -> bool {
        (self.predicate)(service_type, service_name)
    }
}

#[cfg(test)]
mod tests {
    use super::{ArgumentExpression, FactoryExpression, NewExpression};
    use crate::{service_type::ServiceType, shape::TypeShape};

    use std::convert::Infallible;

    struct Mailer;

    #[test]
    fn test_new_expression() {
        let shape = TypeShape::builder::<Mailer>().constructor(|| Ok::<_, Infallible>(Mailer)).build();
        let expression: FactoryExpression = NewExpression::new(shape)
            .constructor(0)
            .argument(ArgumentExpression::resolve_named(ServiceType::of::<String>(), "smtp"))
            .into();

        assert_eq!(expression.implementing_type(), Some(&ServiceType::of::<Mailer>()));
        let FactoryExpression::New(new) = expression else {
            panic!("expected a decomposable factory");
        };
        assert_eq!(new.constructor, Some(0));
        assert!(matches!(
            &new.arguments[0],
            ArgumentExpression::Resolve { service_name, .. } if service_name == "smtp"
        ));
    }

    #[test]
    fn test_opaque_has_no_implementing_type() {
        let expression = FactoryExpression::opaque(|_| Ok::<_, Infallible>(std::sync::Arc::new(Mailer)));
        assert!(expression.implementing_type().is_none());
    }
}
