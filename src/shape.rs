//! Metadata of implementation types: constructors, properties, assignable service types and disposability.
//!
//! This is what the container knows about a type it constructs. A shape is declared once per implementation
//! with [`TypeShape::builder`], and an open generic implementation provides a closer that builds the shape
//! of each closed version on demand, see [`ImplementationType::open_generic`].

use std::{
    any::{type_name, Any},
    borrow::Cow,
    fmt::{self, Debug, Formatter},
    marker::PhantomData,
    sync::Arc,
};

use crate::{
    activator::Activator,
    argument::{Argument, Arguments},
    dispose::{disposable, Dispose, Disposable},
    errors::{ActivateErrorKind, ConfigurationErrorKind},
    instance::{wrap, Activation, Instance},
    service_type::ServiceType,
};

pub(crate) type BoxedValue = Box<dyn Any + Send + Sync>;

type ActivateFn = dyn Fn(Vec<Option<Instance>>) -> Result<BoxedValue, ActivateErrorKind> + Send + Sync;
pub(crate) type SetterFn = Arc<dyn Fn(&mut (dyn Any + Send + Sync), Option<Instance>) -> Result<(), ActivateErrorKind> + Send + Sync>;
pub(crate) type FinishFn = Arc<dyn Fn(BoxedValue) -> Result<Activation, ActivateErrorKind> + Send + Sync>;
type CloseFn = dyn Fn(&[ServiceType]) -> Option<TypeShape> + Send + Sync;

#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: Cow<'static, str>,
    pub service_type: ServiceType,
    pub is_required: bool,
}

impl Parameter {
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<Cow<'static, str>>, service_type: ServiceType, is_required: bool) -> Self {
        Self {
            name: name.into(),
            service_type,
            is_required,
        }
    }
}

#[derive(Clone)]
pub struct Constructor {
    parameters: Arc<[Parameter]>,
    activate: Arc<ActivateFn>,
}

impl Constructor {
    #[inline]
    #[must_use]
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    #[inline]
    pub(crate) fn activate(&self, arguments: Vec<Option<Instance>>) -> Result<BoxedValue, ActivateErrorKind> {
        (self.activate)(arguments)
    }
}

impl Debug for Constructor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constructor").field("parameters", &self.parameters).finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct Property {
    pub name: Cow<'static, str>,
    pub service_type: ServiceType,
    pub is_required: bool,
    setter: Option<SetterFn>,
}

impl Property {
    #[inline]
    #[must_use]
    pub fn is_settable(&self) -> bool {
        self.setter.is_some()
    }

    #[inline]
    pub(crate) fn setter(&self) -> Option<&SetterFn> {
        self.setter.as_ref()
    }
}

impl Debug for Property {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("name", &self.name)
            .field("service_type", &self.service_type)
            .field("is_required", &self.is_required)
            .field("is_settable", &self.is_settable())
            .finish()
    }
}

struct ShapeInner {
    implementing_type: ServiceType,
    constructors: Vec<Constructor>,
    properties: Vec<Property>,
    finishers: Vec<(ServiceType, FinishFn)>,
}

/// Shape of a concrete implementation type.
#[derive(Clone)]
pub struct TypeShape(Arc<ShapeInner>);

impl TypeShape {
    #[inline]
    #[must_use]
    pub fn builder<T: Send + Sync + 'static>() -> TypeShapeBuilder<T> {
        TypeShapeBuilder::new()
    }

    #[inline]
    #[must_use]
    pub fn implementing_type(&self) -> &ServiceType {
        &self.0.implementing_type
    }

    #[inline]
    #[must_use]
    pub fn constructors(&self) -> &[Constructor] {
        &self.0.constructors
    }

    #[inline]
    #[must_use]
    pub fn properties(&self) -> &[Property] {
        &self.0.properties
    }

    #[inline]
    #[must_use]
    pub fn is_assignable_to(&self, service_type: &ServiceType) -> bool {
        self.finisher_for(service_type).is_some()
    }

    /// Finisher converting a constructed value into an instance of the service type.
    /// A conversion declared for a generic definition applies to all of its closed versions.
    pub(crate) fn finisher_for(&self, service_type: &ServiceType) -> Option<FinishFn> {
        let exact = self.0.finishers.iter().find(|(target, _)| target == service_type);
        let by_definition = || {
            let definition = service_type.generic_definition_of()?;
            self.0.finishers.iter().find(|(target, _)| *target == definition)
        };
        exact.or_else(by_definition).map(|(_, finish)| finish.clone())
    }
}

impl Debug for TypeShape {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeShape")
            .field("implementing_type", &self.0.implementing_type)
            .field("constructors", &self.0.constructors)
            .field("properties", &self.0.properties)
            .finish_non_exhaustive()
    }
}

type ConvertFn<T> = Arc<dyn Fn(Arc<T>) -> Instance + Send + Sync>;

pub struct TypeShapeBuilder<T> {
    implementing_type: ServiceType,
    constructors: Vec<Constructor>,
    properties: Vec<Property>,
    conversions: Vec<(ServiceType, ConvertFn<T>)>,
    dispose: Option<fn(Arc<T>) -> Disposable>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> TypeShapeBuilder<T>
where
    T: Send + Sync + 'static,
{
    #[inline]
    #[must_use]
    fn new() -> Self {
        Self {
            implementing_type: ServiceType::of::<T>(),
            constructors: Vec::new(),
            properties: Vec::new(),
            conversions: Vec::new(),
            dispose: None,
            _marker: PhantomData,
        }
    }

    /// Overrides the implementing type descriptor.
    /// Used by closers of open generic implementations, where one Rust type serves all closed versions.
    #[inline]
    #[must_use]
    pub fn with_type(mut self, implementing_type: ServiceType) -> Self {
        self.implementing_type = implementing_type;
        self
    }

    #[must_use]
    pub fn constructor<Args, A>(mut self, activator: A) -> Self
    where
        Args: Arguments + 'static,
        A: Activator<Args, Provides = T>,
    {
        self.constructors.push(Constructor {
            parameters: Args::parameters().into(),
            activate: Arc::new(move |instances: Vec<Option<Instance>>| {
                let arguments = Args::from_instances(instances)?;
                let value = activator.activate(arguments).map_err(Into::into)?;
                Ok(Box::new(value) as BoxedValue)
            }),
        });
        self
    }

    /// Adds a constructor with explicitly described parameters.
    /// The activator receives one instance per parameter, `None` for unresolved optional ones.
    #[must_use]
    pub fn raw_constructor<F, E>(mut self, parameters: Vec<Parameter>, activate: F) -> Self
    where
        F: Fn(Vec<Option<Instance>>) -> Result<T, E> + Send + Sync + 'static,
        E: Into<ActivateErrorKind> + 'static,
    {
        self.constructors.push(Constructor {
            parameters: parameters.into(),
            activate: Arc::new(move |instances: Vec<Option<Instance>>| activate(instances).map(|value| Box::new(value) as BoxedValue).map_err(Into::into)),
        });
        self
    }

    #[must_use]
    pub fn property<A, F>(self, name: impl Into<Cow<'static, str>>, setter: F) -> Self
    where
        A: Argument,
        F: Fn(&mut T, A) + Send + Sync + 'static,
    {
        self.raw_property(name, A::service_type(), A::is_required(), move |value: &mut T, instance| {
            setter(value, A::from_instance(instance)?);
            Ok::<_, ActivateErrorKind>(())
        })
    }

    #[must_use]
    pub fn raw_property<F, E>(mut self, name: impl Into<Cow<'static, str>>, service_type: ServiceType, is_required: bool, setter: F) -> Self
    where
        F: Fn(&mut T, Option<Instance>) -> Result<(), E> + Send + Sync + 'static,
        E: Into<ActivateErrorKind> + 'static,
    {
        let setter: SetterFn = Arc::new(move |value: &mut (dyn Any + Send + Sync), instance: Option<Instance>| {
            let value = value.downcast_mut::<T>().ok_or(ActivateErrorKind::IncorrectArgument { expected: type_name::<T>() })?;
            setter(value, instance).map_err(Into::into)
        });
        self.properties.push(Property {
            name: name.into(),
            service_type,
            is_required,
            setter: Some(setter),
        });
        self
    }

    /// Declares a property without a public setter. It's never injected.
    #[must_use]
    pub fn read_only_property(mut self, name: impl Into<Cow<'static, str>>, service_type: ServiceType) -> Self {
        self.properties.push(Property {
            name: name.into(),
            service_type,
            is_required: false,
            setter: None,
        });
        self
    }

    /// Declares that the implementation is assignable to the service `S`.
    #[must_use]
    pub fn as_service<S, F>(self, convert: F) -> Self
    where
        S: ?Sized + Send + Sync + 'static,
        F: Fn(Arc<T>) -> Arc<S> + Send + Sync + 'static,
    {
        self.as_service_type(ServiceType::of::<S>(), convert)
    }

    /// Declares that the implementation is assignable to a runtime-described service type,
    /// such as a generic definition, in which case all of its closed versions are covered.
    #[must_use]
    pub fn as_service_type<S, F>(mut self, service_type: ServiceType, convert: F) -> Self
    where
        S: ?Sized + Send + Sync + 'static,
        F: Fn(Arc<T>) -> Arc<S> + Send + Sync + 'static,
    {
        let convert: ConvertFn<T> = Arc::new(move |value: Arc<T>| wrap(convert(value)));
        self.conversions.push((service_type, convert));
        self
    }

    #[inline]
    #[must_use]
    pub fn disposable(mut self) -> Self
    where
        T: Dispose,
    {
        self.dispose = Some(disposable::<T>);
        self
    }

    #[must_use]
    pub fn build(self) -> TypeShape {
        let Self {
            implementing_type,
            constructors,
            properties,
            mut conversions,
            dispose,
            ..
        } = self;

        if !conversions.iter().any(|(target, _)| *target == implementing_type) {
            let identity: ConvertFn<T> = Arc::new(|value: Arc<T>| wrap(value));
            conversions.push((implementing_type.clone(), identity));
        }

        let finishers = conversions
            .into_iter()
            .map(|(target, convert)| {
                let finish: FinishFn = Arc::new(move |value: BoxedValue| {
                    let value: Arc<T> = value
                        .downcast::<T>()
                        .map_err(|_| ActivateErrorKind::IncorrectArgument { expected: type_name::<T>() })?
                        .into();
                    Ok(Activation {
                        disposable: dispose.map(|dispose| dispose(value.clone())),
                        instance: convert(value),
                    })
                });
                (target, finish)
            })
            .collect();

        TypeShape(Arc::new(ShapeInner {
            implementing_type,
            constructors,
            properties,
            finishers,
        }))
    }
}

#[derive(Clone)]
pub struct OpenGenericImplementation {
    definition: ServiceType,
    close: Arc<CloseFn>,
}

impl OpenGenericImplementation {
    #[inline]
    #[must_use]
    pub fn definition(&self) -> &ServiceType {
        &self.definition
    }
}

/// Implementation of a service: either a concrete shape or an open generic closed on demand.
#[derive(Clone)]
pub enum ImplementationType {
    Closed(TypeShape),
    Open(OpenGenericImplementation),
}

impl ImplementationType {
    /// Describes an open generic implementation.
    ///
    /// The closer receives the type arguments of the requested closed service and returns
    /// the closed shape, or `None` if the arguments don't satisfy the implementation's constraints.
    #[must_use]
    pub fn open_generic<F>(name: impl Into<Cow<'static, str>>, arity: usize, close: F) -> Self
    where
        F: Fn(&[ServiceType]) -> Option<TypeShape> + Send + Sync + 'static,
    {
        Self::Open(OpenGenericImplementation {
            definition: ServiceType::generic_definition(name, arity),
            close: Arc::new(close),
        })
    }

    #[inline]
    #[must_use]
    pub fn implementing_type(&self) -> &ServiceType {
        match self {
            Self::Closed(shape) => shape.implementing_type(),
            Self::Open(open) => &open.definition,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open(_))
    }

    /// Closes an open implementation over type arguments; a closed one is returned as is.
    #[must_use]
    pub fn close(&self, arguments: &[ServiceType]) -> Option<ImplementationType> {
        match self {
            Self::Closed(_) => Some(self.clone()),
            Self::Open(open) if open.definition.arity() == arguments.len() => (open.close)(arguments).map(Self::Closed),
            Self::Open(_) => None,
        }
    }

    pub(crate) fn shape(&self) -> Result<&TypeShape, ConfigurationErrorKind> {
        match self {
            Self::Closed(shape) => Ok(shape),
            Self::Open(open) => Err(ConfigurationErrorKind::OpenImplementation {
                implementing_type: open.definition.clone(),
            }),
        }
    }
}

impl From<TypeShape> for ImplementationType {
    #[inline]
    fn from(shape: TypeShape) -> Self {
        Self::Closed(shape)
    }
}

impl Debug for ImplementationType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed(shape) => Debug::fmt(shape, f),
            Self::Open(open) => write!(f, "Open({})", open.definition),
        }
    }
}
