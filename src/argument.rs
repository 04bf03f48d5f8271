use std::{any::type_name, borrow::Cow};

use crate::{errors::ActivateErrorKind, instance::Instance, service_type::ServiceType, shape::Parameter};

/// Argument of a constructor or a property setter that the container knows how to supply.
///
/// The service type describes what has to be resolved, and [`Argument::from_instance`]
/// extracts the argument from the resolved instance.
pub trait Argument: Sized + Send + 'static {
    fn service_type() -> ServiceType;

    /// Optional arguments receive `None` when their service can't be resolved.
    #[inline]
    #[must_use]
    fn is_required() -> bool {
        true
    }

    /// # Errors
    /// Returns [`ActivateErrorKind::IncorrectArgument`] if the instance is missing or of another type.
    fn from_instance(instance: Option<Instance>) -> Result<Self, ActivateErrorKind>;
}

impl<A: Argument> Argument for Option<A> {
    #[inline]
    fn service_type() -> ServiceType {
        A::service_type()
    }

    #[inline]
    fn is_required() -> bool {
        false
    }

    fn from_instance(instance: Option<Instance>) -> Result<Self, ActivateErrorKind> {
        match instance {
            Some(instance) => A::from_instance(Some(instance)).map(Some),
            None => Ok(None),
        }
    }
}

/// Ordered list of arguments, implemented for tuples of [`Argument`].
pub trait Arguments: Sized {
    #[must_use]
    fn parameters() -> Vec<Parameter>;

    /// # Errors
    /// Returns an error if any of the arguments can't be extracted.
    fn from_instances(instances: Vec<Option<Instance>>) -> Result<Self, ActivateErrorKind>;
}

macro_rules! impl_arguments {
    (
        [$($ty:ident),*]
    ) => {
        #[allow(non_snake_case, unused_mut, unused_variables)]
        impl<$($ty,)*> Arguments for ($($ty,)*)
        where
            $( $ty: Argument, )*
        {
            #[inline]
            fn parameters() -> Vec<Parameter> {
                vec![$( Parameter::new(Cow::Borrowed(type_name::<$ty>()), $ty::service_type(), $ty::is_required()), )*]
            }

            #[inline]
            fn from_instances(instances: Vec<Option<Instance>>) -> Result<Self, ActivateErrorKind> {
                let mut instances = instances.into_iter();
                Ok(($( $ty::from_instance(instances.next().flatten())?, )*))
            }
        }
    };
}

all_the_tuples!(impl_arguments);
