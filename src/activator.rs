use crate::{argument::Argument, errors::ActivateErrorKind};

/// Constructor of an implementation type.
///
/// Implemented for closures `Fn(A1, .., An) -> Result<T, E>` whose arguments implement [`Argument`],
/// so constructors are declared like:
/// ```rust
/// use ioc_engine::{Inject, TypeShape};
/// use std::{convert::Infallible, sync::Arc};
///
/// struct Database;
/// struct UserRepository(Arc<Database>);
///
/// let shape = TypeShape::builder::<UserRepository>()
///     .constructor(|Inject(database): Inject<Database>| Ok::<_, Infallible>(UserRepository(database)))
///     .build();
/// assert_eq!(shape.constructors()[0].parameters().len(), 1);
/// ```
pub trait Activator<Args>: Send + Sync + 'static {
    type Provides: Send + Sync + 'static;
    type Error: Into<ActivateErrorKind>;

    /// # Errors
    /// Returns the error of the user constructor.
    fn activate(&self, arguments: Args) -> Result<Self::Provides, Self::Error>;
}

macro_rules! impl_activator {
    (
        [$($ty:ident),*]
    ) => {
        #[allow(non_snake_case)]
        impl<F, Response, Err, $($ty,)*> Activator<($($ty,)*)> for F
        where
            F: Fn($($ty,)*) -> Result<Response, Err> + Send + Sync + 'static,
            Response: Send + Sync + 'static,
            Err: Into<ActivateErrorKind>,
            $( $ty: Argument, )*
        {
            type Provides = Response;
            type Error = Err;

            #[inline]
            fn activate(&self, ($($ty,)*): ($($ty,)*)) -> Result<Self::Provides, Self::Error> {
                self($($ty,)*)
            }
        }
    };
}

all_the_tuples!(impl_activator);
