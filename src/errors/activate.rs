use core::convert::Infallible;

use super::ResolveError;

/// Failure raised by user code: a constructor, a property setter or a factory.
#[derive(thiserror::Error, Debug)]
pub enum ActivateErrorKind {
    #[error(transparent)]
    Custom(#[from] anyhow::Error),
    #[error("Argument of type {expected} can't be extracted from the resolved instance")]
    IncorrectArgument { expected: &'static str },
    #[error(transparent)]
    Resolve(Box<ResolveError>),
}

impl From<ResolveError> for ActivateErrorKind {
    fn from(err: ResolveError) -> Self {
        Self::Resolve(Box::new(err))
    }
}

impl From<Infallible> for ActivateErrorKind {
    fn from(err: Infallible) -> Self {
        match err {}
    }
}
