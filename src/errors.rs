mod activate;
mod configuration;
mod resolve;
mod scope;

pub use activate::ActivateErrorKind;
pub use configuration::ConfigurationErrorKind;
pub use resolve::{ResolveError, ResolveErrorKind};
pub use scope::ScopeErrorKind;
