#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ScopeErrorKind {
    #[error("Attempt to resolve a {lifetime} service outside of a scope")]
    NoActiveScope { lifetime: &'static str },
    #[error("Scope {scope_id} can't be ended while child scope {child_id} is still active")]
    ActiveChildScope { scope_id: u64, child_id: u64 },
    #[error("Scope {scope_id} has already ended")]
    Ended { scope_id: u64 },
}
