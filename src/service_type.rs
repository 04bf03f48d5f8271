use std::{
    any::{type_name, TypeId},
    borrow::Cow,
    fmt::{self, Debug, Display, Formatter},
    hash::{Hash, Hasher},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use crate::errors::ConfigurationErrorKind;

const LAZY: u64 = 1;
const FACTORY: u64 = 2;
const NAMED_FACTORY: u64 = 3;
const COLLECTION: u64 = 4;

static NEXT_DEFINITION: AtomicU64 = AtomicU64::new(16);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Identity {
    Rust(TypeId),
    Definition(u64),
}

struct Inner {
    name: Cow<'static, str>,
    identity: Identity,
    arity: usize,
    arguments: Box<[ServiceType]>,
}

/// Runtime descriptor of a service or implementation type.
///
/// A descriptor is one of:
/// - a concrete Rust type, see [`ServiceType::of`] (`dyn Trait` included);
/// - a generic definition with a fixed arity, see [`ServiceType::generic_definition`];
/// - a closed generic, see [`ServiceType::close`].
///
/// Cloning is cheap. Equality and hashing are structural.
#[derive(Clone)]
pub struct ServiceType(Arc<Inner>);

impl ServiceType {
    #[inline]
    #[must_use]
    pub fn of<T>() -> Self
    where
        T: ?Sized + 'static,
    {
        Self(Arc::new(Inner {
            name: Cow::Borrowed(type_name::<T>()),
            identity: Identity::Rust(TypeId::of::<T>()),
            arity: 0,
            arguments: Box::new([]),
        }))
    }

    /// Creates a new generic definition. Every call yields a distinct definition,
    /// so keep the returned value around and clone it.
    ///
    /// A zero arity gives a plain named type that has no Rust counterpart.
    #[must_use]
    pub fn generic_definition(name: impl Into<Cow<'static, str>>, arity: usize) -> Self {
        Self::definition(NEXT_DEFINITION.fetch_add(1, Ordering::Relaxed), name.into(), arity)
    }

    #[inline]
    #[must_use]
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Self::generic_definition(name, 0)
    }

    /// Closes a generic definition over the given type arguments.
    ///
    /// # Errors
    /// Returns [`ConfigurationErrorKind::NotGenericDefinition`] if `self` isn't an open definition
    /// and [`ConfigurationErrorKind::GenericArity`] if the argument count doesn't match.
    pub fn close(&self, arguments: &[ServiceType]) -> Result<Self, ConfigurationErrorKind> {
        if !self.is_generic_definition() {
            return Err(ConfigurationErrorKind::NotGenericDefinition { service_type: self.clone() });
        }
        if self.0.arity != arguments.len() {
            return Err(ConfigurationErrorKind::GenericArity {
                service_type: self.clone(),
                expected: self.0.arity,
                actual: arguments.len(),
            });
        }
        Ok(self.closed_unchecked(arguments.into()))
    }

    #[must_use]
    pub fn lazy(of: ServiceType) -> Self {
        Self::wrapper(LAZY, "Lazy", of)
    }

    #[must_use]
    pub fn factory(of: ServiceType) -> Self {
        Self::wrapper(FACTORY, "Factory", of)
    }

    #[must_use]
    pub fn named_factory(of: ServiceType) -> Self {
        Self::wrapper(NAMED_FACTORY, "NamedFactory", of)
    }

    #[must_use]
    pub fn collection(of: ServiceType) -> Self {
        Self::wrapper(COLLECTION, "Collection", of)
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    #[inline]
    #[must_use]
    pub fn short_name(&self) -> &str {
        let name = self.name();
        let head = name.split_once('<').map_or(name, |(head, _)| head);
        head.rsplit_once("::").map_or(head, |(_, short)| short)
    }

    #[inline]
    #[must_use]
    pub fn arity(&self) -> usize {
        self.0.arity
    }

    #[inline]
    #[must_use]
    pub fn generic_arguments(&self) -> &[ServiceType] {
        &self.0.arguments
    }

    #[inline]
    #[must_use]
    pub fn is_generic_definition(&self) -> bool {
        matches!(self.0.identity, Identity::Definition(_)) && self.0.arity > 0 && self.0.arguments.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn is_closed_generic(&self) -> bool {
        !self.0.arguments.is_empty()
    }

    /// Returns the open definition of a closed generic.
    #[must_use]
    pub fn generic_definition_of(&self) -> Option<ServiceType> {
        match self.0.identity {
            Identity::Definition(id) if self.is_closed_generic() => Some(Self::definition(id, self.0.name.clone(), self.0.arity)),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_rust_type<T: ?Sized + 'static>(&self) -> bool {
        self.0.identity == Identity::Rust(TypeId::of::<T>())
    }

    #[inline]
    pub(crate) fn lazy_target(&self) -> Option<&ServiceType> {
        self.wrapped(LAZY)
    }

    #[inline]
    pub(crate) fn factory_target(&self) -> Option<&ServiceType> {
        self.wrapped(FACTORY)
    }

    #[inline]
    pub(crate) fn named_factory_target(&self) -> Option<&ServiceType> {
        self.wrapped(NAMED_FACTORY)
    }

    #[inline]
    pub(crate) fn collection_target(&self) -> Option<&ServiceType> {
        self.wrapped(COLLECTION)
    }

    fn wrapped(&self, definition: u64) -> Option<&ServiceType> {
        match (self.0.identity, &*self.0.arguments) {
            (Identity::Definition(id), [target]) if id == definition => Some(target),
            _ => None,
        }
    }

    fn definition(id: u64, name: Cow<'static, str>, arity: usize) -> Self {
        Self(Arc::new(Inner {
            name,
            identity: Identity::Definition(id),
            arity,
            arguments: Box::new([]),
        }))
    }

    fn wrapper(id: u64, name: &'static str, of: ServiceType) -> Self {
        Self::definition(id, Cow::Borrowed(name), 1).closed_unchecked(Box::new([of]))
    }

    fn closed_unchecked(&self, arguments: Box<[ServiceType]>) -> Self {
        Self(Arc::new(Inner {
            name: self.0.name.clone(),
            identity: self.0.identity,
            arity: self.0.arity,
            arguments,
        }))
    }
}

impl PartialEq for ServiceType {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || (self.0.identity == other.0.identity && self.0.arguments == other.0.arguments)
    }
}

impl Eq for ServiceType {}

impl Hash for ServiceType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.identity.hash(state);
        self.0.arguments.hash(state);
    }
}

impl Display for ServiceType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())?;
        if self.is_generic_definition() {
            write!(f, "<{}>", ",".repeat(self.0.arity - 1))?;
        } else if let Some((first, rest)) = self.0.arguments.split_first() {
            write!(f, "<{first}")?;
            for argument in rest {
                write!(f, ", {argument}")?;
            }
            f.write_str(">")?;
        }
        Ok(())
    }
}

impl Debug for ServiceType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}
