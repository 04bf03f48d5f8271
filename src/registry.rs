use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc};

use crate::{
    factory::FactoryRule,
    registration::{DecoratorRegistration, Initializer, ServiceRegistration},
    service_type::ServiceType,
};

/// Immutable state of the store. Readers keep the snapshot they loaded while writers publish new ones.
#[derive(Default, Clone)]
pub(crate) struct Snapshot {
    services: HashMap<ServiceType, Vec<Arc<ServiceRegistration>>>,
    decorators: Vec<Arc<DecoratorRegistration>>,
    factory_rules: Vec<FactoryRule>,
    initializers: Vec<Initializer>,
}

impl Snapshot {
    #[must_use]
    pub(crate) fn lookup(&self, service_type: &ServiceType, service_name: &str) -> Option<&Arc<ServiceRegistration>> {
        let service_name = service_name.to_lowercase();
        self.all_registrations(service_type)
            .iter()
            .find(|registration| registration.service_name().to_lowercase() == service_name)
    }

    /// Every registration of the service type, in registration order.
    #[inline]
    #[must_use]
    pub(crate) fn all_registrations(&self, service_type: &ServiceType) -> &[Arc<ServiceRegistration>] {
        self.services.get(service_type).map_or(&[], Vec::as_slice)
    }

    #[inline]
    pub(crate) fn services(&self) -> impl Iterator<Item = &Arc<ServiceRegistration>> {
        self.services.values().flatten()
    }

    #[inline]
    #[must_use]
    pub(crate) fn decorators(&self) -> &[Arc<DecoratorRegistration>] {
        &self.decorators
    }

    #[inline]
    #[must_use]
    pub(crate) fn factory_rules(&self) -> &[FactoryRule] {
        &self.factory_rules
    }

    #[inline]
    #[must_use]
    pub(crate) fn initializers(&self) -> &[Initializer] {
        &self.initializers
    }
}

pub(crate) enum RegisterOutcome {
    Inserted(Arc<ServiceRegistration>),
    Replaced(Arc<ServiceRegistration>),
    /// The existing registration is read-only and stays active.
    ReadOnly(Arc<ServiceRegistration>),
}

impl RegisterOutcome {
    #[inline]
    #[must_use]
    pub(crate) fn registration(&self) -> &Arc<ServiceRegistration> {
        match self {
            Self::Inserted(registration) | Self::Replaced(registration) | Self::ReadOnly(registration) => registration,
        }
    }

    #[inline]
    #[must_use]
    pub(crate) fn is_changed(&self) -> bool {
        !matches!(self, Self::ReadOnly(_))
    }
}

/// Registration store with copy-on-write snapshots.
///
/// Lookups load the current snapshot without blocking. Writers are serialized by a narrow lock,
/// build the next snapshot from the current one and publish it atomically.
#[derive(Default)]
pub(crate) struct RegistrationStore {
    snapshot: ArcSwap<Snapshot>,
    write_lock: Mutex<()>,
}

impl RegistrationStore {
    #[inline]
    #[must_use]
    pub(crate) fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.load_full()
    }

    pub(crate) fn register(&self, registration: ServiceRegistration) -> RegisterOutcome {
        self.update(|snapshot| {
            let registrations = snapshot.services.entry(registration.service_type().clone()).or_default();
            match registrations.iter_mut().find(|existing| ***existing == registration) {
                Some(existing) if existing.is_read_only() => RegisterOutcome::ReadOnly(existing.clone()),
                Some(existing) => {
                    *existing = Arc::new(registration);
                    RegisterOutcome::Replaced(existing.clone())
                }
                None => {
                    let registration = Arc::new(registration);
                    registrations.push(registration.clone());
                    RegisterOutcome::Inserted(registration)
                }
            }
        })
    }

    /// Registers unless the key is already taken, returning the active registration.
    /// Used for registrations synthesized during resolution.
    pub(crate) fn register_if_absent(&self, registration: ServiceRegistration) -> Arc<ServiceRegistration> {
        if let Some(existing) = self.snapshot().lookup(registration.service_type(), registration.service_name()) {
            return existing.clone();
        }
        self.update(|snapshot| {
            let registrations = snapshot.services.entry(registration.service_type().clone()).or_default();
            if let Some(existing) = registrations.iter().find(|existing| ***existing == registration) {
                return existing.clone();
            }
            let registration = Arc::new(registration);
            registrations.push(registration.clone());
            registration
        })
    }

    pub(crate) fn add_decorator(&self, mut decorator: DecoratorRegistration) -> Arc<DecoratorRegistration> {
        self.update(|snapshot| {
            decorator.index = snapshot.decorators.len();
            let decorator = Arc::new(decorator);
            snapshot.decorators.push(decorator.clone());
            decorator
        })
    }

    pub(crate) fn add_factory_rule(&self, rule: FactoryRule) {
        self.update(|snapshot| snapshot.factory_rules.push(rule));
    }

    pub(crate) fn add_initializer(&self, initializer: Initializer) {
        self.update(|snapshot| snapshot.initializers.push(initializer));
    }

    fn update<R>(&self, update: impl FnOnce(&mut Snapshot) -> R) -> R {
        let _guard = self.write_lock.lock();
        let mut next = Snapshot::clone(&self.snapshot.load());
        let result = update(&mut next);
        self.snapshot.store(Arc::new(next));
        result
    }
}
