//! Strategies for services without a registration of their own.
//!
//! They are tried in a fixed order: factory rules, lazy values, factory functions, collections,
//! named factory functions, redirection to a single named registration and open generic closing.
//! The first one whose precondition matches produces the resolver.

use std::{collections::HashMap, sync::Arc};
use tracing::debug;

use crate::{
    compiler::CompileStack,
    container::ContainerInner,
    context::ResolveContext,
    errors::ResolveErrorKind,
    factory::{FactoryDelegate, FactoryExpression, FactoryRule, ServiceRequest},
    instance::wrap,
    registration::{ImplementationSource, ServiceKey, ServiceRegistration},
    registry::Snapshot,
    resolver::Resolver,
    service_type::ServiceType,
    shape::ImplementationType,
    wrappers::{Factory, InstanceCollection, Lazy, NamedFactory},
};

impl ContainerInner {
    pub(crate) fn compile_unknown(&self, key: &ServiceKey, snapshot: &Snapshot, stack: &mut CompileStack) -> Result<Resolver, ResolveErrorKind> {
        let service_type = &key.service_type;

        if let Some(rule) = snapshot
            .factory_rules()
            .iter()
            .find(|rule| rule.matches(service_type, &key.service_name))
        {
            debug!(%key, "Factory rule matched");
            return self.compile_factory_rule(key, rule, stack);
        }
        if let Some(target) = service_type.lazy_target() {
            debug!(%key, "Lazy value synthesized");
            return self.compile_lazy(key, target, stack);
        }
        if let Some(target) = service_type.factory_target() {
            debug!(%key, "Factory function synthesized");
            return self.compile_factory(key, target, stack);
        }
        if key.service_name.is_empty() {
            if let Some(element_type) = service_type.collection_target() {
                debug!(%key, "Collection synthesized");
                return self.compile_collection(element_type, snapshot, stack);
            }
            if let Some(target) = service_type.named_factory_target() {
                debug!(%key, "Named factory function synthesized");
                return self.compile_named_factory(target, snapshot, stack);
            }
            if self.options.redirect_to_single_named {
                if let [registration] = snapshot.all_registrations(service_type) {
                    debug!(%key, service_name = registration.service_name(), "Redirected to the single named registration");
                    return self.resolver(&registration.key(), stack);
                }
            }
        }
        if let Some(definition) = service_type.generic_definition_of() {
            if let Some(open) = snapshot.lookup(&definition, &key.service_name) {
                if let ImplementationSource::Type(implementation @ ImplementationType::Open(_)) = open.source() {
                    debug!(%key, "Open generic closed");
                    return self.compile_closed_generic(key, open, implementation, stack);
                }
            }
        }

        Err(ResolveErrorKind::Unresolved {
            service_type: service_type.clone(),
            service_name: key.service_name.clone(),
        })
    }

    fn compile_factory_rule(&self, key: &ServiceKey, rule: &FactoryRule, stack: &mut CompileStack) -> Result<Resolver, ResolveErrorKind> {
        let factory = rule.factory.clone();
        let service_type = key.service_type.clone();
        let service_name = key.service_name.clone();
        let delegate: FactoryDelegate = Arc::new(move |context: &ResolveContext| {
            factory(&ServiceRequest {
                service_type: &service_type,
                service_name: &service_name,
                context,
            })
        });

        let mut registration =
            ServiceRegistration::for_factory(key.service_type.clone(), FactoryExpression::Opaque(delegate)).with_name(key.service_name.clone());
        if let Some(lifetime) = &rule.lifetime {
            registration = registration.with_shared_lifetime(lifetime.fresh());
        }
        let registration = self.store.register_if_absent(registration);
        self.compile_registration(&registration, &self.store.snapshot(), stack)
    }

    fn compile_lazy(&self, key: &ServiceKey, target: &ServiceType, stack: &mut CompileStack) -> Result<Resolver, ResolveErrorKind> {
        let resolver = self.resolver(&ServiceKey::new(target.clone(), &key.service_name), stack)?;
        let target = target.clone();
        let service_name = key.service_name.clone();
        Ok(Resolver::new(move |context| {
            Ok(wrap(Arc::new(Lazy::new(target.clone(), service_name.as_str(), resolver.clone(), context.clone()))))
        }))
    }

    fn compile_factory(&self, key: &ServiceKey, target: &ServiceType, stack: &mut CompileStack) -> Result<Resolver, ResolveErrorKind> {
        let resolver = self.resolver(&ServiceKey::new(target.clone(), &key.service_name), stack)?;
        let target = target.clone();
        let service_name = key.service_name.clone();
        Ok(Resolver::new(move |context| {
            Ok(wrap(Arc::new(Factory::new(target.clone(), service_name.as_str(), resolver.clone(), context.clone()))))
        }))
    }

    /// Keys currently being compiled are left out, they depend on the collection being built.
    ///
    /// Open generic registrations of the element's definition contribute their closed versions,
    /// which are registered up front so their keys resolve to them and not to another strategy.
    fn compile_collection(&self, element_type: &ServiceType, snapshot: &Snapshot, stack: &mut CompileStack) -> Result<Resolver, ResolveErrorKind> {
        let mut keys: Vec<_> = snapshot.all_registrations(element_type).iter().map(|registration| registration.key()).collect();

        if let Some(definition) = element_type.generic_definition_of() {
            for open in snapshot.all_registrations(&definition) {
                let ImplementationSource::Type(implementation @ ImplementationType::Open(_)) = open.source() else {
                    continue;
                };
                let key = ServiceKey::new(element_type.clone(), open.service_name());
                if keys.contains(&key) {
                    continue;
                }
                let Some(closed) = implementation.close(element_type.generic_arguments()) else {
                    continue;
                };
                self.register_closed_generic(&key, open, closed);
                keys.push(key);
            }
        }

        let mut resolvers = Vec::with_capacity(keys.len());
        for key in &keys {
            if let Some(position) = stack.position(key) {
                debug!(%key, "Collection element excluded, it's being compiled");
                stack.exclude_from_cache_above(position);
                continue;
            }
            resolvers.push(self.resolver(key, stack)?);
        }

        let element_type = element_type.clone();
        Ok(Resolver::new(move |context| {
            Ok(wrap(Arc::new(InstanceCollection::new(
                element_type.clone(),
                resolvers.clone(),
                context.clone(),
            ))))
        }))
    }

    fn compile_named_factory(&self, target: &ServiceType, snapshot: &Snapshot, stack: &mut CompileStack) -> Result<Resolver, ResolveErrorKind> {
        let mut resolvers = HashMap::new();
        for registration in snapshot.all_registrations(target) {
            let key = registration.key();
            let resolver = self.resolver(&key, stack)?;
            resolvers.insert(key.service_name, resolver);
        }

        let target = target.clone();
        Ok(Resolver::new(move |context| {
            Ok(wrap(Arc::new(NamedFactory::new(target.clone(), resolvers.clone(), context.clone()))))
        }))
    }

    fn compile_closed_generic(
        &self,
        key: &ServiceKey,
        open: &ServiceRegistration,
        implementation: &ImplementationType,
        stack: &mut CompileStack,
    ) -> Result<Resolver, ResolveErrorKind> {
        let Some(closed) = implementation.close(key.service_type.generic_arguments()) else {
            debug!(%key, implementing_type = %implementation.implementing_type(), "Type arguments rejected by the open implementation");
            return Err(ResolveErrorKind::Unresolved {
                service_type: key.service_type.clone(),
                service_name: key.service_name.clone(),
            });
        };
        let registration = self.register_closed_generic(key, open, closed);
        self.compile_registration(&registration, &self.store.snapshot(), stack)
    }

    /// Registers the closed version of an open generic registration under the key.
    ///
    /// A resolver cached for the key before it had a registration of its own came from another strategy,
    /// so the caches are dropped when one is found.
    fn register_closed_generic(&self, key: &ServiceKey, open: &ServiceRegistration, closed: ImplementationType) -> Arc<ServiceRegistration> {
        if let Some(existing) = self.store.snapshot().lookup(&key.service_type, &key.service_name) {
            return existing.clone();
        }
        let registration = self.store.register_if_absent(open.closed(key.service_type.clone(), closed));
        if self.resolvers.contains_key(key) {
            self.invalidate();
        }
        registration
    }
}
