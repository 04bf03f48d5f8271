//! Decorator pipeline.
//!
//! Decorators of a registration are gathered at compile time from the decorators of its exact service type
//! and of its generic definition, filtered by their predicates. Statically typed decorators apply first,
//! then deferred ones, each group in registration order. Each decorator wraps the previous step,
//! so the last registered decorator is the outermost.

use std::{cmp::Ordering, sync::Arc};
use tracing::debug;

use crate::{
    compiler::CompileStack,
    construction::ConstructionInfo,
    container::ContainerInner,
    context::ResolveContext,
    errors::{ConfigurationErrorKind, ResolveErrorKind},
    instance::Activation,
    registration::{DecoratorFactory, DecoratorKind, DecoratorRegistration, ServiceRegistration},
    registry::Snapshot,
    resolver::ConstructionStep,
    shape::{ImplementationType, TypeShape},
};

enum AppliedDecorator {
    Type(TypeShape),
    Factory(DecoratorFactory),
}

struct Candidate {
    is_deferred: bool,
    index: usize,
    decorator: AppliedDecorator,
}

fn close(implementation: &ImplementationType, registration: &ServiceRegistration) -> Option<AppliedDecorator> {
    match implementation.close(registration.service_type().generic_arguments())? {
        ImplementationType::Closed(shape) => Some(AppliedDecorator::Type(shape)),
        ImplementationType::Open(_) => None,
    }
}

fn applied(decorator: &DecoratorRegistration, registration: &ServiceRegistration) -> Option<AppliedDecorator> {
    match decorator.kind() {
        DecoratorKind::Type(implementation) => close(implementation, registration),
        DecoratorKind::Factory(factory) => Some(AppliedDecorator::Factory(factory.clone())),
        DecoratorKind::Deferred(implementation) => close(&implementation(registration)?, registration),
    }
}

/// Decorators applying to the registration, innermost first.
fn decorators_for(registration: &ServiceRegistration, snapshot: &Snapshot) -> Vec<AppliedDecorator> {
    let service_type = registration.service_type();
    let definition = service_type.generic_definition_of();

    let mut candidates: Vec<_> = snapshot
        .decorators()
        .iter()
        .filter(|decorator| {
            decorator.service_type() == service_type || definition.as_ref() == Some(decorator.service_type())
        })
        .filter(|decorator| decorator.applies_to(registration))
        .filter_map(|decorator| {
            Some(Candidate {
                is_deferred: decorator.is_deferred(),
                index: decorator.index(),
                decorator: applied(decorator, registration)?,
            })
        })
        .collect();
    candidates.sort_by(|left, right| match left.is_deferred.cmp(&right.is_deferred) {
        Ordering::Equal => left.index.cmp(&right.index),
        ordering => ordering,
    });
    candidates.into_iter().map(|candidate| candidate.decorator).collect()
}

impl ContainerInner {
    pub(crate) fn apply_decorators(
        &self,
        registration: &ServiceRegistration,
        snapshot: &Snapshot,
        step: ConstructionStep,
        stack: &mut CompileStack,
    ) -> Result<ConstructionStep, ResolveErrorKind> {
        let decorators = decorators_for(registration, snapshot);
        if !decorators.is_empty() {
            debug!(count = decorators.len(), "Decorators applied");
        }
        decorators
            .into_iter()
            .try_fold(step, |step, decorator| self.decorate_step(registration, decorator, step, stack))
    }

    fn decorate_step(
        &self,
        registration: &ServiceRegistration,
        decorator: AppliedDecorator,
        step: ConstructionStep,
        stack: &mut CompileStack,
    ) -> Result<ConstructionStep, ResolveErrorKind> {
        let service_type = registration.service_type();
        match decorator {
            AppliedDecorator::Factory(factory) => {
                let dependent = format!("decorator of {}", registration.key());
                Ok(Arc::new(move |context: &ResolveContext| {
                    let Activation { instance, disposable } = step(context)?;
                    let instance = factory(context, instance).map_err(|source| ResolveErrorKind::Activate {
                        implementing_type: dependent.clone(),
                        source,
                    })?;
                    Ok(Activation { instance, disposable })
                }))
            }
            AppliedDecorator::Type(shape) => {
                let mut info = ConstructionInfo::from_shape(&shape, self.options.enable_property_injection)?;
                if !info.mark_decorator_target(service_type) {
                    return Err(ConfigurationErrorKind::DecoratorTarget {
                        decorator_type: shape.implementing_type().clone(),
                        service_type: service_type.clone(),
                    }
                    .into());
                }
                let dependent = format!("{} (decorator {})", registration.key(), shape.implementing_type());
                self.construction_step(&info, service_type, Some(&step), stack, &dependent)
            }
        }
    }
}
