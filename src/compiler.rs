//! Compilation of registrations into cached resolvers.
//!
//! A resolver is compiled once per `(service type, service name)` and cached until a registration change
//! invalidates the caches. Compilation walks the dependency graph depth-first with an explicit stack,
//! so a cycle is reported before any constructor runs.

use dashmap::mapref::entry::Entry;
use std::{
    any::Any,
    sync::{atomic::Ordering, Arc},
};
use tracing::{debug, debug_span};

use crate::{
    construction::{Construction, ConstructionInfo, Dependency, PropertyDependency},
    container::ContainerInner,
    context::ResolveContext,
    dispose::Disposable,
    errors::{ActivateErrorKind, ConfigurationErrorKind, ResolveErrorKind},
    factory::{ArgumentExpression, FactoryDelegate},
    instance::{wrap, Activation, Instance},
    registration::{ServiceKey, ServiceRegistration},
    registry::Snapshot,
    resolver::{ConstructionStep, Resolver},
    service_type::ServiceType,
    wrappers::Lazy,
};

struct Frame {
    key: ServiceKey,
    is_cacheable: bool,
}

/// Keys being compiled by the current request, outermost first.
#[derive(Default)]
pub(crate) struct CompileStack {
    frames: Vec<Frame>,
}

impl CompileStack {
    #[inline]
    pub(crate) fn position(&self, key: &ServiceKey) -> Option<usize> {
        self.frames.iter().position(|frame| frame.key == *key)
    }

    /// Resolvers compiled above the position depend on the stack content, so they aren't cached.
    pub(crate) fn exclude_from_cache_above(&mut self, position: usize) {
        for frame in self.frames.iter_mut().skip(position + 1) {
            frame.is_cacheable = false;
        }
    }

    #[inline]
    fn push(&mut self, key: ServiceKey) {
        self.frames.push(Frame { key, is_cacheable: true });
    }

    #[inline]
    fn pop(&mut self) -> bool {
        self.frames.pop().map_or(true, |frame| frame.is_cacheable)
    }
}

/// How a constructor argument or a property value is obtained.
enum ArgumentPlan {
    Resolve(Resolver),
    /// Optional dependency that can't be resolved.
    Missing,
    Value(Instance),
    Call { delegate: FactoryDelegate, dependent: String },
    /// The instance being decorated.
    Decorated(ConstructionStep),
    /// Lazy wrapper of the instance being decorated.
    LazyDecorated {
        service_type: ServiceType,
        service_name: String,
        step: ConstructionStep,
    },
}

impl ArgumentPlan {
    fn produce(&self, context: &ResolveContext, decorated_disposable: &mut Option<Disposable>) -> Result<Option<Instance>, ResolveErrorKind> {
        match self {
            Self::Resolve(resolver) => resolver.resolve(context).map(Some),
            Self::Missing => Ok(None),
            Self::Value(instance) => Ok(Some(instance.clone())),
            Self::Call { delegate, dependent } => delegate(context).map(Some).map_err(|source| ResolveErrorKind::Activate {
                implementing_type: dependent.clone(),
                source,
            }),
            Self::Decorated(step) => {
                let Activation { instance, disposable } = step(context)?;
                *decorated_disposable = disposable;
                Ok(Some(instance))
            }
            Self::LazyDecorated { service_type, service_name, step } => {
                let lazy = Lazy::new(service_type.clone(), service_name.as_str(), Resolver::from(step.clone()), context.clone());
                Ok(Some(wrap(Arc::new(lazy))))
            }
        }
    }
}

fn describe(registration: &ServiceRegistration) -> String {
    match registration.implementing_type() {
        Some(implementing_type) => format!("{} ({})", registration.key(), implementing_type),
        None => registration.key().to_string(),
    }
}

impl ContainerInner {
    /// Returns the resolver of the key, compiling and caching it if needed.
    ///
    /// # Errors
    /// Returns an error if the key or any of its dependencies can't be resolved,
    /// or if the key is already being compiled further down the stack.
    pub(crate) fn resolver(&self, key: &ServiceKey, stack: &mut CompileStack) -> Result<Resolver, ResolveErrorKind> {
        if let Some(resolver) = self.resolvers.get(key) {
            debug!(%key, "Resolver found in cache");
            return Ok(resolver.value().clone());
        }
        if stack.position(key).is_some() {
            return Err(ResolveErrorKind::RecursiveDependency {
                service_type: key.service_type.clone(),
                service_name: key.service_name.clone(),
            });
        }

        let generation = self.generation.load(Ordering::Acquire);
        stack.push(key.clone());
        let compiled = self.compile_key(key, stack);
        let is_cacheable = stack.pop();
        let resolver = compiled?;

        if !is_cacheable {
            debug!(%key, "Resolver depends on the compile stack, not cached");
            return Ok(resolver);
        }
        if self.generation.load(Ordering::Acquire) != generation {
            return Ok(resolver);
        }
        let resolver = match self.resolvers.entry(key.clone()) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => entry.insert(resolver).value().clone(),
        };
        if self.generation.load(Ordering::Acquire) != generation {
            self.resolvers.remove(key);
        }
        Ok(resolver)
    }

    fn compile_key(&self, key: &ServiceKey, stack: &mut CompileStack) -> Result<Resolver, ResolveErrorKind> {
        let snapshot = self.store.snapshot();
        match snapshot.lookup(&key.service_type, &key.service_name) {
            Some(registration) => self.compile_registration(registration, &snapshot, stack),
            None => self.compile_unknown(key, &snapshot, stack),
        }
    }

    /// Compiles a registration: construction, decorators, initializers, disposal capture and lifetime, innermost first.
    pub(crate) fn compile_registration(
        &self,
        registration: &Arc<ServiceRegistration>,
        snapshot: &Snapshot,
        stack: &mut CompileStack,
    ) -> Result<Resolver, ResolveErrorKind> {
        let span = debug_span!(
            "compile",
            service_type = %registration.service_type(),
            service_name = registration.service_name()
        );
        let _guard = span.enter();

        let info = self.construction_info(registration)?;
        let dependent = describe(registration);
        let step = self.construction_step(&info, registration.service_type(), None, stack, &dependent)?;
        let step = self.apply_decorators(registration, snapshot, step, stack)?;
        let step = apply_initializers(registration, snapshot, step, &dependent);
        let step = apply_disposer(registration, step);

        debug!(lifetime = registration.lifetime().map(|lifetime| lifetime.name()), "Resolver compiled");
        Ok(match registration.lifetime() {
            Some(lifetime) => {
                let lifetime = lifetime.clone();
                Resolver::new(move |context| lifetime.get_instance(&|| step(context), context))
            }
            None => Resolver::from(step),
        })
    }

    fn construction_info(&self, registration: &ServiceRegistration) -> Result<Arc<ConstructionInfo>, ConfigurationErrorKind> {
        if let Some(info) = self.construction_infos.get(&registration.id()) {
            return Ok(info.value().clone());
        }
        let info = Arc::new(ConstructionInfo::build(registration, self.options.enable_property_injection)?);
        Ok(self.construction_infos.entry(registration.id()).or_insert(info).value().clone())
    }

    /// Step constructing the implementation of a recipe as the service type.
    /// Parameters marked as decorator targets receive the result of `decorated`.
    pub(crate) fn construction_step(
        &self,
        info: &ConstructionInfo,
        service_type: &ServiceType,
        decorated: Option<&ConstructionStep>,
        stack: &mut CompileStack,
        dependent: &str,
    ) -> Result<ConstructionStep, ResolveErrorKind> {
        let (shape, constructor) = match &info.construction {
            Construction::Value(instance) => {
                let activation = Activation::new(instance.clone());
                return Ok(Arc::new(move |_: &ResolveContext| Ok(activation.clone())));
            }
            Construction::Delegate(delegate) => {
                let delegate = delegate.clone();
                let dependent = dependent.to_owned();
                return Ok(Arc::new(move |context: &ResolveContext| {
                    delegate(context).map(Activation::new).map_err(|source| ResolveErrorKind::Activate {
                        implementing_type: dependent.clone(),
                        source,
                    })
                }));
            }
            Construction::Constructor { shape, constructor } => (shape, constructor.clone()),
        };

        let finish = shape
            .finisher_for(service_type)
            .ok_or_else(|| ConfigurationErrorKind::NotAssignable {
                implementing_type: shape.implementing_type().clone(),
                service_type: service_type.clone(),
            })?;

        let arguments = info
            .constructor_dependencies
            .iter()
            .map(|dependency| {
                let decorated = if dependency.is_decorator_target { decorated } else { None };
                self.argument_plan(&dependency.dependency, decorated, stack, dependent)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut properties = Vec::with_capacity(info.property_dependencies.len());
        for property in &info.property_dependencies {
            match self.argument_plan(&property.dependency, None, stack, dependent)? {
                ArgumentPlan::Missing => debug!(property = %property.name, "Optional property skipped"),
                plan => properties.push((property.setter.clone(), plan)),
            }
        }

        let implementing_type = shape.implementing_type().to_string();
        Ok(Arc::new(move |context: &ResolveContext| {
            let activate_error = |source: ActivateErrorKind| ResolveErrorKind::Activate {
                implementing_type: implementing_type.clone(),
                source,
            };

            let mut decorated_disposable = None;
            let mut instances = Vec::with_capacity(arguments.len());
            for plan in &arguments {
                instances.push(plan.produce(context, &mut decorated_disposable)?);
            }
            let mut value = constructor.activate(instances).map_err(activate_error)?;
            for (setter, plan) in &properties {
                let instance = plan.produce(context, &mut decorated_disposable)?;
                setter(&mut *value, instance).map_err(activate_error)?;
            }

            let mut activation = finish(value).map_err(activate_error)?;
            if activation.disposable.is_none() {
                activation.disposable = decorated_disposable;
            }
            Ok(activation)
        }))
    }

    fn argument_plan(
        &self,
        dependency: &Dependency,
        decorated: Option<&ConstructionStep>,
        stack: &mut CompileStack,
        dependent: &str,
    ) -> Result<ArgumentPlan, ResolveErrorKind> {
        if let Some(step) = decorated {
            return Ok(match dependency.service_type.lazy_target() {
                Some(service_type) => ArgumentPlan::LazyDecorated {
                    service_type: service_type.clone(),
                    service_name: dependency.service_name.clone(),
                    step: step.clone(),
                },
                None => ArgumentPlan::Decorated(step.clone()),
            });
        }
        match &dependency.factory {
            Some(ArgumentExpression::Value(instance)) => return Ok(ArgumentPlan::Value(instance.clone())),
            Some(ArgumentExpression::Call(delegate)) => {
                return Ok(ArgumentPlan::Call {
                    delegate: delegate.clone(),
                    dependent: dependent.to_owned(),
                })
            }
            Some(ArgumentExpression::Resolve { .. }) | None => {}
        }

        let key = ServiceKey::new(dependency.service_type.clone(), &dependency.service_name);
        match self.resolver(&key, stack) {
            Ok(resolver) => Ok(ArgumentPlan::Resolve(resolver)),
            Err(ResolveErrorKind::Unresolved { .. }) if !dependency.is_required => {
                debug!(%key, "Optional dependency unresolved");
                Ok(ArgumentPlan::Missing)
            }
            Err(source) => Err(ResolveErrorKind::Dependency {
                dependent: dependent.to_owned(),
                dependency: key.to_string(),
                source: Box::new(source),
            }),
        }
    }

    /// Resolves the settable properties of an externally constructed value.
    pub(crate) fn inject_properties_into(
        &self,
        value: &mut (dyn Any + Send + Sync),
        properties: &[PropertyDependency],
        context: &ResolveContext,
        dependent: &str,
    ) -> Result<(), ResolveErrorKind> {
        let mut stack = CompileStack::default();
        let mut unused = None;
        for property in properties {
            let plan = self.argument_plan(&property.dependency, None, &mut stack, dependent)?;
            if let ArgumentPlan::Missing = plan {
                continue;
            }
            let instance = plan.produce(context, &mut unused)?;
            (property.setter)(value, instance).map_err(|source| ResolveErrorKind::Activate {
                implementing_type: dependent.to_owned(),
                source,
            })?;
        }
        Ok(())
    }
}

fn apply_initializers(registration: &ServiceRegistration, snapshot: &Snapshot, step: ConstructionStep, dependent: &str) -> ConstructionStep {
    let actions: Vec<_> = snapshot
        .initializers()
        .iter()
        .filter(|initializer| (initializer.predicate)(registration))
        .map(|initializer| initializer.action.clone())
        .collect();
    if actions.is_empty() {
        return step;
    }

    debug!(count = actions.len(), "Initializers applied");
    let dependent = dependent.to_owned();
    Arc::new(move |context: &ResolveContext| {
        let activation = step(context)?;
        for action in &actions {
            action(context, &activation.instance).map_err(|source| ResolveErrorKind::Activate {
                implementing_type: dependent.clone(),
                source,
            })?;
        }
        Ok(activation)
    })
}

fn apply_disposer(registration: &ServiceRegistration, step: ConstructionStep) -> ConstructionStep {
    let Some(disposer) = registration.disposer().cloned() else {
        return step;
    };
    Arc::new(move |context: &ResolveContext| {
        let mut activation = step(context)?;
        if activation.disposable.is_none() {
            activation.disposable = disposer(&activation.instance);
        }
        Ok(activation)
    })
}
