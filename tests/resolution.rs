#![allow(dead_code)]

use ioc_engine::{
    cast, wrap, ArgumentExpression, Container, ContainerOptions, FactoryExpression, Inject, InjectAll, InjectFactory, InjectLazy,
    InjectNamedFactory, NewExpression, PerContainerLifetime, ResolveErrorKind, ServiceFactory as _, ServiceRegistration, ServiceRequest,
    ServiceType, TypeShape,
};
use std::{
    convert::Infallible,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Barrier,
    },
    thread,
};
use tracing_test::traced_test;

trait Plugin: Send + Sync {
    fn name(&self) -> String;
}

struct NamedPlugin(&'static str);

impl Plugin for NamedPlugin {
    fn name(&self) -> String {
        self.0.to_owned()
    }
}

fn plugin_shape(name: &'static str, created: Arc<AtomicUsize>) -> TypeShape {
    TypeShape::builder::<NamedPlugin>()
        .constructor(move || {
            created.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Infallible>(NamedPlugin(name))
        })
        .as_service::<dyn Plugin, _>(|plugin| plugin)
        .build()
}

struct Settings {
    url: String,
}

struct Database {
    settings: Arc<Settings>,
}

fn database_shape() -> TypeShape {
    TypeShape::builder::<Database>()
        .constructor(|Inject(settings): Inject<Settings>| Ok::<_, Infallible>(Database { settings }))
        .build()
}

#[test]
#[traced_test]
fn test_instance_registration_returns_same_reference() {
    let container = Container::new();
    let settings = Arc::new(Settings { url: "postgres://".to_owned() });
    container.register_instance(settings.clone());

    assert!(Arc::ptr_eq(&container.get::<Settings>().unwrap(), &settings));
    assert!(Arc::ptr_eq(&container.get::<Settings>().unwrap(), &settings));
}

#[test]
#[traced_test]
fn test_per_container_instance_is_reused() {
    let container = Container::new();
    container.register_instance(Arc::new(Settings { url: "postgres://".to_owned() }));
    container.register(ServiceRegistration::for_type(ServiceType::of::<Database>(), database_shape()).with_lifetime(PerContainerLifetime::default()));

    let first = container.get::<Database>().unwrap();
    let second = container.get::<Database>().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.settings.url, "postgres://");
}

#[test]
#[traced_test]
fn test_per_container_instance_created_once_across_threads() {
    let created = Arc::new(AtomicUsize::new(0));
    let container = Container::new();
    container.register(
        ServiceRegistration::for_type(ServiceType::of::<dyn Plugin>(), plugin_shape("shared", created.clone()))
            .with_lifetime(PerContainerLifetime::default()),
    );

    let barrier = Arc::new(Barrier::new(8));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let container = container.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                container.get::<dyn Plugin>().unwrap()
            })
        })
        .collect();
    let plugins: Vec<_> = handles.into_iter().map(|handle| handle.join().unwrap()).collect();

    assert_eq!(created.load(Ordering::SeqCst), 1);
    assert!(plugins.iter().all(|plugin| Arc::ptr_eq(plugin, &plugins[0])));
}

struct Left(Arc<Right>);
struct Right(Arc<Left>);

#[test]
#[traced_test]
fn test_recursive_dependency_detected_before_construction() {
    let constructed = Arc::new(AtomicUsize::new(0));
    let container = Container::new();
    container.register_type(ServiceType::of::<Left>(), {
        let constructed = constructed.clone();
        TypeShape::builder::<Left>()
            .constructor(move |Inject(right): Inject<Right>| {
                constructed.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Infallible>(Left(right))
            })
            .build()
    });
    container.register_type(ServiceType::of::<Right>(), {
        let constructed = constructed.clone();
        TypeShape::builder::<Right>()
            .constructor(move |Inject(left): Inject<Left>| {
                constructed.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Infallible>(Right(left))
            })
            .build()
    });
    container.register_instance(Arc::new(Settings { url: "unrelated".to_owned() }));

    let err = container.get::<Left>().err().unwrap();
    assert_eq!(err.service_type, ServiceType::of::<Left>());
    assert!(matches!(
        err.root_kind(),
        ResolveErrorKind::RecursiveDependency { service_type, .. } if *service_type == ServiceType::of::<Left>()
    ));
    assert_eq!(constructed.load(Ordering::SeqCst), 0);

    assert!(container.get::<Settings>().is_ok());
    assert!(matches!(
        container.get::<Right>().err().unwrap().root_kind(),
        ResolveErrorKind::RecursiveDependency { service_type, .. } if *service_type == ServiceType::of::<Right>()
    ));
    assert_eq!(constructed.load(Ordering::SeqCst), 0);
}

struct Unregistered;

#[test]
#[traced_test]
fn test_unresolvable_service() {
    let container = Container::new();

    assert!(container.try_get::<Unregistered>().is_none());
    assert!(container.try_get_instance(&ServiceType::of::<Unregistered>()).is_none());

    let err = container.get::<Unregistered>().err().unwrap();
    assert_eq!(err.service_type, ServiceType::of::<Unregistered>());
    assert!(matches!(
        err.kind(),
        ResolveErrorKind::Unresolved { service_type, .. } if *service_type == ServiceType::of::<Unregistered>()
    ));
}

#[test]
#[traced_test]
fn test_missing_dependency_is_wrapped_with_dependent() {
    let container = Container::new();
    container.register_type(ServiceType::of::<Database>(), database_shape());

    let err = container.get::<Database>().err().unwrap();
    assert_eq!(err.service_type, ServiceType::of::<Database>());
    assert!(matches!(err.kind(), ResolveErrorKind::Dependency { .. }));
    assert!(matches!(
        err.root_kind(),
        ResolveErrorKind::Unresolved { service_type, .. } if *service_type == ServiceType::of::<Settings>()
    ));
}

struct Cache;

struct Repository {
    settings: Option<Arc<Settings>>,
    cache: Option<Arc<Cache>>,
}

fn repository_shape() -> TypeShape {
    TypeShape::builder::<Repository>()
        .constructor(|| Ok::<_, Infallible>(Repository { settings: None, cache: None }))
        .constructor(|Inject(settings): Inject<Settings>, cache: Option<Inject<Cache>>| {
            Ok::<_, Infallible>(Repository {
                settings: Some(settings),
                cache: cache.map(|Inject(cache)| cache),
            })
        })
        .build()
}

#[test]
#[traced_test]
fn test_greedy_constructor_and_optional_dependency() {
    let container = Container::new();
    container.register_instance(Arc::new(Settings { url: "postgres://".to_owned() }));
    container.register_type(ServiceType::of::<Repository>(), repository_shape());

    let repository = container.get::<Repository>().unwrap();
    assert!(repository.settings.is_some());
    assert!(repository.cache.is_none());

    container.register_instance(Arc::new(Cache));
    assert!(container.get::<Repository>().unwrap().cache.is_some());
}

#[test]
#[traced_test]
fn test_named_registrations_and_redirect() {
    let created = Arc::new(AtomicUsize::new(0));
    let container = Container::new();
    container.register(ServiceRegistration::for_type(ServiceType::of::<dyn Plugin>(), plugin_shape("audit", created.clone())).with_name("Audit"));

    assert_eq!(container.get_named::<dyn Plugin>("audit").unwrap().name(), "audit");
    assert_eq!(container.get::<dyn Plugin>().unwrap().name(), "audit");

    container.register(ServiceRegistration::for_type(ServiceType::of::<dyn Plugin>(), plugin_shape("metrics", created)).with_name("metrics"));
    assert!(container.get::<dyn Plugin>().is_err());
}

#[test]
#[traced_test]
fn test_redirect_disabled() {
    let container = Container::with_options(ContainerOptions {
        redirect_to_single_named: false,
        ..ContainerOptions::default()
    });
    container.register(
        ServiceRegistration::for_type(ServiceType::of::<dyn Plugin>(), plugin_shape("audit", Arc::default())).with_name("audit"),
    );

    assert!(container.get_named::<dyn Plugin>("audit").is_ok());
    assert!(container.try_get::<dyn Plugin>().is_none());
}

#[test]
#[traced_test]
fn test_read_only_registration_kept() {
    let container = Container::new();
    container.register(ServiceRegistration::for_instance(Arc::new(Settings { url: "original".to_owned() })).read_only());
    container.register_instance(Arc::new(Settings { url: "replacement".to_owned() }));

    assert_eq!(container.get::<Settings>().unwrap().url, "original");
}

struct Connection {
    url: String,
    timeout: u64,
    settings: Option<Arc<Settings>>,
}

#[test]
#[traced_test]
fn test_new_expression_arguments() {
    let shape = TypeShape::builder::<Connection>()
        .constructor(|Inject(url): Inject<String>, Inject(timeout): Inject<u64>| {
            Ok::<_, Infallible>(Connection {
                url: (*url).clone(),
                timeout: *timeout,
                settings: None,
            })
        })
        .property("settings", |connection: &mut Connection, Inject(settings): Inject<Settings>| {
            connection.settings = Some(settings);
        })
        .build();

    let container = Container::new();
    container.register_named_instance(Arc::new("replica://".to_owned()), "replica");
    container.register_named_instance(Arc::new(Settings { url: "tuned".to_owned() }), "tuned");
    container.register_factory(
        ServiceType::of::<Connection>(),
        NewExpression::new(shape)
            .argument(ArgumentExpression::resolve_named(ServiceType::of::<String>(), "replica"))
            .argument(ArgumentExpression::value(Arc::new(30_u64)))
            .initialize("settings", ArgumentExpression::resolve_named(ServiceType::of::<Settings>(), "tuned")),
    );

    let connection = container.get::<Connection>().unwrap();
    assert_eq!(connection.url, "replica://");
    assert_eq!(connection.timeout, 30);
    assert_eq!(connection.settings.as_ref().unwrap().url, "tuned");
}

#[test]
#[traced_test]
fn test_opaque_factory() {
    let container = Container::new();
    container.register_instance(Arc::new(Settings { url: "postgres://".to_owned() }));
    container.register_factory(
        ServiceType::of::<Database>(),
        FactoryExpression::opaque(|context| {
            let settings = context.get::<Settings>()?;
            Ok::<_, ioc_engine::ActivateErrorKind>(Arc::new(Database { settings }))
        }),
    );

    assert_eq!(container.get::<Database>().unwrap().settings.url, "postgres://");
}

#[test]
#[traced_test]
fn test_factory_rule() {
    let container = Container::new();
    container.register_factory_rule(
        |service_type, _| service_type.is_rust_type::<Settings>(),
        |request: &ServiceRequest<'_>| {
            Ok::<_, Infallible>(wrap(Arc::new(Settings {
                url: format!("rule://{}", request.service_name),
            })))
        },
        Some(Arc::new(PerContainerLifetime::default())),
    );

    let first = container.get_named::<Settings>("Primary").unwrap();
    assert_eq!(first.url, "rule://primary");
    assert!(Arc::ptr_eq(&first, &container.get_named::<Settings>("primary").unwrap()));
    assert!(!Arc::ptr_eq(&first, &container.get_named::<Settings>("secondary").unwrap()));
    assert!(container.try_get::<Unregistered>().is_none());
}

struct Report {
    database: InjectLazy<Database>,
}

#[test]
#[traced_test]
fn test_lazy_dependency() {
    let created = Arc::new(AtomicUsize::new(0));
    let container = Container::new();
    container.register_instance(Arc::new(Settings { url: "postgres://".to_owned() }));
    container.register_factory(ServiceType::of::<Database>(), {
        let created = created.clone();
        FactoryExpression::opaque(move |context| {
            created.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ioc_engine::ResolveError>(Arc::new(Database {
                settings: context.get::<Settings>()?,
            }))
        })
    });
    container.register_type(
        ServiceType::of::<Report>(),
        TypeShape::builder::<Report>()
            .constructor(|database: InjectLazy<Database>| Ok::<_, Infallible>(Report { database }))
            .build(),
    );

    let report = container.get::<Report>().unwrap();
    assert!(!report.database.is_value_created());
    assert_eq!(created.load(Ordering::SeqCst), 0);

    let database = report.database.get().unwrap();
    assert!(Arc::ptr_eq(&database, &report.database.get().unwrap()));
    assert!(report.database.is_value_created());
    assert_eq!(created.load(Ordering::SeqCst), 1);
}

#[test]
#[traced_test]
fn test_lazy_of_unresolvable_service_fails_at_compile_time() {
    let container = Container::new();
    container.register_type(
        ServiceType::of::<Report>(),
        TypeShape::builder::<Report>()
            .constructor(|database: InjectLazy<Database>| Ok::<_, Infallible>(Report { database }))
            .build(),
    );

    assert!(container.get::<Report>().is_err());
}

#[test]
#[traced_test]
fn test_lazy_and_factory_errors_name_the_requested_service() {
    let container = Container::new();
    container.register(
        ServiceRegistration::for_factory(
            ServiceType::of::<Database>(),
            FactoryExpression::opaque(|context| {
                Ok::<_, ioc_engine::ResolveError>(Arc::new(Database {
                    settings: context.get::<Settings>()?,
                }))
            }),
        )
        .with_name("replica"),
    );

    let lazy = container.get_named_instance(&ServiceType::lazy(ServiceType::of::<Database>()), "replica").unwrap();
    let lazy = cast::<ioc_engine::Lazy>(&lazy).unwrap();
    assert_eq!(lazy.service_name(), "replica");
    assert_eq!(lazy.value().err().unwrap().service_name, "replica");

    let factory = container.get_named_instance(&ServiceType::factory(ServiceType::of::<Database>()), "replica").unwrap();
    let factory = cast::<ioc_engine::Factory>(&factory).unwrap();
    let err = factory.create().err().unwrap();
    assert_eq!(err.service_type, ServiceType::of::<Database>());
    assert_eq!(err.service_name, "replica");
}

struct Workers {
    factory: InjectFactory<dyn Plugin>,
    named: InjectNamedFactory<dyn Plugin>,
}

#[test]
#[traced_test]
fn test_factory_functions() {
    let created = Arc::new(AtomicUsize::new(0));
    let container = Container::new();
    container.register_type(ServiceType::of::<dyn Plugin>(), plugin_shape("default", created.clone()));
    container.register(ServiceRegistration::for_type(ServiceType::of::<dyn Plugin>(), plugin_shape("audit", created.clone())).with_name("audit"));
    container.register_type(
        ServiceType::of::<Workers>(),
        TypeShape::builder::<Workers>()
            .constructor(|factory: InjectFactory<dyn Plugin>, named: InjectNamedFactory<dyn Plugin>| {
                Ok::<_, Infallible>(Workers { factory, named })
            })
            .build(),
    );

    let workers = container.get::<Workers>().unwrap();
    assert_eq!(created.load(Ordering::SeqCst), 0);

    let first = workers.factory.create().unwrap();
    let second = workers.factory.create().unwrap();
    assert_eq!(first.name(), "default");
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(workers.named.create("AUDIT").unwrap().name(), "audit");
    assert_eq!(workers.named.create("").unwrap().name(), "default");
    assert!(workers.named.create("missing").is_err());
    assert_eq!(created.load(Ordering::SeqCst), 4);
}

#[test]
#[traced_test]
fn test_all_instances_are_created_lazily() {
    let created = Arc::new(AtomicUsize::new(0));
    let container = Container::new();
    for name in ["first", "second", "third"] {
        container.register(ServiceRegistration::for_type(ServiceType::of::<dyn Plugin>(), plugin_shape(name, created.clone())).with_name(name));
    }

    let collection = container.get_all_instances(&ServiceType::of::<dyn Plugin>()).unwrap();
    assert_eq!(collection.len(), 3);
    assert!(!collection.is_created());
    assert_eq!(created.load(Ordering::SeqCst), 0);

    let names: Vec<_> = collection.cast::<dyn Plugin>().unwrap().iter().map(|plugin| plugin.name()).collect();
    assert_eq!(names, ["first", "second", "third"]);
    assert!(collection.is_created());
    assert_eq!(created.load(Ordering::SeqCst), 3);

    collection.instances().unwrap();
    assert_eq!(created.load(Ordering::SeqCst), 3);
}

struct Host {
    plugins: InjectAll<dyn Plugin>,
}

#[test]
#[traced_test]
fn test_collection_dependency() {
    let container = Container::new();
    assert!(container.get_all::<dyn Plugin>().unwrap().is_empty());

    container.register(ServiceRegistration::for_type(ServiceType::of::<dyn Plugin>(), plugin_shape("a", Arc::default())).with_name("a"));
    container.register(ServiceRegistration::for_type(ServiceType::of::<dyn Plugin>(), plugin_shape("b", Arc::default())).with_name("b"));
    container.register_type(
        ServiceType::of::<Host>(),
        TypeShape::builder::<Host>()
            .constructor(|plugins: InjectAll<dyn Plugin>| Ok::<_, Infallible>(Host { plugins }))
            .build(),
    );

    let host = container.get::<Host>().unwrap();
    assert_eq!(host.plugins.len(), 2);
    assert_eq!(host.plugins.get().unwrap().len(), 2);
}

#[derive(Default)]
struct Service {
    settings: Option<Arc<Settings>>,
    cache: Option<Arc<Cache>>,
}

fn service_shape() -> TypeShape {
    TypeShape::builder::<Service>()
        .constructor(|| Ok::<_, Infallible>(Service::default()))
        .property("settings", |service: &mut Service, Inject(settings): Inject<Settings>| service.settings = Some(settings))
        .property("cache", |service: &mut Service, cache: Option<Inject<Cache>>| {
            service.cache = cache.map(|Inject(cache)| cache);
        })
        .build()
}

#[test]
#[traced_test]
fn test_property_injection() {
    let container = Container::new();
    container.register_instance(Arc::new(Settings { url: "postgres://".to_owned() }));
    container.register_type(ServiceType::of::<Service>(), service_shape());

    let service = container.get::<Service>().unwrap();
    assert_eq!(service.settings.as_ref().unwrap().url, "postgres://");
    assert!(service.cache.is_none());
}

#[test]
#[traced_test]
fn test_property_injection_disabled() {
    let container = Container::with_options(ContainerOptions {
        enable_property_injection: false,
        ..ContainerOptions::default()
    });
    container.register_type(ServiceType::of::<Service>(), service_shape());

    assert!(container.get::<Service>().unwrap().settings.is_none());
}

#[test]
#[traced_test]
fn test_inject_properties_of_external_value() {
    let container = Container::new();
    container.register_instance(Arc::new(Settings { url: "postgres://".to_owned() }));
    container.add_type_metadata(service_shape());

    let service = container.inject_properties(Service::default()).unwrap();
    assert_eq!(service.settings.unwrap().url, "postgres://");

    let unknown = container.inject_properties(Cache);
    assert!(unknown.is_ok());
}

#[test]
#[traced_test]
fn test_initializers_run_after_construction() {
    let initialized = Arc::new(AtomicUsize::new(0));
    let container = Container::new();
    container.register(ServiceRegistration::for_type(ServiceType::of::<dyn Plugin>(), plugin_shape("a", Arc::default())).with_name("a"));
    container.register(ServiceRegistration::for_type(ServiceType::of::<dyn Plugin>(), plugin_shape("b", Arc::default())).with_name("b"));
    container.initialize(|registration| registration.service_name() == "a", {
        let initialized = initialized.clone();
        move |_, instance| {
            assert_eq!(cast::<dyn Plugin>(instance).unwrap().name(), "a");
            initialized.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Infallible>(())
        }
    });

    container.get_named::<dyn Plugin>("a").unwrap();
    container.get_named::<dyn Plugin>("a").unwrap();
    container.get_named::<dyn Plugin>("b").unwrap();
    assert_eq!(initialized.load(Ordering::SeqCst), 2);
}

#[test]
#[traced_test]
fn test_activation_error() {
    let container = Container::new();
    container.register_type(
        ServiceType::of::<Cache>(),
        TypeShape::builder::<Cache>()
            .constructor(|| Err::<Cache, _>(anyhow::anyhow!("cache is unavailable")))
            .build(),
    );

    assert!(matches!(container.get::<Cache>().err().unwrap().kind(), ResolveErrorKind::Activate { .. }));
}
