use ioc_engine::{
    ConfigurationErrorKind, Container, DecoratorRegistration, ImplementationType, Inject, InjectAll, InjectLazy, PerContainerLifetime,
    ResolveContext, ResolveErrorKind, ServiceFactory as _, ServiceRegistration, ServiceType, TypeShape,
};
use std::{
    convert::Infallible,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use tracing_test::traced_test;

trait Greeter: Send + Sync {
    fn greet(&self) -> String;
}

struct Hello(&'static str);

impl Greeter for Hello {
    fn greet(&self) -> String {
        self.0.to_owned()
    }
}

fn hello_shape(text: &'static str) -> TypeShape {
    TypeShape::builder::<Hello>()
        .constructor(move || Ok::<_, Infallible>(Hello(text)))
        .as_service::<dyn Greeter, _>(|hello| hello)
        .build()
}

struct Wrap {
    label: &'static str,
    inner: Arc<dyn Greeter>,
}

impl Greeter for Wrap {
    fn greet(&self) -> String {
        format!("{}({})", self.label, self.inner.greet())
    }
}

fn wrap_shape(label: &'static str) -> TypeShape {
    TypeShape::builder::<Wrap>()
        .constructor(move |Inject(inner): Inject<dyn Greeter>| Ok::<_, Infallible>(Wrap { label, inner }))
        .as_service::<dyn Greeter, _>(|wrap| wrap)
        .build()
}

fn greeter_container() -> Container {
    let container = Container::new();
    container.register_type(ServiceType::of::<dyn Greeter>(), hello_shape("hello"));
    container
}

#[test]
#[traced_test]
fn test_decorators_apply_in_registration_order() {
    let container = greeter_container();
    container.decorate(DecoratorRegistration::of_type(ServiceType::of::<dyn Greeter>(), wrap_shape("A")));
    container.decorate(DecoratorRegistration::of_type(ServiceType::of::<dyn Greeter>(), wrap_shape("B")));

    assert_eq!(container.get::<dyn Greeter>().unwrap().greet(), "B(A(hello))");
}

#[test]
#[traced_test]
fn test_decorating_invalidates_compiled_resolvers() {
    let container = greeter_container();
    assert_eq!(container.get::<dyn Greeter>().unwrap().greet(), "hello");

    container.decorate(DecoratorRegistration::of_type(ServiceType::of::<dyn Greeter>(), wrap_shape("A")));
    assert_eq!(container.get::<dyn Greeter>().unwrap().greet(), "A(hello)");
}

#[test]
#[traced_test]
fn test_factory_decorator() {
    let container = greeter_container();
    container.decorate(DecoratorRegistration::of_type(ServiceType::of::<dyn Greeter>(), wrap_shape("A")));
    container.decorate(DecoratorRegistration::factory(|_, inner: Arc<dyn Greeter>| {
        Ok::<_, Infallible>(Arc::new(Wrap { label: "F", inner }) as Arc<dyn Greeter>)
    }));

    assert_eq!(container.get::<dyn Greeter>().unwrap().greet(), "F(A(hello))");
}

#[test]
#[traced_test]
fn test_decorator_predicate() {
    let container = greeter_container();
    container.register(ServiceRegistration::for_type(ServiceType::of::<dyn Greeter>(), hello_shape("hi")).with_name("informal"));
    container.decorate(
        DecoratorRegistration::of_type(ServiceType::of::<dyn Greeter>(), wrap_shape("A")).when(|registration| registration.service_name() == "informal"),
    );

    assert_eq!(container.get::<dyn Greeter>().unwrap().greet(), "hello");
    assert_eq!(container.get_named::<dyn Greeter>("informal").unwrap().greet(), "A(hi)");
}

#[test]
#[traced_test]
fn test_deferred_decorators_apply_last() {
    let container = greeter_container();
    container.decorate(DecoratorRegistration::deferred(ServiceType::of::<dyn Greeter>(), |registration| {
        let label = if registration.service_name().is_empty() { "D" } else { "N" };
        Some(ImplementationType::from(wrap_shape(label)))
    }));
    container.decorate(DecoratorRegistration::of_type(ServiceType::of::<dyn Greeter>(), wrap_shape("A")));
    container.decorate(DecoratorRegistration::deferred(ServiceType::of::<dyn Greeter>(), |_| None));

    assert_eq!(container.get::<dyn Greeter>().unwrap().greet(), "D(A(hello))");
}

struct LazyWrap {
    inner: InjectLazy<dyn Greeter>,
}

impl Greeter for LazyWrap {
    fn greet(&self) -> String {
        match self.inner.get() {
            Ok(inner) => format!("lazy({})", inner.greet()),
            Err(err) => err.to_string(),
        }
    }
}

#[test]
#[traced_test]
fn test_lazy_decorator_target() {
    let created = Arc::new(AtomicUsize::new(0));
    let container = Container::new();
    container.register_type(ServiceType::of::<dyn Greeter>(), {
        let created = created.clone();
        TypeShape::builder::<Hello>()
            .constructor(move || {
                created.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Infallible>(Hello("hello"))
            })
            .as_service::<dyn Greeter, _>(|hello| hello)
            .build()
    });
    container.decorate(DecoratorRegistration::of_type(
        ServiceType::of::<dyn Greeter>(),
        TypeShape::builder::<LazyWrap>()
            .constructor(|inner: InjectLazy<dyn Greeter>| Ok::<_, Infallible>(LazyWrap { inner }))
            .as_service::<dyn Greeter, _>(|wrap| wrap)
            .build(),
    ));

    let greeter = container.get::<dyn Greeter>().unwrap();
    assert_eq!(created.load(Ordering::SeqCst), 0);
    assert_eq!(greeter.greet(), "lazy(hello)");
    assert_eq!(greeter.greet(), "lazy(hello)");
    assert_eq!(created.load(Ordering::SeqCst), 1);
}

#[test]
#[traced_test]
fn test_decorated_per_container_service_decorated_once() {
    let decorated = Arc::new(AtomicUsize::new(0));
    let container = Container::new();
    container.register(ServiceRegistration::for_type(ServiceType::of::<dyn Greeter>(), hello_shape("hello")).with_lifetime(PerContainerLifetime::default()));
    container.decorate(DecoratorRegistration::factory({
        let decorated = decorated.clone();
        move |_: &ResolveContext, inner: Arc<dyn Greeter>| {
            decorated.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Infallible>(Arc::new(Wrap { label: "A", inner }) as Arc<dyn Greeter>)
        }
    }));

    let first = container.get::<dyn Greeter>().unwrap();
    assert!(Arc::ptr_eq(&first, &container.get::<dyn Greeter>().unwrap()));
    assert_eq!(first.greet(), "A(hello)");
    assert_eq!(decorated.load(Ordering::SeqCst), 1);
}

struct Composite {
    inner: Arc<dyn Greeter>,
    others: InjectAll<dyn Greeter>,
}

impl Greeter for Composite {
    fn greet(&self) -> String {
        let others = self.others.get().map_or_else(|_| Vec::new(), |others| others.iter().map(|other| other.greet()).collect());
        format!("{} + [{}]", self.inner.greet(), others.join(", "))
    }
}

#[test]
#[traced_test]
fn test_decorator_receiving_other_implementations() {
    let container = Container::new();
    container.register(ServiceRegistration::for_type(ServiceType::of::<dyn Greeter>(), hello_shape("first")).with_name("first"));
    container.register(ServiceRegistration::for_type(ServiceType::of::<dyn Greeter>(), hello_shape("second")).with_name("second"));
    container.decorate(
        DecoratorRegistration::of_type(
            ServiceType::of::<dyn Greeter>(),
            TypeShape::builder::<Composite>()
                .constructor(|Inject(inner): Inject<dyn Greeter>, others: InjectAll<dyn Greeter>| Ok::<_, Infallible>(Composite { inner, others }))
                .as_service::<dyn Greeter, _>(|composite| composite)
                .build(),
        )
        .when(|registration| registration.service_name() == "first"),
    );

    assert_eq!(container.get_named::<dyn Greeter>("first").unwrap().greet(), "first + [second]");

    let all: Vec<_> = container.get_all::<dyn Greeter>().unwrap().iter().map(|greeter| greeter.greet()).collect();
    assert_eq!(all, ["first + [second]", "second"]);
}

struct Unrelated;

#[test]
#[traced_test]
fn test_decorator_without_target_parameter() {
    let container = greeter_container();
    container.decorate(DecoratorRegistration::of_type(
        ServiceType::of::<dyn Greeter>(),
        TypeShape::builder::<Hello>()
            .constructor(|Inject(_): Inject<Unrelated>| Ok::<_, Infallible>(Hello("unrelated")))
            .as_service::<dyn Greeter, _>(|hello| hello)
            .build(),
    ));

    assert!(matches!(
        container.get::<dyn Greeter>().err().unwrap().root_kind(),
        ResolveErrorKind::Configuration(ConfigurationErrorKind::DecoratorTarget { .. })
    ));
}
