#![allow(dead_code)]

use criterion::{criterion_group, criterion_main, Criterion};
use ioc_engine::{
    Container, Inject, PerContainerLifetime, PerScopeLifetime, ServiceFactory as _, ServiceRegistration, ServiceType, TypeShape,
};
use std::{convert::Infallible, sync::Arc};

struct A(Arc<B>, Arc<C>);
struct B(i32);
struct C(Arc<CA>);
struct CA(Arc<CAA>);
struct CAA(Arc<CAAA>);
struct CAAA(Arc<CAAAA>);
struct CAAAA(Arc<CAAAAA>);
struct CAAAAA;

fn register_chain(container: &Container) {
    container.register_type(
        ServiceType::of::<CAAAAA>(),
        TypeShape::builder::<CAAAAA>().constructor(|| Ok::<_, Infallible>(CAAAAA)).build(),
    );
    container.register_type(
        ServiceType::of::<CAAAA>(),
        TypeShape::builder::<CAAAA>()
            .constructor(|Inject(caaaaa): Inject<CAAAAA>| Ok::<_, Infallible>(CAAAA(caaaaa)))
            .build(),
    );
    container.register_type(
        ServiceType::of::<CAAA>(),
        TypeShape::builder::<CAAA>()
            .constructor(|Inject(caaaa): Inject<CAAAA>| Ok::<_, Infallible>(CAAA(caaaa)))
            .build(),
    );
    container.register_type(
        ServiceType::of::<CAA>(),
        TypeShape::builder::<CAA>()
            .constructor(|Inject(caaa): Inject<CAAA>| Ok::<_, Infallible>(CAA(caaa)))
            .build(),
    );
    container.register_type(
        ServiceType::of::<CA>(),
        TypeShape::builder::<CA>()
            .constructor(|Inject(caa): Inject<CAA>| Ok::<_, Infallible>(CA(caa)))
            .build(),
    );
    container.register_type(
        ServiceType::of::<C>(),
        TypeShape::builder::<C>()
            .constructor(|Inject(ca): Inject<CA>| Ok::<_, Infallible>(C(ca)))
            .build(),
    );
    container.register_type(
        ServiceType::of::<B>(),
        TypeShape::builder::<B>().constructor(|| Ok::<_, Infallible>(B(2))).build(),
    );
}

fn a_shape() -> TypeShape {
    TypeShape::builder::<A>()
        .constructor(|Inject(b): Inject<B>, Inject(c): Inject<C>| Ok::<_, Infallible>(A(b, c)))
        .build()
}

#[inline]
fn container_get(container: &Container) {
    let _ = container.get::<A>().unwrap();
}

#[inline]
fn container_compile_and_get() {
    let container = Container::new();
    register_chain(&container);
    container.register_type(ServiceType::of::<A>(), a_shape());
    container_get(&container);
}

#[inline]
fn container_get_in_scope(container: &Container) {
    let scope = container.begin_scope();
    let _ = scope.get::<A>().unwrap();
    scope.dispose().unwrap();
}

fn criterion_benchmark(c: &mut Criterion) {
    let transient = Container::new();
    register_chain(&transient);
    transient.register_type(ServiceType::of::<A>(), a_shape());

    let per_container = Container::new();
    register_chain(&per_container);
    per_container.register(ServiceRegistration::for_type(ServiceType::of::<A>(), a_shape()).with_lifetime(PerContainerLifetime::default()));

    let per_scope = Container::new();
    register_chain(&per_scope);
    per_scope.register(ServiceRegistration::for_type(ServiceType::of::<A>(), a_shape()).with_lifetime(PerScopeLifetime::default()));

    c.bench_function("container_compile_and_get", |b| b.iter(container_compile_and_get))
        .bench_function("container_get", |b| b.iter(|| container_get(&transient)))
        .bench_function("container_get_per_container", |b| b.iter(|| container_get(&per_container)))
        .bench_function("container_get_in_scope", |b| b.iter(|| container_get_in_scope(&per_scope)));
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
