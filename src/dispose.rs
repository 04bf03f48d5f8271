use std::sync::Arc;

use crate::instance::{cast, Instance};

/// Disposable capability of a service instance.
///
/// Instances are disposed by the container only for lifetimes that track them:
/// per-container instances when the container is disposed, per-scope and per-request ones when their scope ends.
pub trait Dispose: Send + Sync {
    fn dispose(&self);
}

pub type Disposable = Arc<dyn Dispose>;

pub(crate) type InstanceDisposer = Arc<dyn Fn(&Instance) -> Option<Disposable> + Send + Sync>;

struct DisposeHandle<S: ?Sized>(Arc<S>);

impl<S> Dispose for DisposeHandle<S>
where
    S: Dispose + ?Sized,
{
    #[inline]
    fn dispose(&self) {
        self.0.dispose();
    }
}

#[inline]
#[must_use]
pub(crate) fn disposable<S>(handle: Arc<S>) -> Disposable
where
    S: Dispose + ?Sized + 'static,
{
    Arc::new(DisposeHandle(handle))
}

#[must_use]
pub(crate) fn instance_disposer<S>() -> InstanceDisposer
where
    S: Dispose + ?Sized + 'static,
{
    Arc::new(|instance: &Instance| cast::<S>(instance).map(disposable))
}

#[cfg(test)]
mod tests {
    use super::{instance_disposer, Dispose};
    use crate::instance::wrap;

    use std::sync::{
        atomic::{AtomicU8, Ordering},
        Arc,
    };

    trait Connection: Dispose {}

    #[derive(Default)]
    struct Postgres {
        closed: AtomicU8,
    }

    impl Dispose for Postgres {
        fn dispose(&self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl Connection for Postgres {}

    #[test]
    fn test_instance_disposer() {
        let postgres = Arc::new(Postgres::default());
        let instance = wrap(postgres.clone() as Arc<dyn Connection>);

        let disposable = instance_disposer::<dyn Connection>()(&instance).unwrap();
        disposable.dispose();

        assert_eq!(postgres.closed.load(Ordering::SeqCst), 1);
        assert!(instance_disposer::<Postgres>()(&instance).is_none());
    }
}
