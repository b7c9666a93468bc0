//! The measured operation

use crate::fixture::FixtureHandle;

/// Something the harness can invoke and time.
///
/// `invoke` runs synchronously on the calling worker; the whole call is the
/// timed region, so it must not hand work off and return early.
pub trait Workload<S>: Send + Sync {
    /// Value produced by one call; the harness consumes it outside the timed region
    type Output;

    /// Perform one operation against the fixture
    fn invoke(&self, fixture: &mut FixtureHandle<S>) -> anyhow::Result<Self::Output>;
}

/// Adapter turning a closure into a [`Workload`]
pub struct FnWorkload<F>(pub F);

impl<S, T, F> Workload<S> for FnWorkload<F>
where
    F: Fn(&mut FixtureHandle<S>) -> anyhow::Result<T> + Send + Sync,
{
    type Output = T;

    #[inline]
    fn invoke(&self, fixture: &mut FixtureHandle<S>) -> anyhow::Result<T> {
        (self.0)(fixture)
    }
}
