//! Fixture Manager
//!
//! Owns benchmark state and hands it out at the granularity of its scope:
//! - per-invocation: built before every call, dropped right after
//! - per-thread: built on a worker's first acquire, dropped when the worker is done
//! - per-run: built once for all workers of a fork, dropped with the manager

use crate::descriptor::FixtureScope;
use crate::error::{HarnessError, panic_message};
use once_cell::sync::OnceCell;
use std::ops::Deref;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Constructor for a fixture
pub type FixtureFactory<S> = Arc<dyn Fn() -> anyhow::Result<S> + Send + Sync>;

/// Access to a fixture for one invocation.
///
/// Per-invocation and per-thread fixtures are owned by the worker and can be
/// borrowed mutably. Per-run fixtures are shared between workers and only give
/// `&S`.
pub enum FixtureHandle<S> {
    /// Exclusively owned by the current worker
    Owned(S),
    /// Shared with every other worker of the fork
    Shared(Arc<S>),
}

impl<S> FixtureHandle<S> {
    /// Mutable access, available for owned fixtures only
    pub fn get_mut(&mut self) -> Option<&mut S> {
        match self {
            FixtureHandle::Owned(state) => Some(state),
            FixtureHandle::Shared(_) => None,
        }
    }

    /// Whether the fixture is shared between workers
    pub fn is_shared(&self) -> bool {
        matches!(self, FixtureHandle::Shared(_))
    }
}

impl<S> Deref for FixtureHandle<S> {
    type Target = S;

    fn deref(&self) -> &S {
        match self {
            FixtureHandle::Owned(state) => state,
            FixtureHandle::Shared(state) => &**state,
        }
    }
}

/// Per-worker fixture slot
pub struct ThreadContext<S> {
    worker: u16,
    held: Option<FixtureHandle<S>>,
}

impl<S> ThreadContext<S> {
    /// Empty slot for worker `worker`
    pub fn new(worker: u16) -> Self {
        Self { worker, held: None }
    }

    /// Worker index
    pub fn worker(&self) -> u16 {
        self.worker
    }

    /// Whether a fixture is currently held
    pub fn is_holding(&self) -> bool {
        self.held.is_some()
    }
}

/// Creates and tears down fixtures for one fork of one descriptor
pub struct FixtureManager<S> {
    scope: FixtureScope,
    factory: FixtureFactory<S>,
    // The failure is cached too, so a failed per-run fixture is never rebuilt.
    shared: OnceCell<Result<Arc<S>, HarnessError>>,
    constructed: AtomicUsize,
}

impl<S> FixtureManager<S> {
    /// Manager for `scope` building fixtures with `factory`
    pub fn new(scope: FixtureScope, factory: FixtureFactory<S>) -> Self {
        Self {
            scope,
            factory,
            shared: OnceCell::new(),
            constructed: AtomicUsize::new(0),
        }
    }

    /// Scope this manager enforces
    pub fn scope(&self) -> FixtureScope {
        self.scope
    }

    /// Number of times the factory has been called
    pub fn constructed(&self) -> usize {
        self.constructed.load(Ordering::Acquire)
    }

    /// Scope entry for a worker (the INIT step).
    ///
    /// Builds the per-thread or per-run fixture so that construction failures
    /// surface before any invocation. Per-invocation fixtures are built lazily.
    pub fn prepare(&self, ctx: &mut ThreadContext<S>) -> Result<(), HarnessError> {
        match self.scope {
            FixtureScope::PerInvocation => Ok(()),
            FixtureScope::PerThread | FixtureScope::PerRun => self.acquire(ctx).map(|_| ()),
        }
    }

    /// Fixture for the next invocation of this worker
    pub fn acquire<'c>(
        &self,
        ctx: &'c mut ThreadContext<S>,
    ) -> Result<&'c mut FixtureHandle<S>, HarnessError> {
        let handle = match ctx.held.take() {
            Some(handle) => handle,
            None => match self.scope {
                FixtureScope::PerInvocation | FixtureScope::PerThread => {
                    FixtureHandle::Owned(self.construct()?)
                }
                FixtureScope::PerRun => FixtureHandle::Shared(self.shared_instance()?),
            },
        };
        Ok(ctx.held.insert(handle))
    }

    /// End of an invocation; discards per-invocation fixtures
    pub fn release(&self, ctx: &mut ThreadContext<S>) {
        if self.scope == FixtureScope::PerInvocation {
            ctx.held = None;
        }
    }

    /// Scope exit for a worker (the DONE step)
    pub fn finish(&self, ctx: &mut ThreadContext<S>) {
        ctx.held = None;
    }

    /// Drop the per-run fixture once every worker has finished
    pub fn teardown(&mut self) {
        self.shared.take();
    }

    fn shared_instance(&self) -> Result<Arc<S>, HarnessError> {
        self.shared
            .get_or_init(|| self.construct().map(Arc::new))
            .clone()
    }

    fn construct(&self) -> Result<S, HarnessError> {
        self.constructed.fetch_add(1, Ordering::AcqRel);
        match panic::catch_unwind(AssertUnwindSafe(|| (self.factory)())) {
            Ok(Ok(state)) => Ok(state),
            Ok(Err(err)) => Err(HarnessError::FixtureInit(format!("{err:#}"))),
            Err(panic) => Err(HarnessError::FixtureInit(panic_message(&*panic))),
        }
    }
}
