#![warn(missing_docs)]
//! forkbench core
//!
//! The execution side of the harness:
//! - `BenchmarkDescriptor` and fixture scopes
//! - `FixtureManager` handing out per-invocation, per-thread or per-run state
//! - the invocation runner and its result sink
//! - the per-worker iteration scheduler
//! - `Registry`, the `ForkController` seam and the in-process controller
//! - `WorkerMain`, the entry point of a fork process

mod descriptor;
mod error;
mod fixture;
mod measure;
mod outcome;
mod registry;
mod runner;
mod scheduler;
mod worker;
mod workload;

pub use descriptor::{BenchmarkDescriptor, FixtureScope, Overrides, limit_label};
pub use error::HarnessError;
pub use fixture::{FixtureFactory, FixtureHandle, FixtureManager, ThreadContext};
pub use measure::Timer;
pub use outcome::{BenchmarkOutcome, FailedFork, Measurement, OutcomeStatus, WarmupDiagnostics};
pub use registry::{
    Benchmark, ForkController, ForkReport, InProcess, Registry, RegistryError, RunOptions,
    run_benchmark,
};
pub use runner::{consume, invoke};
pub use scheduler::{ForkRun, SchedulerState, run_fork};
pub use worker::{WorkerMain, shutdown_requested};
pub use workload::{FnWorkload, Workload};
