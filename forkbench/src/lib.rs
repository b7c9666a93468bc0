#![warn(missing_docs)]
//! # Forkbench
//!
//! Micro-benchmark harness that measures workloads in forked processes.
//!
//! - **Fixtures with scopes**: state built per invocation, per worker thread or once per fork
//! - **Warm-up then measurement**: warm-up samples are reported as diagnostics, never as results
//! - **Process forks**: each fork is a fresh process; crashed forks are excluded, not fatal
//! - **Per-fork statistics**: average time, throughput and percentiles, merged across forks
//!
//! ## Quick Start
//!
//! ```ignore
//! use forkbench::{BenchmarkDescriptor, FixtureScope, Mode, Registry, TimeUnit};
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut registry = Registry::new();
//!     registry.register_fn(
//!         BenchmarkDescriptor::new("sort")
//!             .group("vec")
//!             .mode(Mode::AverageTime)
//!             .time_unit(TimeUnit::Microseconds)
//!             .scope(FixtureScope::PerInvocation),
//!         || Ok((0..10_000u32).rev().collect::<Vec<_>>()),
//!         |data| {
//!             let v = data.get_mut().ok_or_else(|| anyhow::anyhow!("shared fixture"))?;
//!             v.sort_unstable();
//!             Ok(v.len())
//!         },
//!     )?;
//!     forkbench::run(registry)
//! }
//! ```
//!
//! Fixtures in [`FixtureScope::PerRun`] are shared by every worker thread of a
//! fork through `&S`. The harness does not synchronise them; a workload that
//! mutates a per-run fixture must bring its own interior mutability.

// Re-export core types
pub use forkbench_core::{
    Benchmark, BenchmarkDescriptor, BenchmarkOutcome, FailedFork, FixtureFactory, FixtureHandle,
    FixtureManager, FixtureScope, FnWorkload, ForkController, ForkReport, ForkRun, HarnessError,
    InProcess, Measurement, OutcomeStatus, Overrides, Registry, RegistryError, RunOptions,
    SchedulerState, ThreadContext, Timer, WarmupDiagnostics, Workload, consume, invoke,
    run_benchmark, run_fork,
};

// Re-export stats
pub use forkbench_stats::{
    BenchResult, Estimate, MergePolicy, Mode, Percentiles, StatsError, TimeUnit, aggregate,
    merge_forks,
};

// Re-export wire types users configure descriptors with
pub use forkbench_ipc::{ErrorPolicy, Limit, Phase, RunConfig, Sample};

// Re-export reporting
pub use forkbench_report::{OutputFormat, Report, ReportConfig, generate_csv_report, generate_json_report};

// Re-export the process fork controller and CLI pieces
pub use forkbench_cli::{
    Cli, ForkbenchConfig, ProcessForkController, format_human_output, run_with_cli,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        BenchmarkDescriptor, ErrorPolicy, FixtureHandle, FixtureScope, Mode, Registry, TimeUnit,
        Workload, consume,
    };
}

/// Run the forkbench CLI over a registry.
///
/// Call this from your benchmark binary's `main()`:
/// ```ignore
/// fn main() -> anyhow::Result<()> {
///     let mut registry = forkbench::Registry::new();
///     // register benchmarks...
///     forkbench::run(registry)
/// }
/// ```
pub use forkbench_cli::run;
