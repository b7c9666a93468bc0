//! Benchmark descriptors
//!
//! A descriptor is built once, handed to the registry and never changed after
//! that. Run-time overrides produce a new effective descriptor instead.

use forkbench_ipc::{ErrorPolicy, Limit, RunConfig};
use forkbench_stats::{Mode, TimeUnit};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Sharing scope of a benchmark's fixture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FixtureScope {
    /// A fresh instance for every invocation
    PerInvocation,
    /// One instance per worker thread, reused across its invocations
    #[default]
    PerThread,
    /// One instance shared by every worker of a fork.
    ///
    /// Workers only get shared access; concurrent mutation must go through
    /// the fixture's own synchronization. The harness adds none.
    PerRun,
}

impl fmt::Display for FixtureScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            FixtureScope::PerInvocation => "invocation",
            FixtureScope::PerThread => "thread",
            FixtureScope::PerRun => "run",
        })
    }
}

/// Run-level settings that take precedence over descriptor values
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    /// Warm-up phase length
    pub warmup: Option<Limit>,
    /// Measurement phase length
    pub measurement: Option<Limit>,
    /// Fork count
    pub forks: Option<u32>,
    /// Worker threads per fork
    pub threads: Option<u32>,
    /// Soft wall-clock budget per fork
    pub timeout: Option<Duration>,
}

/// Identifies one measurable operation and how to measure it
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkDescriptor {
    name: String,
    group: String,
    mode: Mode,
    time_unit: TimeUnit,
    scope: FixtureScope,
    warmup: Limit,
    measurement: Limit,
    forks: u32,
    threads: u32,
    ops_per_invocation: u64,
    timeout: Option<Duration>,
    on_error: ErrorPolicy,
}

impl BenchmarkDescriptor {
    /// New descriptor with default settings: average time in microseconds,
    /// per-thread fixture, 1000 warm-up and 10000 measured invocations, one
    /// fork, one thread.
    pub fn new(name: impl Into<String>) -> Self {
        let defaults = RunConfig::default();
        Self {
            name: name.into(),
            group: String::new(),
            mode: Mode::default(),
            time_unit: TimeUnit::default(),
            scope: FixtureScope::default(),
            warmup: defaults.warmup,
            measurement: defaults.measurement,
            forks: 1,
            threads: defaults.threads,
            ops_per_invocation: defaults.ops_per_invocation,
            timeout: None,
            on_error: defaults.error_policy,
        }
    }

    /// Set the group
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    /// Set the measurement mode
    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the output time unit
    pub fn time_unit(mut self, unit: TimeUnit) -> Self {
        self.time_unit = unit;
        self
    }

    /// Set the fixture scope
    pub fn scope(mut self, scope: FixtureScope) -> Self {
        self.scope = scope;
        self
    }

    /// Warm-up invocation count per worker
    pub fn warmup_iterations(mut self, count: u64) -> Self {
        self.warmup = Limit::Iterations(count);
        self
    }

    /// Warm-up duration per worker
    pub fn warmup_time(mut self, duration: Duration) -> Self {
        self.warmup = Limit::time(duration);
        self
    }

    /// Measured invocation count per worker
    pub fn measurement_iterations(mut self, count: u64) -> Self {
        self.measurement = Limit::Iterations(count);
        self
    }

    /// Measurement duration per worker
    pub fn measurement_time(mut self, duration: Duration) -> Self {
        self.measurement = Limit::time(duration);
        self
    }

    /// Number of isolated forks; 0 runs once in-process (debug only)
    pub fn forks(mut self, forks: u32) -> Self {
        self.forks = forks;
        self
    }

    /// Worker threads per fork
    pub fn threads(mut self, threads: u32) -> Self {
        self.threads = threads.clamp(1, u16::MAX as u32);
        self
    }

    /// Workload calls per timed window
    pub fn ops_per_invocation(mut self, ops: u64) -> Self {
        self.ops_per_invocation = ops.max(1);
        self
    }

    /// Soft wall-clock budget per fork
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// What a failing invocation does
    pub fn on_error(mut self, policy: ErrorPolicy) -> Self {
        self.on_error = policy;
        self
    }

    /// Benchmark name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Group name, empty when ungrouped
    pub fn group_name(&self) -> &str {
        &self.group
    }

    /// `group/name`, or just the name when ungrouped
    pub fn full_name(&self) -> String {
        if self.group.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.group, self.name)
        }
    }

    /// Measurement mode
    pub fn measure_mode(&self) -> Mode {
        self.mode
    }

    /// Output time unit
    pub fn unit(&self) -> TimeUnit {
        self.time_unit
    }

    /// Fixture scope
    pub fn fixture_scope(&self) -> FixtureScope {
        self.scope
    }

    /// Warm-up limit
    pub fn warmup_limit(&self) -> Limit {
        self.warmup
    }

    /// Measurement limit
    pub fn measurement_limit(&self) -> Limit {
        self.measurement
    }

    /// Fork count
    pub fn fork_count(&self) -> u32 {
        self.forks
    }

    /// Threads per fork
    pub fn thread_count(&self) -> u32 {
        self.threads
    }

    /// Error policy
    pub fn error_policy(&self) -> ErrorPolicy {
        self.on_error
    }

    /// Descriptor with overrides applied
    pub fn with_overrides(&self, overrides: &Overrides) -> Self {
        let mut effective = self.clone();
        if let Some(warmup) = overrides.warmup {
            effective.warmup = warmup;
        }
        if let Some(measurement) = overrides.measurement {
            effective.measurement = measurement;
        }
        if let Some(forks) = overrides.forks {
            effective.forks = forks;
        }
        if let Some(threads) = overrides.threads {
            effective = effective.threads(threads);
        }
        if overrides.timeout.is_some() {
            effective.timeout = overrides.timeout;
        }
        effective
    }

    /// Settings shipped to each fork
    pub fn run_config(&self) -> RunConfig {
        RunConfig {
            warmup: self.warmup,
            measurement: self.measurement,
            threads: self.threads,
            ops_per_invocation: self.ops_per_invocation,
            budget_ns: self
                .timeout
                .map(|t| t.as_nanos().clamp(1, u64::MAX as u128) as u64),
            error_policy: self.on_error,
        }
    }
}

/// Short human label for a phase limit, e.g. `5 iters` or `500ms`
pub fn limit_label(limit: &Limit) -> String {
    match limit {
        Limit::Iterations(n) => format!("{} iters", n),
        Limit::Time { nanos } => {
            let nanos = *nanos;
            if nanos >= 1_000_000_000 && nanos % 1_000_000_000 == 0 {
                format!("{}s", nanos / 1_000_000_000)
            } else if nanos >= 1_000_000 && nanos % 1_000_000 == 0 {
                format!("{}ms", nanos / 1_000_000)
            } else if nanos >= 1_000 && nanos % 1_000 == 0 {
                format!("{}us", nanos / 1_000)
            } else {
                format!("{}ns", nanos)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let d = BenchmarkDescriptor::new("sum");
        assert_eq!(d.full_name(), "sum");
        assert_eq!(d.measure_mode(), Mode::AverageTime);
        assert_eq!(d.unit(), TimeUnit::Microseconds);
        assert_eq!(d.fixture_scope(), FixtureScope::PerThread);
        assert_eq!(d.warmup_limit(), Limit::Iterations(1_000));
        assert_eq!(d.measurement_limit(), Limit::Iterations(10_000));
        assert_eq!(d.fork_count(), 1);
        assert_eq!(d.run_config(), RunConfig::default());
    }

    #[test]
    fn test_overrides_leave_original_untouched() {
        let d = BenchmarkDescriptor::new("sum").group("loops").forks(3);
        let effective = d.with_overrides(&Overrides {
            measurement: Some(Limit::Iterations(5)),
            forks: Some(0),
            threads: Some(4),
            ..Default::default()
        });
        assert_eq!(d.fork_count(), 3);
        assert_eq!(effective.fork_count(), 0);
        assert_eq!(effective.run_config().threads, 4);
        assert_eq!(effective.measurement_limit(), Limit::Iterations(5));
        assert_eq!(effective.full_name(), "loops/sum");
    }

    #[test]
    fn test_timeout_becomes_budget() {
        let d = BenchmarkDescriptor::new("x").timeout(Duration::from_millis(250));
        assert_eq!(d.run_config().budget_ns, Some(250_000_000));
    }

    #[test]
    fn test_limit_label() {
        assert_eq!(limit_label(&Limit::Iterations(5)), "5 iters");
        assert_eq!(limit_label(&Limit::time(Duration::from_millis(500))), "500ms");
        assert_eq!(limit_label(&Limit::time(Duration::from_secs(2))), "2s");
        assert_eq!(limit_label(&Limit::Time { nanos: 1_500 }), "1500ns");
    }
}
