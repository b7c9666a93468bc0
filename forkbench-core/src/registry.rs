//! Benchmark Registry
//!
//! Holds registered descriptors in registration order and drives each one
//! through a [`ForkController`]. Descriptors run one at a time; a failing
//! descriptor never stops its siblings.

use crate::descriptor::{BenchmarkDescriptor, Overrides};
use crate::error::HarnessError;
use crate::fixture::{FixtureFactory, FixtureHandle, FixtureManager};
use crate::outcome::{BenchmarkOutcome, FailedFork, Measurement, OutcomeStatus, WarmupDiagnostics};
use crate::scheduler::{ForkRun, run_fork};
use crate::workload::{FnWorkload, Workload};
use forkbench_ipc::{RunConfig, Sample};
use forkbench_stats::{MergePolicy, StatsError, merge_forks};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use thiserror::Error;
use tracing::{info, warn};

/// A registered benchmark with its fixture type erased
pub trait Benchmark: Send + Sync {
    /// The descriptor as registered
    fn descriptor(&self) -> &BenchmarkDescriptor;

    /// Run one fork in the current process with fresh fixtures
    fn run_fork(
        &self,
        fork: u32,
        config: &RunConfig,
        cancel: &AtomicBool,
    ) -> Result<ForkRun, HarnessError>;
}

struct Registered<S, W> {
    descriptor: BenchmarkDescriptor,
    factory: FixtureFactory<S>,
    workload: W,
}

impl<S, W> Benchmark for Registered<S, W>
where
    S: Send + Sync + 'static,
    W: Workload<S> + 'static,
{
    fn descriptor(&self) -> &BenchmarkDescriptor {
        &self.descriptor
    }

    fn run_fork(
        &self,
        fork: u32,
        config: &RunConfig,
        cancel: &AtomicBool,
    ) -> Result<ForkRun, HarnessError> {
        let mut fixtures =
            FixtureManager::new(self.descriptor.fixture_scope(), Arc::clone(&self.factory));
        let run = run_fork(&fixtures, &self.workload, fork, config, cancel);
        fixtures.teardown();
        run
    }
}

/// Registration errors
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Names must be unique so forks can find their benchmark
    #[error("benchmark already registered: {0}")]
    Duplicate(String),
}

/// Outcome of one fork as seen by the controller
#[derive(Debug, Clone)]
pub struct ForkReport {
    /// Fork index
    pub fork: u32,
    /// Samples, or why the fork produced none
    pub outcome: Result<ForkRun, HarnessError>,
}

/// Runs the forks of one descriptor.
///
/// Implementations return one report per fork they started. They may stop
/// early after a fatal error; every report must be complete before returning.
pub trait ForkController {
    /// Run `forks` forks of `benchmark` with `config`
    fn run_forked(&self, benchmark: &dyn Benchmark, config: &RunConfig, forks: u32) -> Vec<ForkReport>;
}

/// Runs forks one after another inside the current process.
///
/// This does not isolate runtime state between forks; it is the zero-fork debug
/// mode and the controller used by tests.
#[derive(Debug, Default)]
pub struct InProcess {
    cancel: AtomicBool,
}

impl InProcess {
    /// New in-process controller
    pub fn new() -> Self {
        Self::default()
    }
}

impl ForkController for InProcess {
    fn run_forked(&self, benchmark: &dyn Benchmark, config: &RunConfig, forks: u32) -> Vec<ForkReport> {
        let mut reports = Vec::with_capacity(forks as usize);
        for fork in 0..forks {
            let outcome = benchmark.run_fork(fork, config, &self.cancel);
            let fatal = outcome.as_ref().err().is_some_and(HarnessError::is_fatal);
            reports.push(ForkReport { fork, outcome });
            if fatal {
                break;
            }
        }
        reports
    }
}

/// Settings applied to every descriptor of a run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Overrides from configuration file and command line
    pub overrides: Overrides,
    /// Cross-fork merge
    pub merge: MergePolicy,
}

/// The set of benchmarks known to a binary
#[derive(Default)]
pub struct Registry {
    benchmarks: Vec<Box<dyn Benchmark>>,
}

impl Registry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a workload with its fixture factory
    pub fn register<S, F, W>(
        &mut self,
        descriptor: BenchmarkDescriptor,
        factory: F,
        workload: W,
    ) -> Result<&mut Self, RegistryError>
    where
        S: Send + Sync + 'static,
        F: Fn() -> anyhow::Result<S> + Send + Sync + 'static,
        W: Workload<S> + 'static,
    {
        let full_name = descriptor.full_name();
        if self.get(&full_name).is_some() {
            return Err(RegistryError::Duplicate(full_name));
        }
        self.benchmarks.push(Box::new(Registered {
            descriptor,
            factory: Arc::new(factory),
            workload,
        }));
        Ok(self)
    }

    /// Register a closure workload with its fixture factory
    pub fn register_fn<S, T, F, G>(
        &mut self,
        descriptor: BenchmarkDescriptor,
        factory: F,
        workload: G,
    ) -> Result<&mut Self, RegistryError>
    where
        S: Send + Sync + 'static,
        T: 'static,
        F: Fn() -> anyhow::Result<S> + Send + Sync + 'static,
        G: Fn(&mut FixtureHandle<S>) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.register(descriptor, factory, FnWorkload(workload))
    }

    /// Register a workload that needs no fixture
    pub fn register_stateless<T, G>(
        &mut self,
        descriptor: BenchmarkDescriptor,
        workload: G,
    ) -> Result<&mut Self, RegistryError>
    where
        T: 'static,
        G: Fn() -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.register_fn(
            descriptor,
            || Ok(()),
            move |_: &mut FixtureHandle<()>| workload(),
        )
    }

    /// Look up a benchmark by `group/name`
    pub fn get(&self, full_name: &str) -> Option<&dyn Benchmark> {
        self.benchmarks
            .iter()
            .find(|b| b.descriptor().full_name() == full_name)
            .map(|b| b.as_ref())
    }

    /// Registered benchmarks in registration order
    pub fn iter(&self) -> impl Iterator<Item = &dyn Benchmark> {
        self.benchmarks.iter().map(|b| b.as_ref())
    }

    /// Number of registered benchmarks
    pub fn len(&self) -> usize {
        self.benchmarks.len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.benchmarks.is_empty()
    }

    /// Run every registered benchmark in registration order
    pub fn run_all(&self, controller: &dyn ForkController, options: &RunOptions) -> Vec<BenchmarkOutcome> {
        self.iter()
            .map(|benchmark| run_benchmark(benchmark, controller, options))
            .collect()
    }
}

/// Run one benchmark through `controller` and reduce its forks to an outcome.
///
/// With zero forks the benchmark runs once in-process regardless of the
/// controller.
pub fn run_benchmark(
    benchmark: &dyn Benchmark,
    controller: &dyn ForkController,
    options: &RunOptions,
) -> BenchmarkOutcome {
    let descriptor = benchmark.descriptor().with_overrides(&options.overrides);
    let config = descriptor.run_config();
    let name = descriptor.full_name();

    let reports = if descriptor.fork_count() == 0 {
        warn!(benchmark = %name, "forks = 0: running in-process, results are less reliable");
        InProcess::new().run_forked(benchmark, &config, 1)
    } else {
        info!(benchmark = %name, forks = descriptor.fork_count(), "running");
        controller.run_forked(benchmark, &config, descriptor.fork_count())
    };

    let status = reduce(&name, &descriptor, reports, options.merge);
    if let OutcomeStatus::Unmeasurable { error, .. } = &status {
        warn!(benchmark = %name, kind = error.kind(), error = %error, "unmeasurable");
    }
    BenchmarkOutcome::new(&descriptor, status)
}

fn reduce(
    name: &str,
    descriptor: &BenchmarkDescriptor,
    reports: Vec<ForkReport>,
    merge: MergePolicy,
) -> OutcomeStatus {
    let attempted = reports.len();
    let mut runs = Vec::with_capacity(attempted);
    let mut failed_forks = Vec::new();
    for report in reports {
        match report.outcome {
            Ok(run) => runs.push(run),
            Err(error) => {
                warn!(benchmark = %name, fork = report.fork, error = %error, "fork excluded");
                failed_forks.push(FailedFork {
                    fork: report.fork,
                    error,
                });
            }
        }
    }

    if let Some(fatal) = failed_forks.iter().find(|f| f.error.is_fatal()) {
        return OutcomeStatus::Unmeasurable {
            error: fatal.error.clone(),
            failed_forks,
        };
    }
    if runs.is_empty() {
        let last = failed_forks
            .last()
            .map(|f| f.error.message().to_string())
            .unwrap_or_else(|| "no fork was started".to_string());
        return OutcomeStatus::Unmeasurable {
            error: HarnessError::ForkFailure(format!("all {attempted} forks failed; last: {last}")),
            failed_forks,
        };
    }

    let per_fork: Vec<&[Sample]> = runs.iter().map(|r| r.samples.as_slice()).collect();
    match merge_forks(merge, &per_fork, descriptor.measure_mode(), descriptor.unit()) {
        Ok(result) => OutcomeStatus::Measured(Measurement {
            result,
            forks_ok: runs.len() as u32,
            failed_forks,
            warmup: WarmupDiagnostics::from_samples(runs.iter().flat_map(|r| r.samples.iter())),
            skipped: runs.iter().map(|r| r.summary.skipped).sum(),
            timed_out: runs.iter().any(|r| r.summary.timed_out),
            fixtures_constructed: runs.iter().map(|r| r.summary.fixtures_constructed).sum(),
        }),
        Err(StatsError::InsufficientSamples) => OutcomeStatus::Unmeasurable {
            error: HarnessError::InsufficientSamples(format!(
                "no measurement samples in {} completed fork(s)",
                runs.len()
            )),
            failed_forks,
        },
        Err(err) => OutcomeStatus::Unmeasurable {
            error: HarnessError::InsufficientSamples(err.to_string()),
            failed_forks,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forkbench_ipc::ForkSummary;

    fn quick(name: &str) -> BenchmarkDescriptor {
        BenchmarkDescriptor::new(name)
            .warmup_iterations(2)
            .measurement_iterations(5)
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut registry = Registry::new();
        registry.register_stateless(quick("a"), || Ok(1)).unwrap();
        registry
            .register_stateless(quick("a").group("g"), || Ok(1))
            .unwrap();
        let dup = registry.register_stateless(quick("a"), || Ok(2));
        assert!(matches!(dup, Err(RegistryError::Duplicate(name)) if name == "a"));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_run_all_keeps_registration_order() {
        let mut registry = Registry::new();
        for name in ["zeta", "alpha", "mid"] {
            registry.register_stateless(quick(name), || Ok(())).unwrap();
        }
        let outcomes = registry.run_all(&InProcess::new(), &RunOptions::default());
        let names: Vec<&str> = outcomes.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, ["zeta", "alpha", "mid"]);
        assert!(outcomes.iter().all(BenchmarkOutcome::is_measured));
    }

    struct Scripted(Vec<Result<Vec<Sample>, HarnessError>>);

    impl ForkController for Scripted {
        fn run_forked(&self, _: &dyn Benchmark, _: &RunConfig, _: u32) -> Vec<ForkReport> {
            self.0
                .iter()
                .enumerate()
                .map(|(fork, outcome)| ForkReport {
                    fork: fork as u32,
                    outcome: outcome.clone().map(|samples| ForkRun {
                        summary: ForkSummary {
                            samples: samples.len() as u64,
                            ..Default::default()
                        },
                        samples,
                    }),
                })
                .collect()
        }
    }

    fn measured(ms: &[u64]) -> Vec<Sample> {
        ms.iter()
            .map(|v| Sample::new(v * 1_000_000, forkbench_ipc::Phase::Measurement))
            .collect()
    }

    fn registry_with_one() -> Registry {
        let mut registry = Registry::new();
        registry
            .register_stateless(quick("x").forks(3), || Ok(()))
            .unwrap();
        registry
    }

    #[test]
    fn test_failed_forks_are_excluded() {
        let registry = registry_with_one();
        let controller = Scripted(vec![
            Ok(measured(&[10])),
            Err(HarnessError::ForkFailure("killed by signal 9".into())),
            Ok(measured(&[30])),
        ]);
        let outcome = registry.run_all(&controller, &RunOptions::default()).remove(0);
        let OutcomeStatus::Measured(m) = &outcome.status else {
            panic!("expected measured, got {:?}", outcome.status);
        };
        assert_eq!(m.forks_ok, 2);
        assert_eq!(m.failed_forks.len(), 1);
        assert_eq!(m.failed_forks[0].fork, 1);
        let avg_us = m.result.average_time().unwrap().value;
        assert!((avg_us - 20_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_all_forks_failed_is_unmeasurable() {
        let registry = registry_with_one();
        let controller = Scripted(vec![
            Err(HarnessError::ForkFailure("exit status 101".into())),
            Err(HarnessError::ForkFailure("exit status 101".into())),
        ]);
        let outcome = registry.run_all(&controller, &RunOptions::default()).remove(0);
        assert_eq!(outcome.error().map(HarnessError::kind), Some("ForkFailure"));
        assert!(outcome.result().is_none());
    }

    #[test]
    fn test_empty_forks_are_insufficient() {
        let registry = registry_with_one();
        let controller = Scripted(vec![Ok(Vec::new())]);
        let outcome = registry.run_all(&controller, &RunOptions::default()).remove(0);
        assert_eq!(
            outcome.error().map(HarnessError::kind),
            Some("InsufficientSamples")
        );
    }

    #[test]
    fn test_zero_forks_runs_in_process() {
        let registry = registry_with_one();
        // Any call to this controller would fail the assertion below.
        let controller = Scripted(vec![]);
        let options = RunOptions {
            overrides: Overrides {
                forks: Some(0),
                ..Default::default()
            },
            ..Default::default()
        };
        let outcome = registry.run_all(&controller, &options).remove(0);
        assert!(outcome.is_measured());
        assert_eq!(outcome.forks, 0);
        assert_eq!(outcome.result().unwrap().sample_count(), 5);
    }
}
