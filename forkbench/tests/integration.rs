//! Integration tests for forkbench
//!
//! These run registries end to end through the in-process fork controller.

use forkbench::{
    BenchmarkDescriptor, ErrorPolicy, FixtureHandle, FixtureScope, InProcess, Mode, OutcomeStatus,
    Overrides, Registry, RunOptions, TimeUnit, Workload, run_benchmark,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn quick(name: &str) -> BenchmarkDescriptor {
    BenchmarkDescriptor::new(name)
        .group("it")
        .warmup_iterations(3)
        .measurement_iterations(5)
}

fn run_all(registry: &Registry) -> Vec<forkbench::BenchmarkOutcome> {
    registry.run_all(&InProcess::new(), &RunOptions::default())
}

/// Sample count is measurement × threads × forks under count-based termination
#[test]
fn test_sample_count_matches_configuration() {
    let mut registry = Registry::new();
    registry
        .register_stateless(quick("count").threads(3).forks(2), || Ok(17u64 * 3))
        .unwrap();

    let outcomes = run_all(&registry);
    let measurement = match &outcomes[0].status {
        OutcomeStatus::Measured(m) => m,
        other => panic!("expected measurement, got {other:?}"),
    };

    assert_eq!(measurement.result.sample_count(), 5 * 3 * 2);
    assert_eq!(measurement.forks_ok, 2);
    assert_eq!(measurement.warmup.samples, 3 * 3 * 2);
    assert!(measurement.failed_forks.is_empty());
}

/// Slow warm-up invocations do not leak into the mean
#[test]
fn test_warmup_samples_excluded_from_result() {
    let mut registry = Registry::new();
    registry
        .register_fn(
            quick("warm")
                .scope(FixtureScope::PerThread)
                .time_unit(TimeUnit::Milliseconds),
            || Ok(0u32),
            |calls: &mut FixtureHandle<u32>| {
                let calls = calls
                    .get_mut()
                    .ok_or_else(|| anyhow::anyhow!("per-thread fixture is owned"))?;
                *calls += 1;
                if *calls <= 3 {
                    std::thread::sleep(Duration::from_millis(30));
                }
                Ok(*calls)
            },
        )
        .unwrap();

    let outcomes = run_all(&registry);
    let measurement = match &outcomes[0].status {
        OutcomeStatus::Measured(m) => m,
        other => panic!("expected measurement, got {other:?}"),
    };

    assert_eq!(measurement.result.sample_count(), 5);
    let mean_ms = measurement.result.average_time().unwrap().value;
    assert!(mean_ms < 30.0, "warm-up leaked into mean: {mean_ms}ms");
    assert!(measurement.warmup.mean_nanos_per_op >= 30_000_000.0);
}

/// Two invocations never see the same per-invocation fixture
#[test]
fn test_per_invocation_fixtures_are_distinct() {
    let next_id = Arc::new(AtomicU64::new(0));
    let seen = Arc::new(Mutex::new(Vec::new()));

    let factory_ids = Arc::clone(&next_id);
    let seen_in_workload = Arc::clone(&seen);

    let mut registry = Registry::new();
    registry
        .register_fn(
            quick("fresh").scope(FixtureScope::PerInvocation).threads(2),
            move || Ok(factory_ids.fetch_add(1, Ordering::SeqCst)),
            move |id: &mut FixtureHandle<u64>| {
                seen_in_workload
                    .lock()
                    .map_err(|_| anyhow::anyhow!("poisoned"))?
                    .push(**id);
                Ok(())
            },
        )
        .unwrap();

    let outcomes = run_all(&registry);
    assert!(outcomes[0].is_measured());

    let seen = seen.lock().unwrap();
    // warm-up and measurement invocations on both threads
    assert_eq!(seen.len(), (3 + 5) * 2);
    let distinct: HashSet<u64> = seen.iter().copied().collect();
    assert_eq!(distinct.len(), seen.len());
    assert_eq!(next_id.load(Ordering::SeqCst), seen.len() as u64);
}

/// Workload over a per-run fixture shared by all worker threads
struct SumShared {
    last: Arc<AtomicU64>,
}

impl Workload<Vec<u64>> for SumShared {
    type Output = u64;

    fn invoke(&self, fixture: &mut FixtureHandle<Vec<u64>>) -> anyhow::Result<u64> {
        let sum = fixture.iter().sum();
        self.last.store(sum, Ordering::Relaxed);
        Ok(sum)
    }
}

/// A per-run fixture is built exactly once even with several threads
#[test]
fn test_per_run_fixture_constructed_once() {
    let constructions = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&constructions);
    let last = Arc::new(AtomicU64::new(0));

    let mut registry = Registry::new();
    registry
        .register(
            quick("shared").scope(FixtureScope::PerRun).threads(8),
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(5));
                Ok((1..=100u64).collect::<Vec<_>>())
            },
            SumShared {
                last: Arc::clone(&last),
            },
        )
        .unwrap();

    let outcomes = run_all(&registry);
    let measurement = match &outcomes[0].status {
        OutcomeStatus::Measured(m) => m,
        other => panic!("expected measurement, got {other:?}"),
    };

    assert_eq!(constructions.load(Ordering::SeqCst), 1);
    assert_eq!(measurement.fixtures_constructed, 1);
    assert_eq!(measurement.result.sample_count(), 5 * 8);
    assert_eq!(last.load(Ordering::Relaxed), 5050);
}

/// A measurement phase that ends before any invocation is unmeasurable
#[test]
fn test_zero_time_measurement_is_insufficient() {
    let mut registry = Registry::new();
    registry
        .register_stateless(
            BenchmarkDescriptor::new("empty")
                .warmup_iterations(1)
                .measurement_time(Duration::ZERO),
            || Ok(()),
        )
        .unwrap();

    let outcomes = run_all(&registry);
    let error = outcomes[0].error().expect("should be unmeasurable");
    assert_eq!(error.kind(), "InsufficientSamples");
    assert!(outcomes[0].result().is_none());
}

/// A failing workload stops its own descriptor only
#[test]
fn test_workload_error_does_not_stop_siblings() {
    let mut registry = Registry::new();
    registry
        .register_stateless(quick("before"), || Ok(1u8))
        .unwrap()
        .register_stateless(quick("broken").forks(3), || -> anyhow::Result<()> {
            anyhow::bail!("division by zero")
        })
        .unwrap()
        .register_stateless(quick("after"), || Ok(2u8))
        .unwrap();

    let outcomes = run_all(&registry);
    assert_eq!(outcomes.len(), 3);
    assert!(outcomes[0].is_measured());
    assert!(outcomes[2].is_measured());

    match &outcomes[1].status {
        OutcomeStatus::Unmeasurable {
            error,
            failed_forks,
        } => {
            assert_eq!(error.kind(), "WorkloadError");
            assert!(error.message().contains("division by zero"));
            // the first fatal fork stops the remaining ones
            assert_eq!(failed_forks.len(), 1);
        }
        other => panic!("expected unmeasurable, got {other:?}"),
    }
}

/// Panicking workloads surface as workload errors
#[test]
fn test_workload_panic_is_reported() {
    let mut registry = Registry::new();
    registry
        .register_stateless(quick("panics"), || -> anyhow::Result<()> {
            panic!("index out of bounds")
        })
        .unwrap()
        .register_stateless(quick("fine"), || Ok(()))
        .unwrap();

    let outcomes = run_all(&registry);
    assert_eq!(outcomes[0].error().map(|e| e.kind()), Some("WorkloadError"));
    assert!(outcomes[1].is_measured());
}

/// Skipping errors keeps the descriptor measurable
#[test]
fn test_skip_sample_policy() {
    let calls = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&calls);

    let mut registry = Registry::new();
    registry
        .register_stateless(
            quick("flaky")
                .warmup_iterations(0)
                .measurement_iterations(10)
                .on_error(ErrorPolicy::SkipSample),
            move || {
                if counter.fetch_add(1, Ordering::SeqCst) % 2 == 0 {
                    anyhow::bail!("odd call");
                }
                Ok(())
            },
        )
        .unwrap();

    let outcomes = run_all(&registry);
    let measurement = match &outcomes[0].status {
        OutcomeStatus::Measured(m) => m,
        other => panic!("expected measurement, got {other:?}"),
    };
    assert_eq!(measurement.skipped + measurement.result.sample_count(), 10);
    assert!(measurement.skipped > 0);
}

/// Fixture construction failure aborts that descriptor only
#[test]
fn test_fixture_init_error_does_not_stop_siblings() {
    let mut registry = Registry::new();
    registry
        .register_fn(
            quick("no_fixture").forks(2),
            || -> anyhow::Result<Vec<u8>> { anyhow::bail!("dataset missing") },
            |data: &mut FixtureHandle<Vec<u8>>| Ok(data.len()),
        )
        .unwrap()
        .register_stateless(quick("sibling"), || Ok(()))
        .unwrap();

    let outcomes = run_all(&registry);
    let error = outcomes[0].error().expect("fixture failure is unmeasurable");
    assert_eq!(error.kind(), "FixtureInitError");
    assert!(error.message().contains("dataset missing"));
    assert!(outcomes[1].is_measured());
}

/// Running the same deterministic descriptor twice gives the same shape of result
#[test]
fn test_repeated_runs_are_independent() {
    let constructions = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&constructions);

    let mut registry = Registry::new();
    registry
        .register_fn(
            quick("repeat").scope(FixtureScope::PerRun).threads(2),
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok((0..1_000u64).collect::<Vec<_>>())
            },
            |data: &mut FixtureHandle<Vec<u64>>| Ok(data.iter().sum::<u64>()),
        )
        .unwrap();

    let first = run_all(&registry);
    let second = run_all(&registry);

    let (a, b) = (first[0].result().unwrap(), second[0].result().unwrap());
    assert_eq!(a.sample_count(), b.sample_count());
    assert_eq!(a.total_ops(), b.total_ops());
    // one fresh fixture per run, none carried over
    assert_eq!(constructions.load(Ordering::SeqCst), 2);
}

/// Command line style overrides beat descriptor settings
#[test]
fn test_overrides_apply() {
    let mut registry = Registry::new();
    registry
        .register_stateless(quick("override").threads(4).forks(3), || Ok(()))
        .unwrap();

    let options = RunOptions {
        overrides: Overrides {
            measurement: Some(forkbench::Limit::Iterations(2)),
            forks: Some(1),
            threads: Some(1),
            ..Overrides::default()
        },
        ..RunOptions::default()
    };
    let benchmark = registry.get("it/override").unwrap();
    let outcome = run_benchmark(benchmark, &InProcess::new(), &options);

    assert_eq!(outcome.forks, 1);
    assert_eq!(outcome.threads, 1);
    assert_eq!(outcome.result().unwrap().sample_count(), 2);
}

/// Zero forks still measures, in-process
#[test]
fn test_zero_forks_runs_in_process() {
    let mut registry = Registry::new();
    registry
        .register_stateless(quick("debug").forks(0).mode(Mode::All), || Ok(()))
        .unwrap();

    let outcomes = run_all(&registry);
    let result = outcomes[0].result().expect("measured in-process");
    assert_eq!(result.sample_count(), 5);
    assert!(result.percentiles().is_some());
}

/// Reports built from outcomes flag unmeasurable descriptors
#[test]
fn test_report_from_mixed_outcomes() {
    let mut registry = Registry::new();
    registry
        .register_stateless(quick("ok"), || Ok(()))
        .unwrap()
        .register_stateless(quick("bad"), || -> anyhow::Result<()> { anyhow::bail!("nope") })
        .unwrap();

    let outcomes = run_all(&registry);
    let report = forkbench::Report::new(outcomes, forkbench::ReportConfig::default(), 1.0);

    assert!(report.has_unmeasurable());
    assert_eq!(report.summary.measured, 1);
    assert_eq!(report.summary.unmeasurable, 1);
    assert_eq!(report.summary.failures_by_kind.get("WorkloadError"), Some(&1));

    let json = forkbench::generate_json_report(&report).unwrap();
    assert!(json.contains("\"status\": \"unmeasurable\""));
    assert!(json.contains("WorkloadError"));

    let human = forkbench::format_human_output(&report);
    assert!(human.contains("it/ok") || human.contains("ok"));
}
