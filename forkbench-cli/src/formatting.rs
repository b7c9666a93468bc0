//! Output Formatting
//!
//! Human-readable terminal output: results grouped by benchmark group, then a
//! one-line summary. Unmeasurable descriptors are listed with their error kind.

use forkbench_core::{
    Benchmark, BenchmarkOutcome, FailedFork, Measurement, OutcomeStatus, limit_label,
};
use forkbench_report::Report;
use std::collections::BTreeMap;
use std::fmt::Write;

/// Format a report for human-readable terminal display
pub fn format_human_output(report: &Report) -> String {
    let mut output = String::new();

    output.push('\n');
    output.push_str("forkbench results\n");
    output.push_str(&"=".repeat(60));
    output.push_str("\n\n");

    let mut groups: BTreeMap<&str, Vec<&BenchmarkOutcome>> = BTreeMap::new();
    for outcome in &report.results {
        groups.entry(&outcome.group).or_default().push(outcome);
    }

    for (group, outcomes) in groups {
        let label = if group.is_empty() { "(ungrouped)" } else { group };
        let _ = writeln!(output, "Group: {}", label);
        output.push_str(&"-".repeat(60));
        output.push('\n');

        for outcome in outcomes {
            format_outcome(&mut output, outcome);
            output.push('\n');
        }
    }

    let summary = &report.summary;
    let _ = write!(
        output,
        "Summary: {} measured, {} unmeasurable",
        summary.measured, summary.unmeasurable
    );
    if !summary.failures_by_kind.is_empty() {
        let kinds: Vec<String> = summary
            .failures_by_kind
            .iter()
            .map(|(kind, n)| format!("{kind}: {n}"))
            .collect();
        let _ = write!(output, " ({})", kinds.join(", "));
    }
    let _ = writeln!(output, " in {:.2}s", summary.total_duration_ms / 1000.0);
    output
}

fn format_outcome(output: &mut String, outcome: &BenchmarkOutcome) {
    let forks = match outcome.forks {
        0 => "in-process".to_string(),
        1 => "1 fork".to_string(),
        n => format!("{n} forks"),
    };
    let header = format!(
        "{}  [{}, scope={}, {} x {} thread(s)]",
        outcome.name, outcome.mode, outcome.scope, forks, outcome.threads
    );

    match &outcome.status {
        OutcomeStatus::Measured(m) => {
            let _ = writeln!(output, "  ✓ {}", header);
            format_measurement(output, outcome, m);
        }
        OutcomeStatus::Unmeasurable {
            error,
            failed_forks,
        } => {
            let _ = writeln!(output, "  ✗ {}", header);
            let _ = writeln!(output, "      {}: {}", error.kind(), error.message());
            format_failed_forks(output, failed_forks);
        }
    }
}

fn format_measurement(output: &mut String, outcome: &BenchmarkOutcome, m: &Measurement) {
    let r = &m.result;
    let unit = outcome.unit;

    if let Some(avg) = r.average_time() {
        let _ = writeln!(
            output,
            "      avgt: {:.3} ± {:.3} {}/op  samples: {}",
            avg.value,
            avg.std_error,
            unit,
            r.sample_count()
        );
    }
    if let Some(thrpt) = r.throughput() {
        let _ = writeln!(
            output,
            "      thrpt: {:.3} ± {:.3} ops/{}  samples: {}",
            thrpt.value,
            thrpt.std_error,
            unit,
            r.sample_count()
        );
    }
    let _ = writeln!(output, "      min: {:.3} {unit}  max: {:.3} {unit}", r.min(), r.max());
    if let Some(p) = r.percentiles() {
        let _ = writeln!(
            output,
            "      p50: {:.3}  p90: {:.3}  p99: {:.3}  p99.9: {:.3} {}",
            p.p50, p.p90, p.p99, p.p999, unit
        );
    }
    if m.warmup.samples > 0 {
        let _ = writeln!(
            output,
            "      warm-up: {} samples, mean {:.3} {}/op",
            m.warmup.samples,
            unit.from_nanos(m.warmup.mean_nanos_per_op),
            unit
        );
    }
    if m.skipped > 0 {
        let _ = writeln!(output, "      skipped invocations: {}", m.skipped);
    }
    if m.timed_out {
        output.push_str("      budget exhausted: partial samples\n");
    }
    format_failed_forks(output, &m.failed_forks);
}

fn format_failed_forks(output: &mut String, failed: &[FailedFork]) {
    for f in failed {
        let _ = writeln!(
            output,
            "      fork {} excluded: {}: {}",
            f.fork,
            f.error.kind(),
            f.error.message()
        );
    }
}

/// Format the registered benchmarks for `list`
pub fn format_list<'r>(benchmarks: impl IntoIterator<Item = &'r dyn Benchmark>) -> String {
    let mut groups: BTreeMap<String, Vec<&'r dyn Benchmark>> = BTreeMap::new();
    for b in benchmarks {
        groups
            .entry(b.descriptor().group_name().to_string())
            .or_default()
            .push(b);
    }

    let mut output = String::new();
    let mut total = 0;
    for (group, benches) in groups {
        let label = if group.is_empty() { "(ungrouped)" } else { &group };
        let _ = writeln!(output, "{}:", label);
        for b in benches {
            let d = b.descriptor();
            let _ = writeln!(
                output,
                "  {:<32} {:<5} {:<3} scope={:<10} warmup={:<12} measure={:<12} forks={} threads={}",
                d.name(),
                d.measure_mode(),
                d.unit(),
                d.fixture_scope(),
                limit_label(&d.warmup_limit()),
                limit_label(&d.measurement_limit()),
                d.fork_count(),
                d.thread_count()
            );
            total += 1;
        }
    }
    let _ = writeln!(output, "\n{} benchmark(s)", total);
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use forkbench_core::{BenchmarkDescriptor, InProcess, Registry, RunOptions};
    use forkbench_report::ReportConfig;
    use forkbench_stats::{Mode, TimeUnit};

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry
            .register_stateless(
                BenchmarkDescriptor::new("fast")
                    .group("demo")
                    .mode(Mode::All)
                    .time_unit(TimeUnit::Nanoseconds)
                    .warmup_iterations(2)
                    .measurement_iterations(10),
                || Ok(1u8),
            )
            .unwrap();
        registry
            .register_stateless(
                BenchmarkDescriptor::new("broken")
                    .group("demo")
                    .warmup_iterations(0)
                    .measurement_iterations(1),
                || -> anyhow::Result<()> { anyhow::bail!("no input") },
            )
            .unwrap();
        registry
    }

    #[test]
    fn test_human_output_marks_failures() {
        let registry = registry();
        let outcomes = registry.run_all(&InProcess::new(), &RunOptions::default());
        let report = Report::new(outcomes, ReportConfig::default(), 12.0);
        let text = format_human_output(&report);

        assert!(text.contains("Group: demo"));
        assert!(text.contains("✓ fast"));
        assert!(text.contains("p99.9"));
        assert!(text.contains("✗ broken"));
        assert!(text.contains("WorkloadError: no input"));
        assert!(text.contains("1 measured, 1 unmeasurable (WorkloadError: 1)"));
    }

    #[test]
    fn test_list_shows_settings() {
        let registry = registry();
        let text = format_list(registry.iter());
        assert!(text.starts_with("demo:"));
        assert!(text.contains("fast"));
        assert!(text.contains("warmup=2 iters"));
        assert!(text.contains("2 benchmark(s)"));
    }
}
