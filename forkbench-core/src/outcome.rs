//! Per-descriptor outcomes

use crate::descriptor::{BenchmarkDescriptor, FixtureScope};
use crate::error::HarnessError;
use forkbench_ipc::Sample;
use forkbench_stats::{BenchResult, Mode, TimeUnit};
use serde::{Deserialize, Serialize};

/// A fork that was left out of aggregation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedFork {
    /// Fork index
    pub fork: u32,
    /// What went wrong
    pub error: HarnessError,
}

/// Timing of the discarded warm-up invocations
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WarmupDiagnostics {
    /// Warm-up samples across all forks and workers
    pub samples: u64,
    /// Mean nanoseconds per operation during warm-up
    pub mean_nanos_per_op: f64,
}

impl WarmupDiagnostics {
    /// Summarise the warm-up samples among `samples`
    pub fn from_samples<'a>(samples: impl IntoIterator<Item = &'a Sample>) -> Self {
        let (count, total) = samples
            .into_iter()
            .filter(|s| !s.is_measurement())
            .fold((0u64, 0.0f64), |(n, sum), s| (n + 1, sum + s.nanos_per_op()));
        Self {
            samples: count,
            mean_nanos_per_op: if count == 0 { 0.0 } else { total / count as f64 },
        }
    }
}

/// A descriptor that produced statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Merged result
    pub result: BenchResult,
    /// Forks that contributed
    pub forks_ok: u32,
    /// Forks left out of aggregation
    pub failed_forks: Vec<FailedFork>,
    /// Warm-up timing
    pub warmup: WarmupDiagnostics,
    /// Invocations dropped under the skip policy
    pub skipped: u64,
    /// Whether any fork hit its soft budget
    pub timed_out: bool,
    /// Fixture constructions across forks
    pub fixtures_constructed: u64,
}

/// Final state of a descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Statistics are available
    Measured(Measurement),
    /// No trustworthy result could be produced
    Unmeasurable {
        /// Reason, with its taxonomy kind
        error: HarnessError,
        /// Individual fork failures, if any
        failed_forks: Vec<FailedFork>,
    },
}

/// Result record for one descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkOutcome {
    /// Benchmark name
    pub name: String,
    /// Group name
    pub group: String,
    /// Measurement mode
    pub mode: Mode,
    /// Output unit
    pub unit: TimeUnit,
    /// Fixture scope
    pub scope: FixtureScope,
    /// Forks requested (0 means in-process)
    pub forks: u32,
    /// Threads per fork
    pub threads: u32,
    /// Outcome
    pub status: OutcomeStatus,
}

impl BenchmarkOutcome {
    pub(crate) fn new(descriptor: &BenchmarkDescriptor, status: OutcomeStatus) -> Self {
        Self {
            name: descriptor.name().to_string(),
            group: descriptor.group_name().to_string(),
            mode: descriptor.measure_mode(),
            unit: descriptor.unit(),
            scope: descriptor.fixture_scope(),
            forks: descriptor.fork_count(),
            threads: descriptor.thread_count(),
            status,
        }
    }

    /// `group/name`, or just the name when ungrouped
    pub fn full_name(&self) -> String {
        if self.group.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.group, self.name)
        }
    }

    /// The merged result, when measured
    pub fn result(&self) -> Option<&BenchResult> {
        match &self.status {
            OutcomeStatus::Measured(m) => Some(&m.result),
            OutcomeStatus::Unmeasurable { .. } => None,
        }
    }

    /// The failure, when unmeasurable
    pub fn error(&self) -> Option<&HarnessError> {
        match &self.status {
            OutcomeStatus::Measured(_) => None,
            OutcomeStatus::Unmeasurable { error, .. } => Some(error),
        }
    }

    /// Whether statistics are available
    pub fn is_measured(&self) -> bool {
        matches!(self.status, OutcomeStatus::Measured(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forkbench_ipc::Phase;

    #[test]
    fn test_warmup_diagnostics_ignore_measurement() {
        let samples = [
            Sample::new(100, Phase::Warmup),
            Sample::new(300, Phase::Warmup),
            Sample::new(1_000_000, Phase::Measurement),
        ];
        let diag = WarmupDiagnostics::from_samples(&samples);
        assert_eq!(diag.samples, 2);
        assert!((diag.mean_nanos_per_op - 200.0).abs() < 1e-9);
        assert_eq!(WarmupDiagnostics::from_samples(std::iter::empty()).samples, 0);
    }

    #[test]
    fn test_unmeasurable_serializes_kind() {
        let outcome = BenchmarkOutcome::new(
            &BenchmarkDescriptor::new("x"),
            OutcomeStatus::Unmeasurable {
                error: HarnessError::ForkFailure("signal 9".into()),
                failed_forks: vec![],
            },
        );
        assert!(!outcome.is_measured());
        assert_eq!(outcome.error().map(HarnessError::kind), Some("ForkFailure"));
    }
}
