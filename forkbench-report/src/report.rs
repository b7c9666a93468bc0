//! Report Data Structures

use chrono::{DateTime, Utc};
use forkbench_core::{BenchmarkOutcome, OutcomeStatus};
use forkbench_stats::MergePolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Schema version of the JSON report
pub const SCHEMA_VERSION: u32 = 1;

/// Complete benchmark report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub meta: ReportMeta,
    pub results: Vec<BenchmarkOutcome>,
    pub summary: ReportSummary,
}

impl Report {
    /// Assemble a report from outcomes in execution order
    pub fn new(results: Vec<BenchmarkOutcome>, config: ReportConfig, total_duration_ms: f64) -> Self {
        let summary = ReportSummary::from_outcomes(&results, total_duration_ms);
        Self {
            meta: ReportMeta {
                schema_version: SCHEMA_VERSION,
                version: env!("CARGO_PKG_VERSION").to_string(),
                timestamp: Utc::now(),
                system: SystemInfo::collect(),
                config,
            },
            results,
            summary,
        }
    }

    /// Whether any descriptor ended unmeasurable
    pub fn has_unmeasurable(&self) -> bool {
        self.summary.unmeasurable > 0
    }
}

/// Report metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMeta {
    pub schema_version: u32,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub system: SystemInfo,
    pub config: ReportConfig,
}

/// Run-wide settings captured in report metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Warm-up override, e.g. `5 iters` or `500ms`
    pub warmup: Option<String>,
    /// Measurement override
    pub measurement: Option<String>,
    /// Fork override
    pub forks: Option<u32>,
    pub threads: Option<u32>,
    /// Forks run concurrently per descriptor
    pub jobs: usize,
    pub merge: MergePolicy,
}

/// System information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    pub os: String,
    pub arch: String,
    pub cpu: String,
    pub cpu_cores: u32,
}

impl SystemInfo {
    /// Describe the machine this process runs on
    pub fn collect() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            cpu: cpu_model(),
            cpu_cores: std::thread::available_parallelism()
                .map(|n| n.get() as u32)
                .unwrap_or(1),
        }
    }
}

fn cpu_model() -> String {
    std::fs::read_to_string("/proc/cpuinfo")
        .ok()
        .and_then(|info| {
            info.lines()
                .find(|line| line.starts_with("model name"))
                .and_then(|line| line.split(':').nth(1))
                .map(|s| s.trim().to_string())
        })
        .unwrap_or_else(|| "Unknown CPU".to_string())
}

/// Report summary
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_benchmarks: usize,
    pub measured: usize,
    pub unmeasurable: usize,
    /// Unmeasurable descriptors per taxonomy kind
    pub failures_by_kind: BTreeMap<String, usize>,
    /// Forks excluded from aggregation across all descriptors
    pub failed_forks: usize,
    pub total_duration_ms: f64,
}

impl ReportSummary {
    /// Count outcomes
    pub fn from_outcomes(outcomes: &[BenchmarkOutcome], total_duration_ms: f64) -> Self {
        let mut summary = Self {
            total_benchmarks: outcomes.len(),
            total_duration_ms,
            ..Default::default()
        };
        for outcome in outcomes {
            match &outcome.status {
                OutcomeStatus::Measured(m) => {
                    summary.measured += 1;
                    summary.failed_forks += m.failed_forks.len();
                }
                OutcomeStatus::Unmeasurable {
                    error,
                    failed_forks,
                } => {
                    summary.unmeasurable += 1;
                    summary.failed_forks += failed_forks.len();
                    *summary
                        .failures_by_kind
                        .entry(error.kind().to_string())
                        .or_default() += 1;
                }
            }
        }
        summary
    }
}
