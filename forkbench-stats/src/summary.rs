//! Per-fork aggregation
//!
//! Only measurement-phase samples contribute. Each sample is one timed
//! invocation carrying `ops` operations.

use crate::percentiles::{Percentiles, compute_percentiles};
use crate::units::{Mode, TimeUnit};
use crate::StatsError;
use forkbench_ipc::Sample;
use serde::{Deserialize, Serialize};

/// A point estimate with its standard error
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    /// Point value
    pub value: f64,
    /// Standard error of the mean (0 when fewer than two samples)
    pub std_error: f64,
}

/// Aggregated result for one benchmark
///
/// Fields are only populated by [`aggregate`] and the fork merge, and are read
/// through accessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchResult {
    mode: Mode,
    unit: TimeUnit,
    sample_count: u64,
    total_ops: u64,
    average_time: Option<Estimate>,
    throughput: Option<Estimate>,
    min: f64,
    max: f64,
    percentiles: Option<Percentiles>,
}

impl BenchResult {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        mode: Mode,
        unit: TimeUnit,
        sample_count: u64,
        total_ops: u64,
        average_time: Option<Estimate>,
        throughput: Option<Estimate>,
        min: f64,
        max: f64,
        percentiles: Option<Percentiles>,
    ) -> Self {
        Self {
            mode,
            unit,
            sample_count,
            total_ops,
            average_time,
            throughput,
            min,
            max,
            percentiles,
        }
    }

    /// Mode the result was computed for
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Time unit of every value in this result
    pub fn unit(&self) -> TimeUnit {
        self.unit
    }

    /// Number of measurement samples behind the result
    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    /// Operations executed across all measurement samples
    pub fn total_ops(&self) -> u64 {
        self.total_ops
    }

    /// Mean time per operation, for `avgt` and `all`
    pub fn average_time(&self) -> Option<Estimate> {
        self.average_time
    }

    /// Operations per unit, for `thrpt` and `all`
    pub fn throughput(&self) -> Option<Estimate> {
        self.throughput
    }

    /// Fastest per-operation time
    pub fn min(&self) -> f64 {
        self.min
    }

    /// Slowest per-operation time
    pub fn max(&self) -> f64 {
        self.max
    }

    /// Tail percentiles, for `all`
    pub fn percentiles(&self) -> Option<&Percentiles> {
        self.percentiles.as_ref()
    }

    /// The headline estimate: throughput in `thrpt` mode, average time otherwise
    pub fn primary(&self) -> Estimate {
        match (self.mode, self.average_time, self.throughput) {
            (Mode::Throughput, _, Some(t)) => t,
            (_, Some(a), _) => a,
            (_, None, Some(t)) => t,
            _ => Estimate {
                value: 0.0,
                std_error: 0.0,
            },
        }
    }
}

/// Reduce a fork's samples to a result in the given mode and unit.
///
/// Warm-up samples are ignored. With no measurement sample left the result is
/// [`StatsError::InsufficientSamples`].
pub fn aggregate(samples: &[Sample], mode: Mode, unit: TimeUnit) -> Result<BenchResult, StatsError> {
    let measured: Vec<&Sample> = samples.iter().filter(|s| s.is_measurement()).collect();
    if measured.is_empty() {
        return Err(StatsError::InsufficientSamples);
    }

    let per_op: Vec<f64> = measured
        .iter()
        .map(|s| unit.from_nanos(s.nanos_per_op()))
        .collect();
    let total_ops: u64 = measured.iter().map(|s| s.ops.max(1)).sum();

    let average_time = mode.reports_average_time().then(|| mean_with_error(&per_op));

    let throughput = mode.reports_throughput().then(|| {
        // A zero-length sample is below timer resolution; count it as 1ns.
        let total_nanos: u64 = measured.iter().map(|s| s.duration_nanos.max(1)).sum();
        let value = total_ops as f64 / unit.from_nanos(total_nanos as f64);
        let rates: Vec<f64> = measured
            .iter()
            .map(|s| s.ops.max(1) as f64 / unit.from_nanos(s.duration_nanos.max(1) as f64))
            .collect();
        Estimate {
            value,
            std_error: mean_with_error(&rates).std_error,
        }
    });

    let min = per_op.iter().copied().fold(f64::INFINITY, f64::min);
    let max = per_op.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let percentiles = mode.reports_percentiles().then(|| compute_percentiles(&per_op));

    Ok(BenchResult::from_parts(
        mode,
        unit,
        measured.len() as u64,
        total_ops,
        average_time,
        throughput,
        min,
        max,
        percentiles,
    ))
}

fn mean_with_error(values: &[f64]) -> Estimate {
    let n = values.len();
    let mean = values.iter().sum::<f64>() / n as f64;
    let std_error = if n < 2 {
        0.0
    } else {
        let variance =
            values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        variance.sqrt() / (n as f64).sqrt()
    };
    Estimate {
        value: mean,
        std_error,
    }
}
