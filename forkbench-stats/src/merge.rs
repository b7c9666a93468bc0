//! Cross-fork merging

use crate::percentiles::Percentiles;
use crate::summary::{BenchResult, Estimate, aggregate};
use crate::units::{Mode, TimeUnit};
use crate::StatsError;
use forkbench_ipc::Sample;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How fork results become one descriptor result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergePolicy {
    /// Mean of the per-fork means, each fork weighted equally
    #[default]
    MeanOfMeans,
    /// Concatenate measurement samples from every fork and aggregate once
    Pooled,
}

impl fmt::Display for MergePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            MergePolicy::MeanOfMeans => "mean-of-means",
            MergePolicy::Pooled => "pooled",
        })
    }
}

impl FromStr for MergePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mean-of-means" | "mean_of_means" => Ok(MergePolicy::MeanOfMeans),
            "pooled" => Ok(MergePolicy::Pooled),
            other => Err(format!("Unknown merge policy: {}", other)),
        }
    }
}

/// Reduce the samples of every successful fork to one result.
///
/// Forks without measurement samples are left out. If no fork has any, the
/// outcome is [`StatsError::InsufficientSamples`].
pub fn merge_forks(
    policy: MergePolicy,
    per_fork: &[&[Sample]],
    mode: Mode,
    unit: TimeUnit,
) -> Result<BenchResult, StatsError> {
    match policy {
        MergePolicy::MeanOfMeans => {
            let results: Vec<BenchResult> = per_fork
                .iter()
                .filter_map(|samples| aggregate(samples, mode, unit).ok())
                .collect();
            merge_mean_of_means(&results)
        }
        MergePolicy::Pooled => {
            let pooled: Vec<Sample> = per_fork.iter().flat_map(|s| s.iter().copied()).collect();
            aggregate(&pooled, mode, unit)
        }
    }
}

/// Merge per-fork results as the mean of fork means.
///
/// Standard errors combine as `sqrt(sum se_i^2) / k`. Min and max span every
/// fork; percentiles are averaged field-wise.
pub fn merge_mean_of_means(forks: &[BenchResult]) -> Result<BenchResult, StatsError> {
    let first = forks.first().ok_or(StatsError::InsufficientSamples)?;
    if forks.len() == 1 {
        return Ok(first.clone());
    }
    if let Some(odd) = forks
        .iter()
        .find(|r| r.mode() != first.mode() || r.unit() != first.unit())
    {
        return Err(StatsError::Incompatible(format!(
            "{}/{} vs {}/{}",
            first.mode(),
            first.unit(),
            odd.mode(),
            odd.unit()
        )));
    }

    let average_time = merge_estimates(forks.iter().map(BenchResult::average_time));
    let throughput = merge_estimates(forks.iter().map(BenchResult::throughput));
    let percentile_sets: Vec<&Percentiles> = forks.iter().filter_map(BenchResult::percentiles).collect();

    Ok(BenchResult::from_parts(
        first.mode(),
        first.unit(),
        forks.iter().map(BenchResult::sample_count).sum(),
        forks.iter().map(BenchResult::total_ops).sum(),
        average_time,
        throughput,
        forks.iter().map(BenchResult::min).fold(f64::INFINITY, f64::min),
        forks.iter().map(BenchResult::max).fold(f64::NEG_INFINITY, f64::max),
        Percentiles::mean_of(&percentile_sets),
    ))
}

fn merge_estimates(estimates: impl Iterator<Item = Option<Estimate>>) -> Option<Estimate> {
    let present: Vec<Estimate> = estimates.flatten().collect();
    if present.is_empty() {
        return None;
    }
    let k = present.len() as f64;
    let value = present.iter().map(|e| e.value).sum::<f64>() / k;
    let std_error = present.iter().map(|e| e.std_error.powi(2)).sum::<f64>().sqrt() / k;
    Some(Estimate { value, std_error })
}
