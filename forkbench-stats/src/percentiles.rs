//! Percentile Computation
//!
//! Percentiles are taken over every measurement sample; the tail is the signal.

use serde::{Deserialize, Serialize};

/// Standard percentiles, in the result's time unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Percentiles {
    /// 50th percentile (median)
    pub p50: f64,
    /// 90th percentile
    pub p90: f64,
    /// 95th percentile
    pub p95: f64,
    /// 99th percentile
    pub p99: f64,
    /// 99.9th percentile
    pub p999: f64,
}

/// Compute all standard percentiles with a single sort, interpolating
/// linearly between nearest ranks
pub fn compute_percentiles(samples: &[f64]) -> Percentiles {
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    Percentiles {
        p50: percentile_of_sorted(&sorted, 50.0),
        p90: percentile_of_sorted(&sorted, 90.0),
        p95: percentile_of_sorted(&sorted, 95.0),
        p99: percentile_of_sorted(&sorted, 99.0),
        p999: percentile_of_sorted(&sorted, 99.9),
    }
}

fn percentile_of_sorted(sorted: &[f64], percentile: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = (percentile / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
            let lower_idx = rank.floor() as usize;
            let upper_idx = (lower_idx + 1).min(n - 1);
            let fraction = rank - lower_idx as f64;
            sorted[lower_idx] + fraction * (sorted[upper_idx] - sorted[lower_idx])
        }
    }
}

impl Percentiles {
    /// Field-wise mean of several percentile sets
    pub fn mean_of(sets: &[&Percentiles]) -> Option<Percentiles> {
        if sets.is_empty() {
            return None;
        }
        let k = sets.len() as f64;
        let avg = |f: fn(&Percentiles) -> f64| sets.iter().map(|p| f(p)).sum::<f64>() / k;
        Some(Percentiles {
            p50: avg(|p| p.p50),
            p90: avg(|p| p.p90),
            p95: avg(|p| p.p95),
            p99: avg(|p| p.p99),
            p999: avg(|p| p.p999),
        })
    }
}
