#![warn(missing_docs)]
//! forkbench statistics
//!
//! Reduces raw invocation samples to per-fork results and merges fork results:
//! - average time per operation with standard error
//! - throughput (operations per time unit)
//! - min/max and tail percentiles for the `all` mode
//! - mean-of-means merging across forks

mod merge;
mod percentiles;
mod summary;
mod units;

pub use merge::{MergePolicy, merge_forks, merge_mean_of_means};
pub use percentiles::{Percentiles, compute_percentiles};
pub use summary::{BenchResult, Estimate, aggregate};
pub use units::{Mode, TimeUnit};

use thiserror::Error;

/// Errors raised while reducing samples
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatsError {
    /// No measurement-phase sample was available
    #[error("insufficient samples: no measurement-phase samples were recorded")]
    InsufficientSamples,

    /// Fork results with different modes or units cannot be merged
    #[error("cannot merge results: {0}")]
    Incompatible(String),
}
