//! Forkbench demo benchmarks
//!
//! Small comparisons of equivalent ways to write the same loop, registered as
//! forkbench descriptors. Not published; the `micro` binary runs them:
//!
//! ```sh
//! cargo run --release -p forkbench-demos --bin micro -- run --include filters
//! ```
//!
//! | Group | Question |
//! |-------|----------|
//! | `iterations` | indexed loop vs `for` vs iterator vs `for_each` vs `rayon` |
//! | `dispatch` | closures vs trait objects, capturing and not |
//! | `filters` | one combined predicate vs four chained `filter`s |
//! | `pipelines` | iterator pipeline vs parallel pipeline vs hand-written loops |
//!
//! Random fixtures come from [`StdRng`](rand::rngs::StdRng) seeded with
//! [`SEED`], so every run sees the same data.

pub mod dispatch;
pub mod filters;
pub mod iterations;
pub mod pipelines;

use forkbench::Registry;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Seed for every generated fixture
pub const SEED: u64 = 0x5EED_F0CC;

/// `len` doubles uniformly drawn from `[low, high)`
pub fn random_doubles(rng: &mut StdRng, len: usize, low: f64, high: f64) -> Vec<f64> {
    (0..len).map(|_| rng.gen_range(low..high)).collect()
}

/// `len` seeded doubles from `[low, high)`
pub fn seeded_doubles(seed: u64, len: usize, low: f64, high: f64) -> Vec<f64> {
    random_doubles(&mut StdRng::seed_from_u64(seed), len, low, high)
}

/// Registry holding every demo group, in declaration order
pub fn registry() -> anyhow::Result<Registry> {
    let mut registry = Registry::new();
    iterations::register(&mut registry)?;
    dispatch::register(&mut registry)?;
    filters::register(&mut registry)?;
    pipelines::register(&mut registry)?;
    Ok(registry)
}
