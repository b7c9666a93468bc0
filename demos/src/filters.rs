//! One combined predicate against four chained filters
//!
//! Each call draws 1 000 fresh doubles in `[1, 4)` from the worker's own RNG
//! and counts those strictly between e and π, minus two excluded values.

use forkbench::{BenchmarkDescriptor, FixtureHandle, FixtureScope, Mode, Registry, TimeUnit};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::f64::consts::{E, PI};
use std::sync::atomic::{AtomicU64, Ordering};

/// Doubles drawn per invocation
pub const LEN: usize = 1_000;

const EXCLUDED_A: f64 = 3.100_409_700_533_777_7;
const EXCLUDED_B: f64 = 2.962_409_700_533_777_7;

/// Count with a single `filter`
pub fn single_filter(values: &[f64]) -> usize {
    values
        .iter()
        .filter(|&&d| d < PI && d > E && d != EXCLUDED_A && d != EXCLUDED_B)
        .count()
}

/// Count with one `filter` per condition
pub fn multiple_filters(values: &[f64]) -> usize {
    values
        .iter()
        .filter(|&&d| d > E)
        .filter(|&&d| d < PI)
        .filter(|&&d| d != EXCLUDED_A)
        .filter(|&&d| d != EXCLUDED_B)
        .count()
}

/// Register the `filters` group
pub fn register(registry: &mut Registry) -> anyhow::Result<()> {
    let variants: [(&str, fn(&[f64]) -> usize); 2] = [
        ("single_filter", single_filter),
        ("multiple_filters", multiple_filters),
    ];
    for (name, count) in variants {
        // Each worker thread gets its own stream: SEED, SEED + 1, ...
        let next_stream = AtomicU64::new(crate::SEED);
        registry.register_fn(
            BenchmarkDescriptor::new(name)
                .group("filters")
                .mode(Mode::All)
                .time_unit(TimeUnit::Microseconds)
                .scope(FixtureScope::PerThread)
                .warmup_iterations(500)
                .measurement_iterations(2_000),
            move || Ok(StdRng::seed_from_u64(next_stream.fetch_add(1, Ordering::Relaxed))),
            move |rng: &mut FixtureHandle<StdRng>| {
                let rng = rng
                    .get_mut()
                    .ok_or_else(|| anyhow::anyhow!("random stream must be per-thread"))?;
                let values = crate::random_doubles(rng, LEN, 1.0, 4.0);
                Ok(count(&values))
            },
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variants_agree() {
        let values = crate::seeded_doubles(crate::SEED, LEN, 1.0, 4.0);
        let n = single_filter(&values);
        assert_eq!(n, multiple_filters(&values));
        // (π - e) / 3 of the range, roughly 14%
        assert!(n > 50 && n < 250, "{n}");
    }

    #[test]
    fn test_excluded_values_not_counted() {
        let values = [EXCLUDED_A, EXCLUDED_B, 3.0, 1.5, 3.5];
        assert_eq!(single_filter(&values), 1);
        assert_eq!(multiple_filters(&values), 1);
    }
}
