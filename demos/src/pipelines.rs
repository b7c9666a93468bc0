//! Iterator pipelines against hand-written collection loops
//!
//! Every variant keeps values `v > 100` with `v % 2 == 0`, sorts them and
//! returns the first ten. On random doubles the even test rarely passes, so
//! the sort stays small and the filters dominate.

use forkbench::{BenchmarkDescriptor, FixtureHandle, FixtureScope, Mode, Registry, TimeUnit};
use rayon::prelude::*;
use std::cmp::Ordering;

/// Numbers per fixture
pub const LEN: usize = 10_000;

/// How many values each pipeline returns
pub const TAKE: usize = 10;

/// filter, filter, sort, take, collect
pub fn iterator_pipeline(values: &[f64]) -> Vec<f64> {
    let mut kept: Vec<f64> = values
        .iter()
        .copied()
        .filter(|&v| v > 100.0)
        .filter(|&v| v % 2.0 == 0.0)
        .collect();
    kept.sort_by(f64::total_cmp);
    kept.into_iter().take(TAKE).collect()
}

/// The same pipeline on the rayon pool
pub fn parallel_pipeline(values: &[f64]) -> Vec<f64> {
    let mut kept: Vec<f64> = values
        .par_iter()
        .copied()
        .filter(|&v| v > 100.0)
        .filter(|&v| v % 2.0 == 0.0)
        .collect();
    kept.par_sort_by(f64::total_cmp);
    kept.into_iter().take(TAKE).collect()
}

/// Explicit loops into intermediate vectors and a hand-written comparator
pub fn manual_loops(values: &[f64]) -> Vec<f64> {
    let mut above = Vec::new();
    for &v in values {
        if v > 100.0 {
            above.push(v);
        }
    }

    let mut even = Vec::new();
    for &v in &above {
        if v % 2.0 == 0.0 {
            even.push(v);
        }
    }

    even.sort_by(|a, b| {
        if a < b {
            Ordering::Less
        } else if a == b {
            Ordering::Equal
        } else {
            Ordering::Greater
        }
    });

    let mut result = Vec::with_capacity(TAKE);
    for v in even {
        result.push(v);
        if result.len() == TAKE {
            break;
        }
    }
    result
}

/// Register the `pipelines` group
pub fn register(registry: &mut Registry) -> anyhow::Result<()> {
    let variants: [(&str, fn(&[f64]) -> Vec<f64>); 3] = [
        ("iterator_pipeline", iterator_pipeline),
        ("parallel_pipeline", parallel_pipeline),
        ("manual_loops", manual_loops),
    ];
    for (name, pipeline) in variants {
        registry.register_fn(
            BenchmarkDescriptor::new(name)
                .group("pipelines")
                .mode(Mode::AverageTime)
                .time_unit(TimeUnit::Microseconds)
                .scope(FixtureScope::PerThread)
                .warmup_iterations(200)
                .measurement_iterations(1_000),
            || Ok(crate::seeded_doubles(crate::SEED, LEN, 90.0, 11_000.0)),
            move |values: &mut FixtureHandle<Vec<f64>>| Ok(pipeline(values.as_slice())),
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variants_agree_on_integral_values() {
        // Integral values make the even check meaningful
        let values: Vec<f64> = (0..500).rev().map(f64::from).collect();
        let expected: Vec<f64> = (0..TAKE).map(|i| 102.0 + 2.0 * i as f64).collect();

        assert_eq!(iterator_pipeline(&values), expected);
        assert_eq!(parallel_pipeline(&values), expected);
        assert_eq!(manual_loops(&values), expected);
    }

    #[test]
    fn test_variants_agree_on_seeded_fixture() {
        let values = crate::seeded_doubles(crate::SEED, LEN, 90.0, 11_000.0);
        let a = iterator_pipeline(&values);
        assert_eq!(a, parallel_pipeline(&values));
        assert_eq!(a, manual_loops(&values));
        assert!(a.len() <= TAKE);
    }
}
