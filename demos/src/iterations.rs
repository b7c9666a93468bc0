//! Six ways to walk a vector
//!
//! All workers of a fork share one list of 10 000 doubles in `[90, 11000)` and
//! a "last seen" cell that every iteration style overwrites.

use forkbench::{
    BenchmarkDescriptor, FixtureHandle, FixtureScope, Mode, Registry, TimeUnit, Workload,
};
use rayon::prelude::*;
use std::sync::atomic::{AtomicU64, Ordering};

/// Numbers per fixture
pub const LEN: usize = 10_000;

/// Per-run fixture shared by every worker thread
pub struct Numbers {
    /// Values to walk
    pub values: Vec<f64>,
    last: AtomicU64,
}

impl Numbers {
    /// Seeded fixture
    pub fn generate() -> Self {
        Self {
            values: crate::seeded_doubles(crate::SEED, LEN, 90.0, 11_000.0),
            last: AtomicU64::new(0),
        }
    }

    fn set(&self, value: f64) {
        self.last.store(value.to_bits(), Ordering::Relaxed);
    }

    /// Last value written by any walk
    pub fn last(&self) -> f64 {
        f64::from_bits(self.last.load(Ordering::Relaxed))
    }
}

/// Iteration style under test
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    /// `for i in 0..len { v[i] }`
    Indexed,
    /// `for x in &v`
    ForLoop,
    /// explicit `Iterator::next` loop
    Iterator,
    /// `v.iter().for_each(..)`
    ForEach,
    /// `v.iter().copied().map(..).for_each(..)`
    AdapterForEach,
    /// `v.par_iter().for_each(..)`
    RayonForEach,
}

impl Style {
    /// Every style, in registration order
    pub const ALL: [Style; 6] = [
        Style::Indexed,
        Style::ForLoop,
        Style::Iterator,
        Style::ForEach,
        Style::AdapterForEach,
        Style::RayonForEach,
    ];

    /// Benchmark name
    pub fn name(self) -> &'static str {
        match self {
            Style::Indexed => "indexed",
            Style::ForLoop => "for_loop",
            Style::Iterator => "iterator",
            Style::ForEach => "for_each",
            Style::AdapterForEach => "adapter_for_each",
            Style::RayonForEach => "rayon_for_each",
        }
    }
}

/// Walk the shared numbers in one style, returning the last value seen
pub struct Walk(pub Style);

impl Workload<Numbers> for Walk {
    type Output = f64;

    #[allow(clippy::needless_range_loop)]
    fn invoke(&self, fixture: &mut FixtureHandle<Numbers>) -> anyhow::Result<f64> {
        let numbers: &Numbers = fixture;
        let values = &numbers.values;
        match self.0 {
            Style::Indexed => {
                for i in 0..values.len() {
                    numbers.set(values[i]);
                }
            }
            Style::ForLoop => {
                for &x in values {
                    numbers.set(x);
                }
            }
            Style::Iterator => {
                let mut it = values.iter();
                while let Some(&x) = it.next() {
                    numbers.set(x);
                }
            }
            Style::ForEach => values.iter().for_each(|&x| numbers.set(x)),
            Style::AdapterForEach => values
                .iter()
                .copied()
                .map(std::hint::black_box)
                .for_each(|x| numbers.set(x)),
            Style::RayonForEach => values.par_iter().for_each(|&x| numbers.set(x)),
        }
        Ok(numbers.last())
    }
}

/// Register the `iterations` group
pub fn register(registry: &mut Registry) -> anyhow::Result<()> {
    for style in Style::ALL {
        registry.register(
            BenchmarkDescriptor::new(style.name())
                .group("iterations")
                .mode(Mode::AverageTime)
                .time_unit(TimeUnit::Microseconds)
                .scope(FixtureScope::PerRun)
                .warmup_iterations(200)
                .measurement_iterations(1_000),
            || Ok(Numbers::generate()),
            Walk(style),
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_sequential_styles_end_on_last_value() {
        let expected = *Numbers::generate().values.last().unwrap();
        for style in Style::ALL.into_iter().filter(|s| *s != Style::RayonForEach) {
            let mut handle = FixtureHandle::Owned(Numbers::generate());
            let last = Walk(style).invoke(&mut handle).unwrap();
            assert_eq!(last, expected, "{style:?}");
        }
    }

    #[test]
    fn test_rayon_walk_sees_some_value() {
        let numbers = Arc::new(Numbers::generate());
        let mut handle = FixtureHandle::Shared(Arc::clone(&numbers));
        let last = Walk(Style::RayonForEach).invoke(&mut handle).unwrap();
        assert!(numbers.values.contains(&last));
    }
}
