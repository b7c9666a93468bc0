//! Benchmark Planner
//!
//! Selects registered benchmarks with an include regex (matched against
//! `group/name` and the bare name) and puts them in execution order.

use crate::config::ExecutionOrder;
use forkbench_core::Benchmark;

/// Execution plan for benchmarks
pub struct ExecutionPlan<'r> {
    /// Ordered list of benchmarks to run
    pub benchmarks: Vec<&'r dyn Benchmark>,
}

/// Build execution plan from registered benchmarks
pub fn build_plan<'r>(
    benchmarks: impl IntoIterator<Item = &'r dyn Benchmark>,
    include: Option<&regex::Regex>,
    order: ExecutionOrder,
) -> ExecutionPlan<'r> {
    let mut selected: Vec<&'r dyn Benchmark> = benchmarks
        .into_iter()
        .filter(|b| match include {
            Some(re) => {
                let d = b.descriptor();
                re.is_match(&d.full_name()) || re.is_match(d.name())
            }
            None => true,
        })
        .collect();

    if order == ExecutionOrder::Alphabetical {
        // Stable, so equal names keep registration order
        selected.sort_by_cached_key(|b| b.descriptor().full_name());
    }

    ExecutionPlan {
        benchmarks: selected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forkbench_core::{BenchmarkDescriptor, Registry};
    use regex::Regex;

    fn registry() -> Registry {
        let mut registry = Registry::new();
        for (group, name) in [
            ("loops", "for_each"),
            ("filters", "chained"),
            ("loops", "indexed"),
            ("", "baseline"),
        ] {
            registry
                .register_stateless(BenchmarkDescriptor::new(name).group(group), || Ok(()))
                .unwrap();
        }
        registry
    }

    fn names(plan: &ExecutionPlan<'_>) -> Vec<String> {
        plan.benchmarks
            .iter()
            .map(|b| b.descriptor().full_name())
            .collect()
    }

    #[test]
    fn test_registration_order_by_default() {
        let registry = registry();
        let plan = build_plan(registry.iter(), None, ExecutionOrder::Registration);
        assert_eq!(
            names(&plan),
            ["loops/for_each", "filters/chained", "loops/indexed", "baseline"]
        );
    }

    #[test]
    fn test_alphabetical_order() {
        let registry = registry();
        let plan = build_plan(registry.iter(), None, ExecutionOrder::Alphabetical);
        assert_eq!(
            names(&plan),
            ["baseline", "filters/chained", "loops/for_each", "loops/indexed"]
        );
    }

    #[test]
    fn test_include_regex() {
        let registry = registry();
        let re = Regex::new("^loops/").unwrap();
        let plan = build_plan(registry.iter(), Some(&re), ExecutionOrder::Registration);
        assert_eq!(names(&plan), ["loops/for_each", "loops/indexed"]);

        let re = Regex::new("^chained$").unwrap();
        let plan = build_plan(registry.iter(), Some(&re), ExecutionOrder::Registration);
        assert_eq!(names(&plan), ["filters/chained"]);
    }
}
