//! Runs the demo benchmarks through the forkbench CLI.

fn main() -> anyhow::Result<()> {
    forkbench::run(forkbench_demos::registry()?)
}
