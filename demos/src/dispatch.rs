//! Closures against trait objects
//!
//! Each call writes one line to [`std::io::sink`], so the side effect costs the
//! same in every variant and only the dispatch differs.

use forkbench::{BenchmarkDescriptor, Mode, Registry, TimeUnit};
use std::io::Write;

/// Something that prints a fixed message
pub trait Announce {
    /// Write the message
    fn announce(&self, out: &mut dyn Write) -> std::io::Result<()>;
}

/// Something that prints a number
pub trait Report {
    /// Write `n`
    fn report(&self, out: &mut dyn Write, n: i32) -> std::io::Result<()>;
}

struct Greeter;

impl Announce for Greeter {
    fn announce(&self, out: &mut dyn Write) -> std::io::Result<()> {
        writeln!(out, "ram")
    }
}

struct Offset {
    base: i32,
}

impl Report for Offset {
    fn report(&self, out: &mut dyn Write, n: i32) -> std::io::Result<()> {
        writeln!(out, "{}", self.base + n)
    }
}

fn closure() -> anyhow::Result<()> {
    let announce = |out: &mut dyn Write| writeln!(out, "ram");
    announce(&mut std::io::sink())?;
    Ok(())
}

fn trait_object() -> anyhow::Result<()> {
    let announce: Box<dyn Announce> = Box::new(Greeter);
    announce.announce(&mut std::io::sink())?;
    Ok(())
}

fn capturing_closure() -> anyhow::Result<()> {
    let base = std::hint::black_box(0);
    let report = move |out: &mut dyn Write, n: i32| writeln!(out, "{}", base + n);
    report(&mut std::io::sink(), 0)?;
    Ok(())
}

fn capturing_trait_object() -> anyhow::Result<()> {
    let base = std::hint::black_box(0);
    let report: Box<dyn Report> = Box::new(Offset { base });
    report.report(&mut std::io::sink(), 0)?;
    Ok(())
}

/// Register the `dispatch` group
pub fn register(registry: &mut Registry) -> anyhow::Result<()> {
    let describe = |name: &str| {
        BenchmarkDescriptor::new(name)
            .group("dispatch")
            .mode(Mode::AverageTime)
            .time_unit(TimeUnit::Microseconds)
            .ops_per_invocation(100)
    };
    registry
        .register_stateless(describe("closure"), closure)?
        .register_stateless(describe("trait_object"), trait_object)?
        .register_stateless(describe("capturing_closure"), capturing_closure)?
        .register_stateless(describe("capturing_trait_object"), capturing_trait_object)?;
    Ok(())
}
