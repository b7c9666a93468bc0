#![warn(missing_docs)]
//! Forkbench CLI Library
//!
//! Command line driver for benchmark binaries. A binary builds a
//! [`Registry`], then hands it to [`run`]; the same executable doubles as the
//! fork process when started with the hidden worker flag.
//!
//! # Example
//!
//! ```ignore
//! use forkbench::{BenchmarkDescriptor, Registry};
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut registry = Registry::new();
//!     registry.register_stateless(BenchmarkDescriptor::new("sum"), || {
//!         Ok((0..1000u64).sum::<u64>())
//!     })?;
//!     forkbench_cli::run(registry)
//! }
//! ```

mod config;
mod formatting;
mod planner;
mod supervisor;

pub use config::*;
pub use formatting::{format_human_output, format_list};
pub use planner::{ExecutionPlan, build_plan};
pub use supervisor::*;

use clap::{Args, Parser, Subcommand};
use forkbench_core::{
    BenchmarkOutcome, Overrides, Registry, RunOptions, WorkerMain, limit_label, run_benchmark,
};
use forkbench_ipc::Limit;
use forkbench_report::{
    OutputFormat, Report, ReportConfig, generate_csv_report, generate_json_report,
};
use forkbench_stats::MergePolicy;
use indicatif::{ProgressBar, ProgressStyle};
use regex::Regex;
use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// Forkbench CLI arguments
#[derive(Parser, Debug)]
#[command(name = "forkbench")]
#[command(author, version, about = "Forkbench - forked micro-benchmark harness")]
pub struct Cli {
    /// Optional subcommand (run, list, init); defaults to run
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Internal: Run as fork process (used by the supervisor)
    #[arg(long = "forkbench-worker", hide = true)]
    pub forkbench_worker: bool,

    /// Internal: Absorb cargo bench's --bench flag
    #[arg(long, hide = true)]
    pub bench: bool,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run benchmarks (default)
    Run(RunArgs),
    /// List registered benchmarks
    List {
        /// Only list benchmarks whose name matches this regex
        #[arg(long)]
        include: Option<String>,
    },
    /// Write a commented forkbench.toml into the current directory
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Arguments of `run`. Unset values fall back to `forkbench.toml`, then to
/// each descriptor's own settings.
#[derive(Args, Debug, Default, Clone)]
pub struct RunArgs {
    /// Only run benchmarks whose `group/name` or name matches this regex
    #[arg(long)]
    pub include: Option<String>,

    /// Warm-up per worker: invocation count ("1000") or duration ("2s")
    #[arg(long)]
    pub warmup: Option<String>,

    /// Measurement per worker: invocation count ("10000") or duration ("5s")
    #[arg(long = "measure")]
    pub measure: Option<String>,

    /// Forks per benchmark; 0 runs in-process
    #[arg(long)]
    pub forks: Option<u32>,

    /// Worker threads per fork
    #[arg(long)]
    pub threads: Option<u32>,

    /// Soft time budget per fork (e.g., "30s")
    #[arg(long)]
    pub timeout: Option<String>,

    /// Hard limit per fork process before it is killed (e.g., "300s")
    #[arg(long)]
    pub worker_timeout: Option<String>,

    /// Forks of one benchmark allowed to run concurrently
    #[arg(long, short = 'j')]
    pub jobs: Option<usize>,

    /// Execution order: registration, alphabetical
    #[arg(long)]
    pub order: Option<ExecutionOrder>,

    /// Cross-fork merge: mean-of-means, pooled
    #[arg(long)]
    pub merge: Option<MergePolicy>,

    /// Output format: human, json, csv
    #[arg(long)]
    pub format: Option<OutputFormat>,

    /// Output file (stdout if not specified)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Settings for one run after layering config file and command line
#[derive(Debug, Clone)]
struct Resolved {
    options: RunOptions,
    worker_timeout: Duration,
    jobs: usize,
    order: ExecutionOrder,
    format: OutputFormat,
    report_config: ReportConfig,
}

/// Run the forkbench CLI over `registry`.
/// This is the main entry point for benchmark binaries.
///
/// Exits the process with status 1 when any selected benchmark is
/// unmeasurable.
pub fn run(registry: Registry) -> anyhow::Result<()> {
    let cli = Cli::parse();
    run_with_cli(cli, registry)
}

/// Run the forkbench CLI with pre-parsed arguments.
pub fn run_with_cli(cli: Cli, registry: Registry) -> anyhow::Result<()> {
    // Worker mode comes first: stdout is not ours to write to
    if cli.forkbench_worker {
        return run_worker_mode(&registry);
    }

    init_tracing(if cli.verbose {
        "forkbench=debug"
    } else {
        "forkbench=info"
    });

    let config = ForkbenchConfig::discover().unwrap_or_default();

    match cli.command {
        Some(Commands::List { include }) => list_benchmarks(&registry, include.as_deref(), &config),
        Some(Commands::Run(args)) => run_benchmarks(&registry, &args, &config),
        Some(Commands::Init { force }) => {
            let path = ForkbenchConfig::write_default(std::env::current_dir()?, force)?;
            println!("Wrote {}", path.display());
            Ok(())
        }
        None => run_benchmarks(&registry, &RunArgs::default(), &config),
    }
}

fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    // A second init (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Run as a fork process (IPC mode)
fn run_worker_mode(registry: &Registry) -> anyhow::Result<()> {
    init_tracing("warn");
    let mut worker = WorkerMain::new();
    worker
        .run(registry)
        .map_err(|e| anyhow::anyhow!("Worker error: {}", e))
}

fn compile_include(pattern: Option<&str>) -> anyhow::Result<Option<Regex>> {
    pattern
        .map(|p| Regex::new(p).map_err(|e| anyhow::anyhow!("invalid --include pattern '{}': {}", p, e)))
        .transpose()
}

fn list_benchmarks(
    registry: &Registry,
    include: Option<&str>,
    config: &ForkbenchConfig,
) -> anyhow::Result<()> {
    let include = compile_include(include)?;
    let plan = build_plan(registry.iter(), include.as_ref(), config.runner.order);
    print!("{}", format_list(plan.benchmarks.iter().copied()));
    Ok(())
}

/// Layer `forkbench.toml` and command line arguments: CLI wins, then config.
fn resolve(args: &RunArgs, config: &ForkbenchConfig) -> anyhow::Result<Resolved> {
    let runner = &config.runner;

    let warmup = parse_limit_opt(args.warmup.as_deref().or(runner.warmup.as_deref()))?;
    let measurement = parse_limit_opt(args.measure.as_deref().or(runner.measurement.as_deref()))?;

    let timeout = args
        .timeout
        .as_deref()
        .or(runner.timeout.as_deref())
        .map(ForkbenchConfig::parse_duration)
        .transpose()?
        .map(Duration::from_nanos);

    let worker_timeout = ForkbenchConfig::parse_duration(
        args.worker_timeout.as_deref().unwrap_or(&runner.worker_timeout),
    )?;

    let forks = args.forks.or(runner.forks);
    let threads = args.threads.or(runner.threads);
    let jobs = args.jobs.or(runner.jobs).unwrap_or(1).max(1);
    let merge = args.merge.unwrap_or(runner.merge);

    Ok(Resolved {
        options: RunOptions {
            overrides: Overrides {
                warmup,
                measurement,
                forks,
                threads,
                timeout,
            },
            merge,
        },
        worker_timeout: Duration::from_nanos(worker_timeout),
        jobs,
        order: args.order.unwrap_or(runner.order),
        format: args.format.unwrap_or(config.output.format),
        report_config: ReportConfig {
            warmup: warmup.as_ref().map(limit_label),
            measurement: measurement.as_ref().map(limit_label),
            forks,
            threads,
            jobs,
            merge,
        },
    })
}

fn parse_limit_opt(spec: Option<&str>) -> anyhow::Result<Option<Limit>> {
    spec.map(ForkbenchConfig::parse_limit).transpose()
}

fn run_benchmarks(registry: &Registry, args: &RunArgs, config: &ForkbenchConfig) -> anyhow::Result<()> {
    let resolved = resolve(args, config)?;
    let include = compile_include(args.include.as_deref())?;
    let plan = build_plan(registry.iter(), include.as_ref(), resolved.order);

    if plan.benchmarks.is_empty() {
        eprintln!("No benchmarks matched.");
        return Ok(());
    }

    eprintln!(
        "Running {} benchmarks, {} fork job(s)...\n",
        plan.benchmarks.len(),
        resolved.jobs
    );

    let controller = ProcessForkController::new(resolved.worker_timeout, resolved.jobs);
    let start_time = Instant::now();

    let pb = ProgressBar::new(plan.benchmarks.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    let mut outcomes: Vec<BenchmarkOutcome> = Vec::with_capacity(plan.benchmarks.len());
    for benchmark in &plan.benchmarks {
        pb.set_message(benchmark.descriptor().full_name());
        outcomes.push(run_benchmark(*benchmark, &controller, &resolved.options));
        pb.inc(1);
    }
    pb.finish_and_clear();

    let total_duration_ms = start_time.elapsed().as_secs_f64() * 1000.0;
    let report = Report::new(outcomes, resolved.report_config, total_duration_ms);

    let output = match resolved.format {
        OutputFormat::Json => generate_json_report(&report)?,
        OutputFormat::Csv => generate_csv_report(&report),
        OutputFormat::Human => format_human_output(&report),
    };

    if let Some(ref path) = args.output {
        let mut file = std::fs::File::create(path)?;
        file.write_all(output.as_bytes())?;
        eprintln!("Report written to: {}", path.display());
    } else {
        print!("{}", output);
    }

    if report.has_unmeasurable() {
        eprintln!(
            "\n{} benchmark(s) could not be measured",
            report.summary.unmeasurable
        );
        std::process::exit(1);
    }

    Ok(())
}
