//! Configuration loading from forkbench.toml
//!
//! Global run settings can live in a `forkbench.toml` file in the project root.
//! The file is discovered by walking up from the current directory. Values
//! here override descriptor settings; command line flags override both.

use forkbench_ipc::Limit;
use forkbench_report::OutputFormat;
use forkbench_stats::MergePolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Name of the configuration file
pub const CONFIG_FILE: &str = "forkbench.toml";

/// forkbench configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ForkbenchConfig {
    /// Runner configuration
    #[serde(default)]
    pub runner: RunnerConfig,
    /// Output configuration
    #[serde(default)]
    pub output: OutputConfig,
}

/// Order in which selected descriptors run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionOrder {
    /// The order the binary registered them in
    #[default]
    Registration,
    /// Sorted by `group/name`
    Alphabetical,
}

impl std::str::FromStr for ExecutionOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "registration" => Ok(ExecutionOrder::Registration),
            "alphabetical" | "alpha" => Ok(ExecutionOrder::Alphabetical),
            other => Err(format!("Unknown order: {}", other)),
        }
    }
}

/// Runner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Warm-up per worker: an invocation count ("5") or a duration ("500ms")
    #[serde(default)]
    pub warmup: Option<String>,
    /// Measurement per worker, same forms as `warmup`
    #[serde(default)]
    pub measurement: Option<String>,
    /// Forks per descriptor; 0 runs in-process
    #[serde(default)]
    pub forks: Option<u32>,
    /// Worker threads per fork
    #[serde(default)]
    pub threads: Option<u32>,
    /// Soft budget per fork (e.g., "10s")
    #[serde(default)]
    pub timeout: Option<String>,
    /// Hard limit per fork process before it is killed
    #[serde(default = "default_worker_timeout")]
    pub worker_timeout: String,
    /// Forks of one descriptor allowed to run at once
    #[serde(default)]
    pub jobs: Option<usize>,
    /// Execution order
    #[serde(default)]
    pub order: ExecutionOrder,
    /// Cross-fork merge policy
    #[serde(default)]
    pub merge: MergePolicy,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            warmup: None,
            measurement: None,
            forks: None,
            threads: None,
            timeout: None,
            worker_timeout: default_worker_timeout(),
            jobs: None,
            order: ExecutionOrder::default(),
            merge: MergePolicy::default(),
        }
    }
}

fn default_worker_timeout() -> String {
    "300s".to_string()
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OutputConfig {
    /// Default output format: "human", "json" or "csv"
    #[serde(default)]
    pub format: OutputFormat,
}

impl ForkbenchConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Try to discover and load configuration by walking up from current directory
    pub fn discover() -> Option<Self> {
        let mut dir = std::env::current_dir().ok()?;
        loop {
            let config_path = dir.join(CONFIG_FILE);
            if config_path.exists() {
                return match Self::load(&config_path) {
                    Ok(config) => Some(config),
                    Err(e) => {
                        warn!(path = %config_path.display(), error = %e, "ignoring unreadable config");
                        None
                    }
                };
            }
            if !dir.pop() {
                break;
            }
        }
        None
    }

    /// Write the commented default configuration into `dir`.
    ///
    /// An existing file is left alone unless `force` is set.
    pub fn write_default(dir: impl AsRef<Path>, force: bool) -> anyhow::Result<PathBuf> {
        let path = dir.as_ref().join(CONFIG_FILE);
        if path.exists() && !force {
            anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
        }
        std::fs::write(&path, Self::default_toml())?;
        Ok(path)
    }

    /// Generate a default configuration as TOML string
    pub fn default_toml() -> String {
        r#"# forkbench configuration

[runner]
# Warm-up per worker: invocation count ("1000") or duration ("2s")
# warmup = "1000"
# Measurement per worker
# measurement = "10000"
# Isolated forks per benchmark (0 = in-process debug mode)
# forks = 1
# Worker threads per fork
# threads = 1
# Soft budget per fork; partial samples are kept when it runs out
# timeout = "30s"
# Hard limit per fork process
worker_timeout = "300s"
# Forks of one benchmark run at once
# jobs = 1
# "registration" or "alphabetical"
order = "registration"
# "mean-of-means" or "pooled"
merge = "mean-of-means"

[output]
# human, json, csv
format = "human"
"#
        .to_string()
    }

    /// Parse duration string (e.g., "3s", "500ms", "2m") to nanoseconds
    pub fn parse_duration(s: &str) -> anyhow::Result<u64> {
        let s = s.trim();
        if s.is_empty() {
            return Err(anyhow::anyhow!("Empty duration string"));
        }

        let (num_part, unit_part) = s
            .char_indices()
            .find(|(_, c)| c.is_alphabetic() || *c == 'µ')
            .map(|(i, _)| s.split_at(i))
            .unwrap_or((s, "s"));

        let value: f64 = num_part
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid duration number: {}", num_part))?;
        if !value.is_finite() || value < 0.0 {
            return Err(anyhow::anyhow!("Invalid duration: {}", s));
        }

        let multiplier: u64 = match unit_part.to_lowercase().as_str() {
            "ns" => 1,
            "us" | "µs" => 1_000,
            "ms" => 1_000_000,
            "s" | "" => 1_000_000_000,
            "m" | "min" => 60_000_000_000,
            _ => return Err(anyhow::anyhow!("Unknown duration unit: {}", unit_part)),
        };

        Ok((value * multiplier as f64) as u64)
    }

    /// Parse a phase limit: a bare integer is an invocation count, anything
    /// else a duration
    pub fn parse_limit(s: &str) -> anyhow::Result<Limit> {
        let s = s.trim();
        if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
            return Ok(Limit::Iterations(s.parse()?));
        }
        Ok(Limit::Time {
            nanos: Self::parse_duration(s)?,
        })
    }
}
