//! IPC Message Types
//!
//! All messages are serialized with rkyv and validated on read.

use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};

/// Iteration phase a sample was recorded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
#[repr(u8)]
pub enum Phase {
    /// Discarded warm-up invocation, kept only for diagnostics
    Warmup,
    /// Statistics-bearing invocation
    Measurement,
}

/// One timed invocation (32 bytes).
///
/// A sample belongs to exactly one fork, one worker thread of that fork and one
/// phase. `iteration` is the per-worker sequence number across both phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
#[repr(C)]
pub struct Sample {
    /// Wall-clock time of the timed window in nanoseconds
    pub duration_nanos: u64,
    /// Workload calls made inside the timed window
    pub ops: u64,
    /// Per-worker sequence number
    pub iteration: u64,
    /// Fork index
    pub fork: u32,
    /// Worker thread index within the fork
    pub worker: u16,
    /// Phase the sample was taken in
    pub phase: Phase,
}

impl Sample {
    /// Create a sample for a single-op invocation
    #[inline]
    pub fn new(duration_nanos: u64, phase: Phase) -> Self {
        Self {
            duration_nanos,
            ops: 1,
            iteration: 0,
            fork: 0,
            worker: 0,
            phase,
        }
    }

    /// Set the operation count
    #[inline]
    pub fn with_ops(mut self, ops: u64) -> Self {
        self.ops = ops.max(1);
        self
    }

    /// Tag the sample with its origin
    #[inline]
    pub fn tagged(mut self, fork: u32, worker: u16, iteration: u64) -> Self {
        self.fork = fork;
        self.worker = worker;
        self.iteration = iteration;
        self
    }

    /// Whether this sample counts towards the final statistics
    #[inline]
    pub fn is_measurement(&self) -> bool {
        self.phase == Phase::Measurement
    }

    /// Time per operation in nanoseconds
    #[inline]
    pub fn nanos_per_op(&self) -> f64 {
        self.duration_nanos as f64 / self.ops.max(1) as f64
    }
}

/// A batch of samples sent from a fork to the supervisor
#[derive(Debug, Clone, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub struct SampleBatch {
    /// Hash of the benchmark name, to catch batches addressed to the wrong run
    pub bench_id_hash: u64,
    /// Sequence number for detecting dropped batches
    pub batch_sequence: u32,
    /// The samples, in recording order per worker
    pub samples: Vec<Sample>,
}

/// How long a phase lasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum Limit {
    /// A fixed number of invocations per worker
    Iterations(u64),
    /// Invoke until this much wall-clock time has elapsed
    Time {
        /// Phase length in nanoseconds
        nanos: u64,
    },
}

impl Limit {
    /// Time-based limit from a `Duration`
    pub fn time(duration: std::time::Duration) -> Self {
        Limit::Time {
            nanos: duration.as_nanos().min(u64::MAX as u128) as u64,
        }
    }

    /// Phase length if the limit is time-based
    pub fn as_time_nanos(&self) -> Option<u64> {
        match self {
            Limit::Time { nanos } => Some(*nanos),
            Limit::Iterations(_) => None,
        }
    }
}

/// What a failing invocation does to the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum ErrorPolicy {
    /// Terminate the descriptor's run
    #[default]
    Abort,
    /// Drop the failed invocation and continue
    SkipSample,
}

/// Resolved run settings for one fork.
#[derive(Debug, Clone, PartialEq, Eq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub struct RunConfig {
    /// Warm-up phase length
    pub warmup: Limit,
    /// Measurement phase length
    pub measurement: Limit,
    /// Worker threads per fork
    pub threads: u32,
    /// Workload calls per timed window
    pub ops_per_invocation: u64,
    /// Soft wall-clock budget for the whole fork in nanoseconds
    pub budget_ns: Option<u64>,
    /// Handling of failed invocations
    pub error_policy: ErrorPolicy,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            warmup: Limit::Iterations(1_000),
            measurement: Limit::Iterations(10_000),
            threads: 1,
            ops_per_invocation: 1,
            budget_ns: None,
            error_policy: ErrorPolicy::Abort,
        }
    }
}

impl RunConfig {
    /// Validate configuration values, returning a description of the first error found.
    pub fn validate(&self) -> Result<(), String> {
        if self.threads == 0 {
            return Err("threads must be > 0".to_string());
        }
        if self.threads > u16::MAX as u32 {
            return Err(format!("threads must be <= {}", u16::MAX));
        }
        if self.ops_per_invocation == 0 {
            return Err("ops_per_invocation must be > 0".to_string());
        }
        if self.budget_ns == Some(0) {
            return Err("budget_ns must be > 0 when set".to_string());
        }
        Ok(())
    }

    /// Effective soft budget: the explicit one, else the sum of both phase
    /// lengths when both phases are time-based.
    pub fn effective_budget_ns(&self) -> Option<u64> {
        self.budget_ns.or_else(|| {
            let warmup = self.warmup.as_time_nanos()?;
            let measurement = self.measurement.as_time_nanos()?;
            Some(warmup.saturating_add(measurement))
        })
    }
}

/// Fork capabilities advertised during handshake
#[derive(Debug, Clone, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub struct WorkerCapabilities {
    /// Protocol version for compatibility
    pub protocol_version: u32,
    /// Fork process id
    pub pid: u32,
    /// Number of logical CPUs available
    pub cpu_count: u32,
    /// CPU model string (for reports)
    pub cpu_model: String,
}

impl Default for WorkerCapabilities {
    fn default() -> Self {
        Self {
            protocol_version: crate::PROTOCOL_VERSION,
            pid: std::process::id(),
            cpu_count: num_cpus(),
            cpu_model: cpu_model_string(),
        }
    }
}

/// Completion record of a fork that ran its scheduler to the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub struct ForkSummary {
    /// Samples sent, both phases
    pub samples: u64,
    /// Invocations dropped under `ErrorPolicy::SkipSample`
    pub skipped: u64,
    /// Whether the soft budget cut the run short
    pub timed_out: bool,
    /// Fixture instances constructed during the fork
    pub fixtures_constructed: u64,
}

/// Messages sent from a fork to the supervisor
#[derive(Debug, Clone, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum WorkerMessage {
    /// Initial handshake
    Hello(WorkerCapabilities),

    /// A batch of samples
    SampleBatch(SampleBatch),

    /// The fork finished; every sample batch precedes this message
    Complete(ForkSummary),

    /// The run was terminated by the harness error taxonomy
    Failure {
        /// Error category
        kind: FailureKind,
        /// Human-readable error message
        message: String,
    },
}

/// Categories of fork-reported failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum FailureKind {
    /// Fixture construction failed
    FixtureInit,
    /// The workload returned an error or panicked
    Workload,
    /// No benchmark with the requested name is registered
    UnknownBenchmark,
    /// The run configuration was rejected
    InvalidConfig,
}

/// Commands sent from the supervisor to a fork
#[derive(Debug, Clone, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum SupervisorCommand {
    /// Run one fork of a benchmark
    Run {
        /// Registered benchmark name
        bench_name: String,
        /// Fork index
        fork: u32,
        /// Resolved settings
        config: RunConfig,
    },

    /// Request graceful shutdown
    Shutdown,
}

fn num_cpus() -> u32 {
    std::thread::available_parallelism()
        .map(|p| p.get() as u32)
        .unwrap_or(1)
}

fn cpu_model_string() -> String {
    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/proc/cpuinfo")
            .ok()
            .and_then(|content| {
                content
                    .lines()
                    .find(|line| line.starts_with("model name"))
                    .and_then(|line| line.split(':').nth(1))
                    .map(|s| s.trim().to_string())
            })
            .unwrap_or_else(|| "Unknown CPU".to_string())
    }

    #[cfg(not(target_os = "linux"))]
    {
        "Unknown CPU".to_string()
    }
}
