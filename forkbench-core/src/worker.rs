//! Fork Process Entry Point
//!
//! The fork side of the supervisor/fork split. A fork runs one benchmark fork
//! per `Run` command and streams its samples back.
//!
//! On Unix, uses fd 3/4 for IPC (set via `FORKBENCH_IPC_FD`) and installs a
//! SIGTERM handler that ends the scheduler loops early. On non-Unix, falls
//! back to stdin/stdout and skips signal handling.

use crate::error::HarnessError;
use crate::registry::Registry;
use forkbench_ipc::{
    CommandReader, FailureKind, FrameError, IPC_FD_ENV, MessageWriter, RunConfig, SampleBatcher,
    SupervisorCommand, WorkerCapabilities, WorkerMessage,
};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

#[cfg(unix)]
use std::os::unix::io::FromRawFd;

/// Set by the SIGTERM handler; the scheduler polls it between invocations.
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Check if a graceful shutdown has been requested via SIGTERM.
pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::Relaxed)
}

/// Install a SIGTERM handler that sets the `SHUTDOWN_REQUESTED` flag.
/// The handler is async-signal-safe (only sets an atomic).
#[cfg(unix)]
fn install_sigterm_handler() {
    unsafe {
        let mut sa: libc::sigaction = std::mem::zeroed();
        sa.sa_sigaction = sigterm_handler as *const () as usize;
        sa.sa_flags = libc::SA_RESTART;
        libc::sigemptyset(&mut sa.sa_mask);
        libc::sigaction(libc::SIGTERM, &sa, std::ptr::null_mut());
    }
}

#[cfg(unix)]
extern "C" fn sigterm_handler(_sig: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::Relaxed);
}

#[cfg(not(unix))]
fn install_sigterm_handler() {}

enum IpcTransport {
    #[cfg(unix)]
    Fds { read_fd: i32, write_fd: i32 },
    Stdio,
}

fn detect_transport() -> IpcTransport {
    #[cfg(unix)]
    if let Ok(val) = std::env::var(IPC_FD_ENV) {
        if let Some((r, w)) = val.split_once(',') {
            if let (Ok(read_fd), Ok(write_fd)) = (r.parse::<i32>(), w.parse::<i32>()) {
                return IpcTransport::Fds { read_fd, write_fd };
            }
        }
        warn!("invalid {IPC_FD_ENV}={val:?} (expected <read_fd>,<write_fd>), falling back to stdio");
    }
    IpcTransport::Stdio
}

/// Fork process main loop
pub struct WorkerMain {
    reader: CommandReader<Box<dyn std::io::Read>>,
    writer: MessageWriter<Box<dyn std::io::Write>>,
}

impl WorkerMain {
    /// Connect to the supervisor through the inherited fds, or stdin/stdout
    pub fn new() -> Self {
        match detect_transport() {
            #[cfg(unix)]
            IpcTransport::Fds { read_fd, write_fd } => {
                // SAFETY: the supervisor dup2'd both pipe ends onto these fds
                // before exec and nothing else in this process owns them.
                let read_file = unsafe { std::fs::File::from_raw_fd(read_fd) };
                let write_file = unsafe { std::fs::File::from_raw_fd(write_fd) };
                Self {
                    reader: CommandReader::new(Box::new(read_file) as Box<dyn std::io::Read>),
                    writer: MessageWriter::new(Box::new(write_file) as Box<dyn std::io::Write>),
                }
            }
            IpcTransport::Stdio => Self {
                reader: CommandReader::new(Box::new(std::io::stdin()) as Box<dyn std::io::Read>),
                writer: MessageWriter::new(Box::new(std::io::stdout()) as Box<dyn std::io::Write>),
            },
        }
    }

    /// Serve commands until shutdown or until the supervisor hangs up
    pub fn run(&mut self, registry: &Registry) -> Result<(), FrameError> {
        install_sigterm_handler();

        self.writer
            .write(&WorkerMessage::Hello(WorkerCapabilities::default()))?;

        loop {
            if shutdown_requested() {
                break;
            }

            let command = match self.reader.read() {
                Ok(command) => command,
                Err(FrameError::EndOfStream) => break,
                Err(e) => return Err(e),
            };

            match command {
                SupervisorCommand::Run {
                    bench_name,
                    fork,
                    config,
                } => {
                    self.run_benchmark(registry, &bench_name, fork, &config)?;
                }
                SupervisorCommand::Shutdown => break,
            }
        }

        Ok(())
    }

    fn run_benchmark(
        &mut self,
        registry: &Registry,
        bench_name: &str,
        fork: u32,
        config: &RunConfig,
    ) -> Result<(), FrameError> {
        let Some(benchmark) = registry.get(bench_name) else {
            return self.writer.write(&WorkerMessage::Failure {
                kind: FailureKind::UnknownBenchmark,
                message: format!("Benchmark not found: {bench_name}"),
            });
        };
        if let Err(message) = config.validate() {
            return self.writer.write(&WorkerMessage::Failure {
                kind: FailureKind::InvalidConfig,
                message,
            });
        }

        debug!(benchmark = bench_name, fork, "fork starting");
        match benchmark.run_fork(fork, config, &SHUTDOWN_REQUESTED) {
            Ok(run) => {
                let mut batcher = SampleBatcher::new(bench_name);
                for sample in run.samples {
                    if let Some(batch) = batcher.push(sample) {
                        self.writer.write(&WorkerMessage::SampleBatch(batch))?;
                    }
                }
                if let Some(batch) = batcher.finish() {
                    self.writer.write(&WorkerMessage::SampleBatch(batch))?;
                }
                self.writer.write(&WorkerMessage::Complete(run.summary))
            }
            Err(err) => self.report_failure(&err),
        }
    }

    fn report_failure(&mut self, err: &HarnessError) -> Result<(), FrameError> {
        self.writer.write(&WorkerMessage::Failure {
            kind: err.failure_kind(),
            message: err.message().to_string(),
        })
    }
}

impl Default for WorkerMain {
    fn default() -> Self {
        Self::new()
    }
}
