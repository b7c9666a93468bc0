//! Supervisor Process
//!
//! The process Fork Controller: every fork of a descriptor runs in a fresh
//! child process (the current executable re-run with the worker flag), and
//! its samples come back over a pipe pair on fds 3/4.

use forkbench_core::{Benchmark, ForkController, ForkReport, ForkRun, HarnessError};
use forkbench_ipc::{
    CommandWriter, ForkSummary, FrameError, IPC_FD_ENV, MessageReader, PROTOCOL_VERSION, RunConfig,
    Sample, SampleBatcher, SupervisorCommand, WORKER_FLAG, WorkerMessage,
};
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use std::env;
use std::fs::File;
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Grace period between SIGTERM and SIGKILL
const TERM_GRACE: Duration = Duration::from_millis(500);

/// Fork side command pipe
const CMD_FD: RawFd = 3;
/// Fork side message pipe
const MSG_FD: RawFd = 4;

/// Failures of a single fork process, as seen by the supervisor
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The fork executable could not be started
    #[error("Failed to spawn fork: {0}")]
    SpawnFailed(#[from] std::io::Error),

    /// A frame could not be read or written
    #[error("IPC error: {0}")]
    IpcError(String),

    /// The fork exited or hung up before finishing
    #[error("Fork crashed: {0}")]
    WorkerCrashed(String),

    /// The fork was killed after going silent for the whole timeout
    #[error("Fork exceeded the hard timeout of {0:?}")]
    Timeout(Duration),

    /// The fork sent a message that does not fit the conversation
    #[error("Fork protocol error: expected {expected}, got {got}")]
    ProtocolError {
        /// What the supervisor was waiting for
        expected: String,
        /// What arrived instead
        got: String,
    },

    /// The fork ran and reported a harness error of its own
    #[error("{0}")]
    Reported(HarnessError),
}

impl From<FrameError> for SupervisorError {
    fn from(e: FrameError) -> Self {
        SupervisorError::IpcError(e.to_string())
    }
}

impl From<SupervisorError> for HarnessError {
    fn from(e: SupervisorError) -> Self {
        match e {
            SupervisorError::Reported(err) => err,
            other => HarnessError::ForkFailure(other.to_string()),
        }
    }
}

/// Result of polling for data
#[derive(Debug)]
enum PollResult {
    DataAvailable,
    Timeout,
    PipeClosed,
    Error(std::io::Error),
}

/// Wait for data to be available on a file descriptor with timeout
fn wait_for_data(fd: i32, timeout_ms: i32) -> PollResult {
    let mut pollfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };

    let result = unsafe { libc::poll(&mut pollfd, 1, timeout_ms) };

    if result < 0 {
        PollResult::Error(std::io::Error::last_os_error())
    } else if result == 0 {
        PollResult::Timeout
    } else if pollfd.revents & libc::POLLIN != 0 {
        // Even a closing pipe may still hold a final frame
        PollResult::DataAvailable
    } else if pollfd.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
        PollResult::PipeClosed
    } else {
        PollResult::Timeout
    }
}

/// Create a close-on-exec pipe pair, returning (read_fd, write_fd).
fn create_pipe() -> Result<(RawFd, RawFd), std::io::Error> {
    let mut fds = [0 as RawFd; 2];
    let ret = unsafe { libc::pipe(fds.as_mut_ptr()) };
    if ret != 0 {
        return Err(std::io::Error::last_os_error());
    }
    for &fd in &fds {
        unsafe {
            let flags = libc::fcntl(fd, libc::F_GETFD);
            libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC);
        }
    }
    Ok((fds[0], fds[1]))
}

/// Copy `fd` above both fork fds when it sits on one of them.
/// The copy is close-on-exec. Runs between fork and exec, so it only
/// makes async-signal-safe calls.
fn off_fork_fds(fd: RawFd) -> std::io::Result<RawFd> {
    if fd != CMD_FD && fd != MSG_FD {
        return Ok(fd);
    }
    let moved = unsafe { libc::fcntl(fd, libc::F_DUPFD_CLOEXEC, MSG_FD + 1) };
    if moved < 0 {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(moved)
    }
}

fn close_fd(fd: RawFd) {
    unsafe {
        libc::close(fd);
    }
}

/// Send SIGTERM to a process. Returns `Err` if the signal could not be delivered.
fn send_sigterm(pid: u32) -> Result<(), std::io::Error> {
    let ret = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if ret == -1 {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(())
    }
}

fn describe_status(status: ExitStatus) -> String {
    match (status.code(), status.signal()) {
        (Some(code), _) => format!("exit status {code}"),
        (None, Some(signal)) => format!("killed by signal {signal}"),
        _ => "unknown exit status".to_string(),
    }
}

/// One fork process
pub struct WorkerHandle {
    child: Child,
    reader: MessageReader<File>,
    writer: CommandWriter<File>,
    timeout: Duration,
}

impl WorkerHandle {
    /// Spawn `binary` as a fork process using fd 3/4 for IPC.
    ///
    /// Waits at most `timeout` for the fork's handshake.
    pub fn spawn(binary: &Path, timeout: Duration) -> Result<Self, SupervisorError> {
        // cmd_pipe: supervisor writes commands, fork reads fd 3
        let (cmd_read, cmd_write) = create_pipe()?;
        // msg_pipe: fork writes messages to fd 4, supervisor reads
        let (msg_read, msg_write) = match create_pipe() {
            Ok(fds) => fds,
            Err(e) => {
                close_fd(cmd_read);
                close_fd(cmd_write);
                return Err(SupervisorError::SpawnFailed(e));
            }
        };

        let mut command = Command::new(binary);
        command
            .arg(WORKER_FLAG)
            .env(IPC_FD_ENV, format!("{CMD_FD},{MSG_FD}"))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit());

        // In the child: get both sources off 3/4 first so neither dup2
        // overwrites the other's source. All four pipe fds are close-on-exec;
        // dup2 clears the flag on 3 and 4 only.
        unsafe {
            command.pre_exec(move || {
                let cmd_src = off_fork_fds(cmd_read)?;
                let msg_src = off_fork_fds(msg_write)?;
                if libc::dup2(cmd_src, CMD_FD) < 0 || libc::dup2(msg_src, MSG_FD) < 0 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let child = match command.spawn() {
            Ok(c) => c,
            Err(e) => {
                close_fd(cmd_read);
                close_fd(cmd_write);
                close_fd(msg_read);
                close_fd(msg_write);
                return Err(SupervisorError::SpawnFailed(e));
            }
        };

        close_fd(cmd_read);
        close_fd(msg_write);

        // SAFETY: both fds come from create_pipe above and nothing else owns them
        let writer_file = unsafe { File::from_raw_fd(cmd_write) };
        let reader_file = unsafe { File::from_raw_fd(msg_read) };

        let mut handle = Self {
            child,
            reader: MessageReader::new(reader_file),
            writer: CommandWriter::new(writer_file),
            timeout,
        };

        handle.wait_for_hello()?;
        Ok(handle)
    }

    fn wait_for_hello(&mut self) -> Result<(), SupervisorError> {
        let deadline = Instant::now() + self.timeout;
        match self.next_message(deadline, "before handshake")? {
            WorkerMessage::Hello(caps) => {
                if caps.protocol_version != PROTOCOL_VERSION {
                    return Err(SupervisorError::ProtocolError {
                        expected: format!("protocol version {}", PROTOCOL_VERSION),
                        got: format!("protocol version {}", caps.protocol_version),
                    });
                }
                debug!(
                    pid = caps.pid,
                    cpus = caps.cpu_count,
                    cpu = %caps.cpu_model,
                    "fork ready"
                );
                Ok(())
            }
            other => Err(SupervisorError::ProtocolError {
                expected: "Hello".to_string(),
                got: format!("{:?}", other),
            }),
        }
    }

    /// Next frame from the fork. Kills the fork once `deadline` passes and
    /// reports a crash if it dies first; `stage` names where that happened.
    fn next_message(
        &mut self,
        deadline: Instant,
        stage: &str,
    ) -> Result<WorkerMessage, SupervisorError> {
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                self.terminate();
                return Err(SupervisorError::Timeout(self.timeout));
            }

            // Buffered bytes may be an incomplete frame that never completes
            // if the fork died, so check liveness either way.
            if self.reader.has_buffered_data() {
                if !self.is_alive() {
                    return Err(self.crashed(&format!("{stage} with partial data buffered")));
                }
            } else {
                let poll_timeout = remaining.min(Duration::from_millis(100));
                let fd = self.reader.get_ref().as_raw_fd();
                match wait_for_data(fd, poll_timeout.as_millis() as i32) {
                    PollResult::DataAvailable => {}
                    PollResult::Timeout => {
                        if !self.is_alive() {
                            return Err(self.crashed(stage));
                        }
                        continue;
                    }
                    PollResult::PipeClosed => return Err(self.crashed(stage)),
                    PollResult::Error(e) => {
                        return Err(SupervisorError::WorkerCrashed(format!("Pipe error: {}", e)));
                    }
                }
            }

            return match self.reader.read() {
                Ok(msg) => Ok(msg),
                Err(FrameError::EndOfStream) => Err(self.crashed(stage)),
                Err(e) => {
                    if !self.is_alive() {
                        return Err(self.crashed(&format!("{stage} during read")));
                    }
                    Err(e.into())
                }
            };
        }
    }

    /// Run one fork of `bench_name` and collect its samples
    pub fn run_fork(
        &mut self,
        bench_name: &str,
        fork: u32,
        config: &RunConfig,
    ) -> Result<ForkRun, SupervisorError> {
        self.writer.write(&SupervisorCommand::Run {
            bench_name: bench_name.to_string(),
            fork,
            config: config.clone(),
        })?;

        let expected_hash = SampleBatcher::hash_name(bench_name);
        let mut expected_sequence = 0u32;
        let mut samples: Vec<Sample> = Vec::new();
        let deadline = Instant::now() + self.timeout;

        loop {
            match self.next_message(deadline, "mid-run")? {
                WorkerMessage::SampleBatch(batch) => {
                    if batch.bench_id_hash != expected_hash {
                        return Err(SupervisorError::ProtocolError {
                            expected: format!("samples for {bench_name}"),
                            got: format!("batch hash {:#x}", batch.bench_id_hash),
                        });
                    }
                    if batch.batch_sequence != expected_sequence {
                        return Err(SupervisorError::ProtocolError {
                            expected: format!("batch {expected_sequence}"),
                            got: format!("batch {}", batch.batch_sequence),
                        });
                    }
                    if let Some(stray) = batch.samples.iter().find(|s| s.fork != fork) {
                        return Err(SupervisorError::ProtocolError {
                            expected: format!("samples of fork {fork}"),
                            got: format!("sample of fork {}", stray.fork),
                        });
                    }
                    expected_sequence = expected_sequence.wrapping_add(1);
                    samples.extend(batch.samples);
                }
                WorkerMessage::Complete(summary) => {
                    return Self::complete(samples, summary);
                }
                WorkerMessage::Failure { kind, message } => {
                    return Err(SupervisorError::Reported(HarnessError::from_failure(
                        kind, message,
                    )));
                }
                WorkerMessage::Hello(_) => {
                    return Err(SupervisorError::ProtocolError {
                        expected: "SampleBatch/Complete/Failure".to_string(),
                        got: "Hello".to_string(),
                    });
                }
            }
        }
    }

    fn complete(samples: Vec<Sample>, summary: ForkSummary) -> Result<ForkRun, SupervisorError> {
        if summary.samples != samples.len() as u64 {
            return Err(SupervisorError::ProtocolError {
                expected: format!("{} samples", summary.samples),
                got: format!("{} samples", samples.len()),
            });
        }
        Ok(ForkRun { samples, summary })
    }

    fn crashed(&mut self, context: &str) -> SupervisorError {
        SupervisorError::WorkerCrashed(format!(
            "fork exited {context} ({})",
            self.exit_description()
        ))
    }

    fn exit_description(&mut self) -> String {
        // Give a dying process a moment to be reaped so the status is known
        let deadline = Instant::now() + Duration::from_millis(100);
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => return describe_status(status),
                Ok(None) if Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(5))
                }
                Ok(None) => return "still running".to_string(),
                Err(e) => return format!("status unavailable: {e}"),
            }
        }
    }

    /// SIGTERM, wait up to the grace period, then SIGKILL
    fn terminate(&mut self) {
        let _ = send_sigterm(self.child.id());
        let deadline = Instant::now() + TERM_GRACE;
        while self.is_alive() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        if self.is_alive() {
            let _ = self.child.kill();
        }
        let _ = self.child.wait();
    }

    /// Ask the fork to exit and wait for it
    pub fn shutdown(mut self) -> Result<ExitStatus, SupervisorError> {
        self.writer.write(&SupervisorCommand::Shutdown)?;
        Ok(self.child.wait()?)
    }

    /// Check if the fork process is still running
    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        if self.is_alive() {
            self.terminate();
        }
    }
}

/// Fork Controller backed by child processes
pub struct ProcessForkController {
    binary: Option<PathBuf>,
    worker_timeout: Duration,
    jobs: usize,
}

impl ProcessForkController {
    /// Controller re-running the current executable
    pub fn new(worker_timeout: Duration, jobs: usize) -> Self {
        Self {
            binary: None,
            worker_timeout,
            jobs: jobs.max(1),
        }
    }

    /// Use `binary` as the fork executable instead of the current one
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = Some(binary.into());
        self
    }

    fn binary(&self) -> Result<PathBuf, SupervisorError> {
        match &self.binary {
            Some(path) => Ok(path.clone()),
            None => Ok(env::current_exe()?),
        }
    }

    fn run_one(&self, bench_name: &str, fork: u32, config: &RunConfig) -> ForkReport {
        let outcome = self.run_isolated(bench_name, fork, config).map_err(HarnessError::from);
        if let Err(err) = &outcome {
            warn!(benchmark = bench_name, fork, kind = err.kind(), error = %err, "fork failed");
        }
        ForkReport { fork, outcome }
    }

    fn run_isolated(
        &self,
        bench_name: &str,
        fork: u32,
        config: &RunConfig,
    ) -> Result<ForkRun, SupervisorError> {
        let binary = self.binary()?;
        let mut worker = WorkerHandle::spawn(&binary, self.worker_timeout)?;
        let run = worker.run_fork(bench_name, fork, config)?;
        let status = worker.shutdown()?;
        if !status.success() {
            return Err(SupervisorError::WorkerCrashed(format!(
                "fork finished but exited with {}",
                describe_status(status)
            )));
        }
        Ok(run)
    }
}

impl ForkController for ProcessForkController {
    fn run_forked(&self, benchmark: &dyn Benchmark, config: &RunConfig, forks: u32) -> Vec<ForkReport> {
        let name = benchmark.descriptor().full_name();

        if self.jobs == 1 || forks <= 1 {
            let mut reports = Vec::with_capacity(forks as usize);
            for fork in 0..forks {
                let report = self.run_one(&name, fork, config);
                let fatal = report.outcome.as_ref().err().is_some_and(HarnessError::is_fatal);
                reports.push(report);
                if fatal {
                    break;
                }
            }
            return reports;
        }

        let threads = self.jobs.min(forks as usize);
        match ThreadPoolBuilder::new().num_threads(threads).build() {
            Ok(pool) => {
                info!(benchmark = %name, forks, jobs = threads, "running forks in parallel");
                pool.install(|| {
                    (0..forks)
                        .into_par_iter()
                        .map(|fork| self.run_one(&name, fork, config))
                        .collect()
                })
            }
            Err(e) => {
                warn!(error = %e, "cannot build fork pool, running forks sequentially");
                (0..forks).map(|fork| self.run_one(&name, fork, config)).collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forkbench_ipc::{MessageWriter, Phase, WorkerCapabilities};
    use std::os::unix::fs::PermissionsExt;

    /// Executable shell script in the temp dir, unique per test process
    fn script(name: &str, body: &str) -> PathBuf {
        let path = env::temp_dir().join(format!("forkbench-{name}-{}.sh", std::process::id()));
        std::fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn test_complete_checks_sample_count() {
        let samples = vec![Sample::new(10, Phase::Measurement)];
        let ok = WorkerHandle::complete(
            samples.clone(),
            ForkSummary {
                samples: 1,
                ..Default::default()
            },
        );
        assert_eq!(ok.unwrap().samples.len(), 1);

        let short = WorkerHandle::complete(
            samples,
            ForkSummary {
                samples: 3,
                ..Default::default()
            },
        );
        assert!(matches!(short, Err(SupervisorError::ProtocolError { .. })));
    }

    #[test]
    fn test_errors_map_to_taxonomy() {
        let reported: HarnessError =
            SupervisorError::Reported(HarnessError::Workload("boom".into())).into();
        assert_eq!(reported.kind(), "WorkloadError");

        let timeout: HarnessError = SupervisorError::Timeout(Duration::from_secs(1)).into();
        assert_eq!(timeout.kind(), "ForkFailure");
    }

    #[test]
    fn test_protocol_error_names_both_sides() {
        let err = SupervisorError::ProtocolError {
            expected: "Hello".to_string(),
            got: "Complete".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Fork protocol error: expected Hello, got Complete"
        );
        let failure: HarnessError = err.into();
        assert!(failure.message().contains("expected Hello"), "{failure}");
    }

    #[test]
    fn test_spawn_missing_binary_is_fork_failure() {
        let controller = ProcessForkController::new(Duration::from_secs(5), 1)
            .with_binary("/nonexistent/forkbench-fork-binary");
        let report = controller.run_one("any", 0, &RunConfig::default());
        let err = report.outcome.unwrap_err();
        assert_eq!(err.kind(), "ForkFailure");
    }

    #[test]
    fn test_process_that_never_handshakes_is_fork_failure() {
        // `true` ignores the worker flag and exits without a Hello
        let controller = ProcessForkController::new(Duration::from_secs(5), 1).with_binary("true");
        let report = controller.run_one("any", 0, &RunConfig::default());
        let err = report.outcome.unwrap_err();
        assert_eq!(err.kind(), "ForkFailure");
        assert!(err.message().contains("before handshake"), "{err}");
    }

    #[test]
    fn test_silent_fork_times_out_during_handshake() {
        // Keeps fd 4 open without ever writing a Hello
        let silent = script("silent", "exec sleep 5\n");

        let start = Instant::now();
        let result = WorkerHandle::spawn(&silent, Duration::from_millis(300));
        let elapsed = start.elapsed();
        let _ = std::fs::remove_file(&silent);

        match result {
            Err(SupervisorError::Timeout(timeout)) => {
                assert_eq!(timeout, Duration::from_millis(300))
            }
            Err(other) => panic!("expected a timeout, got {other}"),
            Ok(_) => panic!("a fork without a Hello must not be accepted"),
        }
        assert!(elapsed < Duration::from_secs(3), "took {elapsed:?}");
    }

    #[test]
    fn test_handshake_arrives_on_fork_fds() {
        let mut hello = Vec::new();
        MessageWriter::new(&mut hello)
            .write(&WorkerMessage::Hello(WorkerCapabilities::default()))
            .unwrap();
        let frame = env::temp_dir().join(format!("forkbench-hello-{}.bin", std::process::id()));
        std::fs::write(&frame, hello).unwrap();

        // Exits 3 if the command pipe is missing, else replays the Hello on fd 4
        let fork = script(
            "hello",
            &format!(
                "[ -e /dev/fd/3 ] || exit 3\ncat '{}' >&4\nexec sleep 5\n",
                frame.display()
            ),
        );

        let result = WorkerHandle::spawn(&fork, Duration::from_secs(10));
        let _ = std::fs::remove_file(&fork);
        let _ = std::fs::remove_file(&frame);

        match result {
            Ok(mut handle) => assert!(handle.is_alive()),
            Err(e) => panic!("handshake failed: {e}"),
        }
    }
}
