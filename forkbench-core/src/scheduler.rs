//! Iteration Scheduler
//!
//! Every worker thread of a fork walks `INIT -> WARMUP -> MEASURE -> DONE`.
//! Workers meet at a start gate after INIT, then progress independently; the fork
//! is complete once all of them reach DONE.
//!
//! A worker leaves its phases early, keeping what it has recorded, when:
//! - another worker aborted the fork (fixture or fatal workload error)
//! - the supervisor asked for shutdown
//! - the fork's soft budget ran out

use crate::error::HarnessError;
use crate::fixture::{FixtureManager, ThreadContext};
use crate::runner::{consume, invoke};
use crate::workload::Workload;
use forkbench_ipc::{ErrorPolicy, ForkSummary, Limit, Phase, RunConfig, Sample};
use std::sync::{Condvar, Mutex, PoisonError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Per-worker scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Acquiring the fixture
    Init,
    /// Discarded invocations
    Warmup,
    /// Recorded invocations
    Measure,
    /// Fixture released
    Done,
}

/// Everything one fork produced
#[derive(Debug, Clone, Default)]
pub struct ForkRun {
    /// Samples from both phases, grouped by worker
    pub samples: Vec<Sample>,
    /// Completion record
    pub summary: ForkSummary,
}

impl ForkRun {
    /// Measurement-phase samples only
    pub fn measurement_samples(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter().filter(|s| s.is_measurement())
    }
}

#[derive(Default)]
struct WorkerRun {
    samples: Vec<Sample>,
    skipped: u64,
    timed_out: bool,
    error: Option<HarnessError>,
}

/// Run one fork: `config.threads` workers against `fixtures` and `workload`.
///
/// Any fixture or fatal workload error ends the whole fork with that error.
pub fn run_fork<S, W>(
    fixtures: &FixtureManager<S>,
    workload: &W,
    fork: u32,
    config: &RunConfig,
    cancel: &AtomicBool,
) -> Result<ForkRun, HarnessError>
where
    S: Send + Sync,
    W: Workload<S> + ?Sized,
{
    config
        .validate()
        .map_err(|e| HarnessError::ForkFailure(format!("invalid run configuration: {e}")))?;

    let threads = config.threads as usize;
    let gate = StartGate::default();
    let abort = AtomicBool::new(false);
    let budget = config.effective_budget_ns().map(Duration::from_nanos);

    let runs: Vec<WorkerRun> = thread::scope(|scope| {
        let mut handles = Vec::with_capacity(threads);
        let mut spawn_error = None;
        for index in 0..threads {
            let worker = Worker {
                index: index as u16,
                fork,
                config,
                fixtures,
                workload,
                gate: &gate,
                abort: &abort,
                cancel,
                budget,
                deadline: None,
                iteration: 0,
                ctx: ThreadContext::new(index as u16),
                out: WorkerRun::default(),
            };
            match thread::Builder::new()
                .name(format!("forkbench-worker-{index}"))
                .spawn_scoped(scope, move || worker.run())
            {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    spawn_error = Some(e);
                    break;
                }
            }
        }

        // Workers already waiting at the gate are released either way
        let mut runs = Vec::with_capacity(threads);
        match spawn_error {
            Some(e) => {
                warn!(fork, spawned = handles.len(), threads, error = %e, "cannot spawn worker");
                abort.store(true, Ordering::Release);
                gate.cancel();
                runs.push(WorkerRun {
                    error: Some(HarnessError::ForkFailure(format!("cannot spawn worker: {e}"))),
                    ..Default::default()
                });
            }
            None => gate.seal(handles.len()),
        }

        for handle in handles {
            runs.push(handle.join().unwrap_or_else(|_| WorkerRun {
                error: Some(HarnessError::Workload("worker thread panicked".to_string())),
                ..Default::default()
            }));
        }
        runs
    });

    let mut run = ForkRun {
        samples: Vec::with_capacity(runs.iter().map(|r| r.samples.len()).sum()),
        summary: ForkSummary {
            fixtures_constructed: fixtures.constructed() as u64,
            ..Default::default()
        },
    };
    for worker in runs {
        if let Some(err) = worker.error {
            return Err(err);
        }
        run.summary.skipped += worker.skipped;
        run.summary.timed_out |= worker.timed_out;
        run.samples.extend(worker.samples);
    }
    run.summary.samples = run.samples.len() as u64;
    if run.summary.timed_out {
        warn!(fork, samples = run.summary.samples, "budget exhausted, keeping partial samples");
    }
    Ok(run)
}

/// Start line shared by the workers of one fork.
///
/// Opens once every spawned worker has arrived. The spawner seals it with the
/// number of workers that actually started, or cancels it when spawning failed.
#[derive(Default)]
struct StartGate {
    state: Mutex<GateState>,
    changed: Condvar,
}

#[derive(Default)]
struct GateState {
    arrived: usize,
    expected: Option<usize>,
    cancelled: bool,
}

impl StartGate {
    /// Wait for the start. `false` means the fork was cancelled before it began.
    fn arrive(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.arrived += 1;
        self.changed.notify_all();
        loop {
            if state.cancelled {
                return false;
            }
            if state.expected.is_some_and(|n| state.arrived >= n) {
                return true;
            }
            state = self
                .changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn seal(&self, spawned: usize) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.expected = Some(spawned);
        self.changed.notify_all();
    }

    fn cancel(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.cancelled = true;
        self.changed.notify_all();
    }
}

struct Worker<'a, S, W: ?Sized> {
    index: u16,
    fork: u32,
    config: &'a RunConfig,
    fixtures: &'a FixtureManager<S>,
    workload: &'a W,
    gate: &'a StartGate,
    abort: &'a AtomicBool,
    cancel: &'a AtomicBool,
    budget: Option<Duration>,
    deadline: Option<Instant>,
    iteration: u64,
    ctx: ThreadContext<S>,
    out: WorkerRun,
}

enum Step {
    Continue,
    Stop,
}

impl<S, W> Worker<'_, S, W>
where
    W: Workload<S> + ?Sized,
{
    fn run(mut self) -> WorkerRun {
        let mut state = SchedulerState::Init;
        loop {
            state = match state {
                SchedulerState::Init => self.init(),
                SchedulerState::Warmup => {
                    if self.run_phase(Phase::Warmup, self.config.warmup) {
                        SchedulerState::Measure
                    } else {
                        SchedulerState::Done
                    }
                }
                SchedulerState::Measure => {
                    self.run_phase(Phase::Measurement, self.config.measurement);
                    SchedulerState::Done
                }
                SchedulerState::Done => {
                    self.fixtures.finish(&mut self.ctx);
                    debug!(
                        fork = self.fork,
                        worker = self.index,
                        samples = self.out.samples.len(),
                        "worker done"
                    );
                    return self.out;
                }
            };
        }
    }

    fn init(&mut self) -> SchedulerState {
        if let Err(err) = self.fixtures.prepare(&mut self.ctx) {
            self.fail(err);
        }
        // Every worker arrives, failed or not, so the gate count stays exact.
        if !self.gate.arrive() || self.abort.load(Ordering::Acquire) {
            return SchedulerState::Done;
        }
        self.deadline = self.budget.map(|b| Instant::now() + b);
        SchedulerState::Warmup
    }

    /// Returns `true` when the phase ran to its limit
    fn run_phase(&mut self, phase: Phase, limit: Limit) -> bool {
        let started = Instant::now();
        let mut attempted = 0u64;
        loop {
            let more = match limit {
                Limit::Iterations(n) => attempted < n,
                Limit::Time { nanos } => started.elapsed() < Duration::from_nanos(nanos),
            };
            if !more {
                return true;
            }
            if self.should_stop() {
                return false;
            }
            attempted += 1;
            if let Step::Stop = self.invoke_once(phase) {
                return false;
            }
        }
    }

    fn invoke_once(&mut self, phase: Phase) -> Step {
        let handle = match self.fixtures.acquire(&mut self.ctx) {
            Ok(handle) => handle,
            Err(err) => {
                self.fail(err);
                return Step::Stop;
            }
        };

        let step = match invoke(self.workload, handle, self.config.ops_per_invocation, phase) {
            Ok((sample, output)) => {
                consume(output);
                self.out
                    .samples
                    .push(sample.tagged(self.fork, self.index, self.iteration));
                self.iteration += 1;
                Step::Continue
            }
            Err(message) => match self.config.error_policy {
                ErrorPolicy::Abort => {
                    self.fail(HarnessError::Workload(message));
                    Step::Stop
                }
                ErrorPolicy::SkipSample => {
                    debug!(worker = self.index, %message, "skipping failed invocation");
                    self.out.skipped += 1;
                    Step::Continue
                }
            },
        };

        self.fixtures.release(&mut self.ctx);
        step
    }

    fn should_stop(&mut self) -> bool {
        if self.abort.load(Ordering::Acquire) || self.cancel.load(Ordering::Relaxed) {
            return true;
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            self.out.timed_out = true;
            return true;
        }
        false
    }

    fn fail(&mut self, err: HarnessError) {
        warn!(fork = self.fork, worker = self.index, error = %err, "aborting fork");
        self.out.error = Some(err);
        self.abort.store(true, Ordering::Release);
    }
}
