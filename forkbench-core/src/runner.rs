//! Invocation Runner
//!
//! Times one invocation: `ops` back-to-back workload calls bracketed by a
//! single timer. Every output passes through [`consume`] so the optimizer
//! cannot drop the measured work.

use crate::error::panic_message;
use crate::fixture::FixtureHandle;
use crate::measure::Timer;
use crate::workload::Workload;
use forkbench_ipc::{Phase, Sample};
use std::hint::black_box;
use std::panic::{self, AssertUnwindSafe};

/// Sink for workload results
#[inline]
pub fn consume<T>(value: T) {
    drop(black_box(value));
}

/// Run one timed invocation.
///
/// Returns the sample and the last call's output; dropping that output is left
/// to the caller so its destructor runs outside the timed window. An error or
/// panic from the workload becomes `Err(message)`.
pub fn invoke<S, W>(
    workload: &W,
    fixture: &mut FixtureHandle<S>,
    ops: u64,
    phase: Phase,
) -> Result<(Sample, W::Output), String>
where
    W: Workload<S> + ?Sized,
{
    let ops = ops.max(1);
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let timer = Timer::start();
        for _ in 1..ops {
            consume(workload.invoke(fixture)?);
        }
        let last = workload.invoke(fixture)?;
        let nanos = timer.stop();
        Ok::<_, anyhow::Error>((nanos, last))
    }));

    match outcome {
        Ok(Ok((nanos, output))) => Ok((Sample::new(nanos, phase).with_ops(ops), black_box(output))),
        Ok(Err(err)) => Err(format!("{err:#}")),
        Err(panic) => Err(format!("panicked: {}", panic_message(&*panic))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workload::FnWorkload;
    use std::time::Duration;

    #[test]
    fn test_invoke_records_duration_and_ops() {
        let workload = FnWorkload(|f: &mut FixtureHandle<u32>| -> anyhow::Result<u32> {
            std::thread::sleep(Duration::from_millis(2));
            Ok(**f + 1)
        });
        let mut fixture = FixtureHandle::Owned(41);
        let (sample, output) = invoke(&workload, &mut fixture, 3, Phase::Measurement).unwrap();
        assert_eq!(output, 42);
        assert_eq!(sample.ops, 3);
        assert!(sample.duration_nanos >= 6_000_000);
        assert!(sample.is_measurement());
    }

    #[test]
    fn test_every_call_sees_the_fixture() {
        let workload = FnWorkload(|f: &mut FixtureHandle<Vec<u32>>| -> anyhow::Result<usize> {
            let v = f.get_mut().ok_or_else(|| anyhow::anyhow!("shared"))?;
            v.push(1);
            Ok(v.len())
        });
        let mut fixture = FixtureHandle::Owned(Vec::new());
        let (_, len) = invoke(&workload, &mut fixture, 4, Phase::Warmup).unwrap();
        assert_eq!(len, 4);
    }

    #[test]
    fn test_error_and_panic_are_reported() {
        let failing = FnWorkload(|_: &mut FixtureHandle<()>| -> anyhow::Result<()> {
            anyhow::bail!("division by zero")
        });
        let err = invoke(&failing, &mut FixtureHandle::Owned(()), 1, Phase::Measurement).unwrap_err();
        assert!(err.contains("division by zero"));

        let panicking = FnWorkload(|_: &mut FixtureHandle<()>| -> anyhow::Result<()> {
            panic!("index out of range")
        });
        let err = invoke(&panicking, &mut FixtureHandle::Owned(()), 1, Phase::Measurement).unwrap_err();
        assert!(err.contains("index out of range"));
    }
}
