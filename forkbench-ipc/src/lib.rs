#![warn(missing_docs)]
//! forkbench IPC protocol
//!
//! Wire types exchanged between the supervisor and the fork processes it spawns.
//! Messages are rkyv archives behind a length prefix, so a fork can stream raw
//! samples back without a parsing step on either side.

mod batch;
mod framing;
mod messages;

pub use batch::SampleBatcher;
pub use framing::{
    CommandReader, CommandWriter, Frame, FrameError, FrameReader, FrameWriter, MAX_FRAME_SIZE,
    MessageReader, MessageWriter,
};
pub use messages::{
    ErrorPolicy, FailureKind, ForkSummary, Limit, Phase, RunConfig, Sample, SampleBatch,
    SupervisorCommand, WorkerCapabilities, WorkerMessage,
};

/// Protocol version for compatibility checking
pub const PROTOCOL_VERSION: u32 = 1;

/// Maximum samples per batch
pub const MAX_BATCH_SIZE: usize = 10_000;

/// Command line flag that turns a benchmark binary into a fork process.
pub const WORKER_FLAG: &str = "--forkbench-worker";

/// Environment variable carrying the `<read_fd>,<write_fd>` pair of a fork process.
pub const IPC_FD_ENV: &str = "FORKBENCH_IPC_FD";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_size() {
        assert_eq!(std::mem::size_of::<Sample>(), 32);
        assert_eq!(std::mem::align_of::<Sample>(), 8);
    }

    #[test]
    fn test_batch_fits_in_frame() {
        assert!(MAX_BATCH_SIZE * std::mem::size_of::<Sample>() < MAX_FRAME_SIZE);
    }
}
