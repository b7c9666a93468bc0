//! Length-Prefixed Frame Encoding
//!
//! Each pipe of a fork carries one message type: commands flow supervisor to
//! fork, messages flow back. Readers and writers are typed by that direction,
//! and every decoded message is checked against the protocol limits before it
//! reaches the caller.
//!
//! Frame format:
//! ```text
//! +----------------+------------------+
//! | length (4 LE)  | rkyv payload     |
//! +----------------+------------------+
//! ```

use crate::MAX_BATCH_SIZE;
use crate::messages::{SupervisorCommand, WorkerMessage};
use rkyv::ser::serializers::AllocSerializer;
use rkyv::validation::validators::DefaultValidator;
use rkyv::{Archive, CheckBytes, Deserialize, Infallible, Serialize};
use std::io::{BufReader, BufWriter, Read, Write};
use std::marker::PhantomData;
use thiserror::Error;

/// Maximum frame size (16 MB)
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

const PIPE_BUFFER: usize = 64 * 1024;

/// Errors that can occur during frame encoding/decoding
#[derive(Debug, Error)]
pub enum FrameError {
    /// The underlying pipe failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// rkyv could not serialize the message
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The payload is not a valid archive of the expected message type
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Length prefix above `MAX_FRAME_SIZE`
    #[error("Frame too large: {size} bytes (max {max} bytes)")]
    FrameTooLarge {
        /// Announced payload length
        size: usize,
        /// Frame limit
        max: usize,
    },

    /// A sample batch above `MAX_BATCH_SIZE`
    #[error("Sample batch too large: {samples} samples (max {max})")]
    BatchTooLarge {
        /// Samples in the batch
        samples: usize,
        /// Batch limit
        max: usize,
    },

    /// A well-formed archive that the protocol does not allow
    #[error("Invalid {channel} frame: {reason}")]
    InvalidFrame {
        /// Direction the frame travelled on
        channel: &'static str,
        /// What was wrong with it
        reason: String,
    },

    /// The peer closed its end between frames
    #[error("End of stream")]
    EndOfStream,
}

/// A message type that owns one direction of the pipe pair
pub trait Frame: Sized {
    /// Direction name for error messages
    const CHANNEL: &'static str;

    /// Reject messages that decode fine but break protocol limits
    fn check(&self) -> Result<(), FrameError>;

    /// Shorthand for an `InvalidFrame` error on this channel
    fn invalid(reason: impl Into<String>) -> FrameError {
        FrameError::InvalidFrame {
            channel: Self::CHANNEL,
            reason: reason.into(),
        }
    }
}

impl Frame for SupervisorCommand {
    const CHANNEL: &'static str = "command";

    fn check(&self) -> Result<(), FrameError> {
        match self {
            SupervisorCommand::Run { bench_name, .. } if bench_name.is_empty() => {
                Err(Self::invalid("run command without a benchmark name"))
            }
            _ => Ok(()),
        }
    }
}

impl Frame for WorkerMessage {
    const CHANNEL: &'static str = "message";

    fn check(&self) -> Result<(), FrameError> {
        match self {
            WorkerMessage::SampleBatch(batch) if batch.samples.len() > MAX_BATCH_SIZE => {
                Err(FrameError::BatchTooLarge {
                    samples: batch.samples.len(),
                    max: MAX_BATCH_SIZE,
                })
            }
            WorkerMessage::SampleBatch(batch) if batch.samples.is_empty() => {
                Err(Self::invalid("empty sample batch"))
            }
            _ => Ok(()),
        }
    }
}

/// Supervisor side of the command pipe
pub type CommandWriter<W> = FrameWriter<W, SupervisorCommand>;
/// Fork side of the command pipe
pub type CommandReader<R> = FrameReader<R, SupervisorCommand>;
/// Fork side of the message pipe
pub type MessageWriter<W> = FrameWriter<W, WorkerMessage>;
/// Supervisor side of the message pipe
pub type MessageReader<R> = FrameReader<R, WorkerMessage>;

/// Sends frames of one message type
pub struct FrameWriter<W: Write, M> {
    writer: BufWriter<W>,
    _message: PhantomData<fn(M)>,
}

impl<W: Write, M> FrameWriter<W, M>
where
    M: Frame + Serialize<AllocSerializer<256>>,
{
    /// Create a new frame writer with a 64KB buffer
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::with_capacity(PIPE_BUFFER, writer),
            _message: PhantomData,
        }
    }

    /// Check, encode and flush one message
    pub fn write(&mut self, message: &M) -> Result<(), FrameError> {
        message.check()?;

        let bytes = rkyv::to_bytes::<_, 256>(message)
            .map_err(|e| FrameError::Serialization(e.to_string()))?;
        if bytes.len() > MAX_FRAME_SIZE {
            return Err(FrameError::FrameTooLarge {
                size: bytes.len(),
                max: MAX_FRAME_SIZE,
            });
        }

        self.writer.write_all(&(bytes.len() as u32).to_le_bytes())?;
        self.writer.write_all(&bytes)?;
        // The peer blocks on whole frames, so never leave one half-buffered.
        self.writer.flush()?;
        Ok(())
    }
}

/// Receives frames of one message type
pub struct FrameReader<R: Read, M> {
    reader: BufReader<R>,
    _message: PhantomData<fn() -> M>,
}

impl<R: Read, M> FrameReader<R, M>
where
    M: Frame + Archive,
    M::Archived: for<'a> CheckBytes<DefaultValidator<'a>> + Deserialize<M, Infallible>,
{
    /// Create a new frame reader with a 64KB buffer
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::with_capacity(PIPE_BUFFER, reader),
            _message: PhantomData,
        }
    }

    /// Read, validate and check one message
    pub fn read(&mut self) -> Result<M, FrameError> {
        let mut len_buf = [0u8; 4];
        match self.reader.read_exact(&mut len_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(FrameError::EndOfStream);
            }
            Err(e) => return Err(FrameError::Io(e)),
        }

        let len = u32::from_le_bytes(len_buf) as usize;
        if len > MAX_FRAME_SIZE {
            return Err(FrameError::FrameTooLarge {
                size: len,
                max: MAX_FRAME_SIZE,
            });
        }
        if len == 0 {
            return Err(M::invalid("zero-length frame"));
        }

        // rkyv needs an aligned buffer to validate in place
        let mut buf = rkyv::AlignedVec::with_capacity(len);
        buf.resize(len, 0);
        self.reader.read_exact(&mut buf)?;

        let archived = rkyv::check_archived_root::<M>(&buf)
            .map_err(|e| FrameError::Deserialization(e.to_string()))?;
        let message: M = archived
            .deserialize(&mut Infallible)
            .map_err(|e| FrameError::Deserialization(format!("{e:?}")))?;

        message.check()?;
        Ok(message)
    }

    /// Whether bytes of a not yet consumed frame sit in the buffer
    pub fn has_buffered_data(&self) -> bool {
        !self.reader.buffer().is_empty()
    }

    /// The underlying pipe, e.g. to poll its fd
    pub fn get_ref(&self) -> &R {
        self.reader.get_ref()
    }
}
