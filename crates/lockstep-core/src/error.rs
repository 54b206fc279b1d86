//! Error types for the orchestrator.
//!
//! Per-stream failures (`StateAllocation`, `SourceRead`, `SinkWrite`) drop
//! the offending stream from future batches; `InferenceFailure` aborts the
//! whole run because a batched, stateful call cannot be attributed to one
//! stream after the fact.

use thiserror::Error;

use crate::orchestrator::{StreamIndex, Tick};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Registration attempted past the configured stream limit.
    #[error("stream capacity exceeded: limit is {limit} streams")]
    CapacityExceeded { limit: usize },

    /// The inference capability could not allocate per-stream state.
    #[error("state allocation failed for stream {stream}: {reason}")]
    StateAllocation { stream: StreamIndex, reason: String },

    /// The batched inference call failed; fatal to the run.
    #[error("inference failed at tick {tick}: {reason}")]
    InferenceFailure { tick: Tick, reason: String },

    /// A stream source failed to produce its next input unit.
    #[error("source read failed for stream {stream}: {reason}")]
    SourceRead { stream: StreamIndex, reason: String },

    /// An output sink rejected a write.
    #[error("sink write failed for stream {stream}: {reason}")]
    SinkWrite { stream: StreamIndex, reason: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("audio error: {0}")]
    Audio(#[from] hound::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
