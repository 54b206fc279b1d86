//! Stream source and output sink adapters.
//!
//! The orchestrator core is generic over its collaborators; this module
//! holds the concrete adapters shipped with the crate: in-memory buffers
//! for tests and harnesses, and chunked WAV file I/O for the CLI.

pub mod memory;
pub mod wav;

/// One tick's worth of mono audio samples.
pub type AudioChunk = Vec<f32>;
