//! Lockstep Core - multi-stream batched-inference orchestration.
//!
//! This crate drives N independently-progressing input streams (audio
//! chunk sequences, frame sequences) through a stateful, batch-oriented
//! inference capability, one tick at a time. Streams start and end at
//! different ticks, outputs lag inputs by the capability's priming
//! window, and padding input keeps flowing after a stream's real input
//! ends until its buffered output drains.
//!
//! # Example
//!
//! ```
//! use lockstep_core::loopback::LoopbackCapability;
//! use lockstep_core::media::memory::{MemorySink, MemorySource};
//! use lockstep_core::orchestrator::{OrchestratorConfig, TickDriver};
//!
//! let capability = LoopbackCapability::audio(2, 2, 4);
//! let mut driver = TickDriver::new(OrchestratorConfig::default(), capability);
//!
//! let sink = MemorySink::new();
//! driver
//!     .register_stream(
//!         Box::new(MemorySource::new(vec![vec![0.5f32; 4]; 3])),
//!         Box::new(sink.clone()),
//!     )
//!     .unwrap();
//!
//! let metrics = driver.run().unwrap();
//! assert_eq!(metrics.outputs_written, 3);
//! assert_eq!(sink.len(), 3);
//! ```

pub mod error;
pub mod loopback;
pub mod media;
pub mod orchestrator;

pub use error::{Error, Result};
pub use orchestrator::{
    BatchSlot, InferenceCapability, OrchestratorConfig, OutputSink, RunMetrics, RunState,
    SlotKind, StreamIndex, StreamLifecycle, StreamSource, Tick, TickBatch, TickDriver,
};
