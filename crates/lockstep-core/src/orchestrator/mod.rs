//! Multi-stream batched-inference orchestration.
//!
//! Feeds N independently-progressing input streams through a stateful,
//! batch-oriented inference capability one tick at a time, while streams
//! start and end at different ticks and carry pipeline latency (outputs
//! lag inputs by a priming window, and padding must keep flowing after a
//! stream's real input ends until its buffered output drains).
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                       TickDriver                           │
//! │  ┌────────────────┐   ┌─────────────────┐                  │
//! │  │ StreamRegistry │◄──│ BatchAssembler  │── per tick ──►   │
//! │  │ (lifecycle +   │   │ (real/padding   │  InferenceCapability
//! │  │  state handles)│   │  slot staging)  │  (external, batched)
//! │  └────────────────┘   └─────────────────┘                  │
//! │        outputs routed back by stream index, never by slot  │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! The registry is a leaf; the assembler depends on the registry; the
//! driver depends on both plus the external capability, sources and
//! sinks.

mod assembler;
pub mod capability;
mod config;
mod driver;
pub mod metrics;
mod registry;
mod types;

pub use assembler::BatchAssembler;
pub use capability::{InferenceCapability, OutputSink, StreamSource};
pub use config::OrchestratorConfig;
pub use driver::TickDriver;
pub use metrics::RunMetrics;
pub use registry::StreamRegistry;
pub use types::{
    BatchSlot, RunState, SlotKind, StreamIndex, StreamLifecycle, Tick, TickBatch,
};
