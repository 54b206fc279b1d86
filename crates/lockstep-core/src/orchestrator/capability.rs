//! External collaborator contracts.
//!
//! The orchestrator sits at the top of the call stack and drives three
//! kinds of collaborators: a batched, stateful inference capability, one
//! input source per stream, and one output sink per stream. The traits
//! here are the whole coupling surface; remote inference clients, file
//! readers and encoders all stay behind them.

use crate::error::Result;
use crate::orchestrator::types::TickBatch;

/// A batch-oriented, stateful inference feature.
///
/// The capability is invoked exactly once per tick with the full batch.
/// Per-stream temporal context lives in an opaque `State` handle that the
/// orchestrator owns but never inspects; the capability is the only party
/// that reads or mutates its contents.
///
/// # State lifetime protocol
///
/// `allocate_state` is called once before a stream's first contributing
/// tick. `release_state` is called once, immediately *before* the `run`
/// call that consumes the stream's last slot; the handle is still passed
/// to that final `run` and is dropped by the orchestrator afterwards.
/// This matches remote-feature backends that reclaim server-side state on
/// the inference call following the release.
pub trait InferenceCapability {
    /// Per-tick input unit for one stream.
    type Input;
    /// Per-tick output unit for one stream.
    type Output;
    /// Opaque per-stream recurrent state handle.
    type State;

    /// Number of initial ticks during which input is consumed but no
    /// output is ready yet.
    fn priming_window_ticks(&self) -> u32;

    /// Number of padding ticks required after real input ends to drain
    /// the remaining buffered output. Queried once at setup.
    fn flush_window_ticks(&self) -> u32;

    /// Allocate a fresh state handle for one stream.
    fn allocate_state(&mut self) -> Result<Self::State>;

    /// Mark a state handle released. The handle will be included in at
    /// most one more `run` call before being dropped.
    fn release_state(&mut self, state: &mut Self::State) -> Result<()>;

    /// Synthesize one tick's worth of silence/zero input, used while a
    /// stream is inside its flush window.
    fn padding_input(&self) -> Self::Input;

    /// Run one batched inference step. `states[i]` is the state handle of
    /// the stream behind `batch.slots[i]`. Returns one entry per slot:
    /// `Some(output)` if that slot's output is ready this tick, `None`
    /// while the slot's stream is still inside the priming window.
    ///
    /// Blocking from the orchestrator's point of view; any internal
    /// asynchrony must be fully contained in the implementation.
    fn run(
        &mut self,
        batch: &TickBatch<Self::Input>,
        states: &mut [&mut Self::State],
    ) -> Result<Vec<Option<Self::Output>>>;
}

/// Per-stream input source, queried once per tick while the stream is
/// active. `Ok(None)` signals end of stream; after that the source is
/// never queried again.
pub trait StreamSource {
    type Input;

    fn next_input_unit(&mut self) -> Result<Option<Self::Input>>;
}

/// Per-stream output sink, written once per tick for which the stream's
/// output was marked ready.
pub trait OutputSink {
    type Output;

    fn write(&mut self, output: Self::Output) -> Result<()>;
}
