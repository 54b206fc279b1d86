//! Stream registry: lifecycle and state-handle bookkeeping.
//!
//! The registry is the leaf of the orchestrator. It tracks every
//! registered stream's lifecycle, owns the opaque inference-state handle
//! for streams that are contributing, and enforces the allocate-once /
//! release-once protocol. It knows nothing about batches or sources; the
//! assembler and driver manipulate it through the methods here.

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::orchestrator::types::{StreamIndex, StreamLifecycle};

/// Per-stream bookkeeping.
struct StreamEntry<S> {
    lifecycle: StreamLifecycle,
    /// Present from the first contributing tick until retirement.
    state: Option<S>,
    /// Set once `release_state` has been forwarded to the capability.
    released: bool,
    /// Padding ticks left in the flush window. Meaningful only while
    /// `lifecycle == Flushing`.
    flush_remaining: u32,
    /// Real input units contributed so far.
    real_units: u64,
    /// Finished early for a source/sink/allocation failure rather than by
    /// draining its flush window.
    dropped: bool,
}

impl<S> StreamEntry<S> {
    fn new() -> Self {
        Self {
            lifecycle: StreamLifecycle::NotStarted,
            state: None,
            released: false,
            flush_remaining: 0,
            real_units: 0,
            dropped: false,
        }
    }
}

/// Registry of all streams in a run. Indices are dense, assigned in
/// registration order, and never reused.
pub struct StreamRegistry<S> {
    entries: Vec<StreamEntry<S>>,
    max_streams: Option<usize>,
}

impl<S> StreamRegistry<S> {
    pub fn new(max_streams: Option<usize>) -> Self {
        Self {
            entries: Vec::new(),
            max_streams,
        }
    }

    /// Register a new stream and assign the next unused index.
    pub fn register(&mut self) -> Result<StreamIndex> {
        if let Some(limit) = self.max_streams {
            if self.entries.len() >= limit {
                return Err(Error::CapacityExceeded { limit });
            }
        }
        let index = self.entries.len();
        self.entries.push(StreamEntry::new());
        debug!(stream = index, "registered stream");
        Ok(index)
    }

    /// Number of registered streams (active or not).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn lifecycle(&self, index: StreamIndex) -> StreamLifecycle {
        self.entries[index].lifecycle
    }

    /// True iff the stream should still be considered for batch assembly.
    pub fn is_active(&self, index: StreamIndex) -> bool {
        self.entries[index].lifecycle.is_active()
    }

    /// Number of streams that may still contribute.
    pub fn active_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.lifecycle.is_active())
            .count()
    }

    pub fn has_state(&self, index: StreamIndex) -> bool {
        self.entries[index].state.is_some()
    }

    /// Real input units the stream has contributed so far.
    pub fn real_units(&self, index: StreamIndex) -> u64 {
        self.entries[index].real_units
    }

    /// Attach a freshly allocated state handle. Must be called at most
    /// once per stream, before its first contributing tick.
    pub fn allocate_state_with(
        &mut self,
        index: StreamIndex,
        allocate: impl FnOnce() -> Result<S>,
    ) -> Result<()> {
        let entry = &mut self.entries[index];
        debug_assert!(
            entry.state.is_none() && !entry.released,
            "state allocated twice for stream {index}"
        );
        entry.state = Some(allocate().map_err(|e| Error::StateAllocation {
            stream: index,
            reason: e.to_string(),
        })?);
        debug!(stream = index, "allocated inference state");
        Ok(())
    }

    /// Forward a release to the capability, exactly once. A second call
    /// is a programming error: it panics in debug builds and is a logged
    /// no-op in release builds.
    pub fn release_state_with(
        &mut self,
        index: StreamIndex,
        release: impl FnOnce(&mut S) -> Result<()>,
    ) -> Result<()> {
        let entry = &mut self.entries[index];
        if entry.released || entry.state.is_none() {
            debug_assert!(false, "double release for stream {index}");
            warn!(stream = index, "ignoring double state release");
            return Ok(());
        }
        entry.released = true;
        if let Some(state) = entry.state.as_mut() {
            release(state)?;
        }
        debug!(stream = index, "released inference state");
        Ok(())
    }

    /// Whether `release_state_with` has already run for this stream.
    pub fn is_released(&self, index: StreamIndex) -> bool {
        self.entries[index].released
    }

    /// Record one real input contribution. Moves a NotStarted stream into
    /// Priming.
    pub fn record_real_contribution(&mut self, index: StreamIndex) {
        let entry = &mut self.entries[index];
        entry.real_units += 1;
        if entry.lifecycle == StreamLifecycle::NotStarted {
            entry.lifecycle = StreamLifecycle::Priming;
        }
    }

    /// Record the first ready output: Priming -> Active.
    pub fn record_output_ready(&mut self, index: StreamIndex) {
        let entry = &mut self.entries[index];
        if entry.lifecycle == StreamLifecycle::Priming {
            entry.lifecycle = StreamLifecycle::Active;
        }
    }

    /// Transition to Flushing with `window` padding ticks remaining.
    pub fn begin_flush(&mut self, index: StreamIndex, window: u32) {
        let entry = &mut self.entries[index];
        debug_assert!(
            matches!(
                entry.lifecycle,
                StreamLifecycle::Priming | StreamLifecycle::Active
            ),
            "flush begun for stream {index} in {:?}",
            entry.lifecycle
        );
        entry.lifecycle = StreamLifecycle::Flushing;
        entry.flush_remaining = window;
        debug!(stream = index, window, "stream entered flush window");
    }

    pub fn is_flushing(&self, index: StreamIndex) -> bool {
        self.entries[index].lifecycle == StreamLifecycle::Flushing
    }

    pub fn flush_remaining(&self, index: StreamIndex) -> u32 {
        self.entries[index].flush_remaining
    }

    /// Consume one flush tick; returns the count remaining afterwards.
    pub fn consume_flush_tick(&mut self, index: StreamIndex) -> u32 {
        let entry = &mut self.entries[index];
        debug_assert!(entry.lifecycle == StreamLifecycle::Flushing);
        debug_assert!(entry.flush_remaining > 0);
        entry.flush_remaining -= 1;
        entry.flush_remaining
    }

    /// Transition to Finished. Idempotent.
    pub fn mark_finished(&mut self, index: StreamIndex) {
        let entry = &mut self.entries[index];
        if entry.lifecycle != StreamLifecycle::Finished {
            entry.lifecycle = StreamLifecycle::Finished;
            debug!(stream = index, "stream finished");
        }
    }

    /// Finish the stream and drop its state handle.
    pub fn retire(&mut self, index: StreamIndex) -> Option<S> {
        self.mark_finished(index);
        self.entries[index].state.take()
    }

    /// Flag a stream as dropped for a failure, as opposed to finishing by
    /// draining its flush window.
    pub fn mark_dropped(&mut self, index: StreamIndex) {
        self.entries[index].dropped = true;
    }

    /// Streams dropped early for failures.
    pub fn dropped_count(&self) -> usize {
        self.entries.iter().filter(|e| e.dropped).count()
    }

    /// Streams whose lifecycle has reached Finished.
    pub fn finished_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.lifecycle == StreamLifecycle::Finished)
            .count()
    }

    /// Mutable state handles for the given streams, in slot order.
    /// `streams` must be strictly increasing (slot order is registration
    /// order) and every stream must hold a state handle.
    pub fn states_in_slot_order(&mut self, streams: &[StreamIndex]) -> Vec<&mut S> {
        debug_assert!(streams.windows(2).all(|w| w[0] < w[1]));
        let mut wanted = streams.iter().copied().peekable();
        let mut states = Vec::with_capacity(streams.len());
        for (index, entry) in self.entries.iter_mut().enumerate() {
            if wanted.peek() == Some(&index) {
                wanted.next();
                debug_assert!(entry.state.is_some(), "missing state for stream {index}");
                if let Some(state) = entry.state.as_mut() {
                    states.push(state);
                }
            }
        }
        states
    }
}
