//! Core types for the orchestrator.

use serde::{Deserialize, Serialize};

/// Stable index of a registered stream. Assigned densely at registration,
/// never reused within a run.
pub type StreamIndex = usize;

/// One discrete step of the driver loop. Global across all streams,
/// starting at 0.
pub type Tick = u64;

/// Lifecycle state of a registered stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamLifecycle {
    /// Registered but has not contributed to any batch yet.
    NotStarted,
    /// Contributing input, but the capability has not produced a ready
    /// output for it yet (inside the priming window).
    Priming,
    /// Contributing input and receiving outputs.
    Active,
    /// Real input exhausted; submitting padding to drain buffered output.
    Flushing,
    /// No longer contributes to any batch.
    Finished,
}

impl StreamLifecycle {
    /// Whether the stream may still contribute a slot to a future batch.
    pub fn is_active(self) -> bool {
        self != StreamLifecycle::Finished
    }
}

/// Origin of a batch slot's input unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    /// Read from the stream's source this tick.
    Real,
    /// Synthesized (zero-valued) unit submitted during the flush window.
    Padding,
}

/// One slot of a tick's batch: one stream's input unit plus the stream
/// index it came from. The explicit index is what keeps outputs routed to
/// the right sink while batch membership changes tick to tick.
#[derive(Debug, Clone)]
pub struct BatchSlot<I> {
    /// Source stream of this slot.
    pub stream: StreamIndex,
    /// The input unit staged for this tick.
    pub input: I,
    /// Real or padding.
    pub kind: SlotKind,
    /// True iff this is the stream's last contributing tick (its flush
    /// counter reached zero while assembling this batch).
    pub last_contribution: bool,
}

/// The dense set of per-stream input units submitted to the capability in
/// a single tick. Slot order is registration order of the contributing
/// streams, so stream indices are strictly increasing across slots.
#[derive(Debug, Clone)]
pub struct TickBatch<I> {
    /// Tick this batch was assembled for.
    pub tick: Tick,
    /// Dense slots, one per contributing stream.
    pub slots: Vec<BatchSlot<I>>,
}

impl<I> TickBatch<I> {
    pub fn new(tick: Tick) -> Self {
        Self {
            tick,
            slots: Vec::new(),
        }
    }

    /// Number of contributing streams this tick.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Stream indices in slot order.
    pub fn stream_indices(&self) -> Vec<StreamIndex> {
        self.slots.iter().map(|s| s.stream).collect()
    }
}

/// State machine of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Streams registered, no tick executed yet.
    Setup,
    /// Tick loop in progress.
    Running,
    /// First empty batch observed; the run is over.
    Done,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_activity() {
        assert!(StreamLifecycle::NotStarted.is_active());
        assert!(StreamLifecycle::Priming.is_active());
        assert!(StreamLifecycle::Active.is_active());
        assert!(StreamLifecycle::Flushing.is_active());
        assert!(!StreamLifecycle::Finished.is_active());
    }

    #[test]
    fn batch_slot_order_is_stream_order() {
        let mut batch = TickBatch::new(3);
        for stream in [0usize, 2, 5] {
            batch.slots.push(BatchSlot {
                stream,
                input: (),
                kind: SlotKind::Real,
                last_contribution: false,
            });
        }
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.stream_indices(), vec![0, 2, 5]);
    }
}
