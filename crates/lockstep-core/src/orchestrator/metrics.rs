//! Run-level metrics.

use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::orchestrator::types::{SlotKind, TickBatch};

/// Counters accumulated over one orchestrated run. Serializable so the
/// caller can dump a summary after the run completes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunMetrics {
    /// Ticks executed (batches submitted to the capability).
    pub ticks: u64,
    /// Slots carrying real source input.
    pub real_slots: u64,
    /// Synthetic padding slots submitted during flush windows.
    pub padding_slots: u64,
    /// Outputs delivered to sinks.
    pub outputs_written: u64,
    /// Streams registered at setup.
    pub streams_registered: usize,
    /// Streams that drained their full flush window.
    pub streams_completed: usize,
    /// Streams dropped early for source/sink/allocation failures.
    pub streams_dropped: usize,
    /// Largest batch observed.
    pub peak_batch_size: usize,
    /// Wall-clock duration of the run in seconds.
    pub elapsed_secs: f64,
    #[serde(skip)]
    started: Option<Instant>,
}

impl RunMetrics {
    pub fn new(streams_registered: usize) -> Self {
        Self {
            streams_registered,
            started: Some(Instant::now()),
            ..Default::default()
        }
    }

    pub fn record_batch<I>(&mut self, batch: &TickBatch<I>) {
        self.ticks += 1;
        self.peak_batch_size = self.peak_batch_size.max(batch.len());
        for slot in &batch.slots {
            match slot.kind {
                SlotKind::Real => self.real_slots += 1,
                SlotKind::Padding => self.padding_slots += 1,
            }
        }
    }

    pub fn record_output(&mut self) {
        self.outputs_written += 1;
    }

    /// Capture wall time and final stream tallies; called once when the
    /// run reaches `Done`.
    pub fn finish(&mut self, streams_completed: usize, streams_dropped: usize) {
        self.streams_completed = streams_completed;
        self.streams_dropped = streams_dropped;
        if let Some(started) = self.started {
            self.elapsed_secs = started.elapsed().as_secs_f64();
        }
    }

    /// Total slots submitted across all ticks.
    pub fn total_slots(&self) -> u64 {
        self.real_slots + self.padding_slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::types::BatchSlot;

    #[test]
    fn counts_slots_by_kind() {
        let mut metrics = RunMetrics::new(2);
        let mut batch = TickBatch::new(0);
        batch.slots.push(BatchSlot {
            stream: 0,
            input: (),
            kind: SlotKind::Real,
            last_contribution: false,
        });
        batch.slots.push(BatchSlot {
            stream: 1,
            input: (),
            kind: SlotKind::Padding,
            last_contribution: true,
        });
        metrics.record_batch(&batch);

        assert_eq!(metrics.ticks, 1);
        assert_eq!(metrics.real_slots, 1);
        assert_eq!(metrics.padding_slots, 1);
        assert_eq!(metrics.peak_batch_size, 2);
        assert_eq!(metrics.total_slots(), 2);
    }

    #[test]
    fn serializes_without_start_instant() {
        let mut metrics = RunMetrics::new(1);
        metrics.finish(1, 0);
        let json = serde_json::to_string(&metrics).unwrap();
        assert!(json.contains("\"ticks\":0"));
        assert!(!json.contains("started"));
    }
}
