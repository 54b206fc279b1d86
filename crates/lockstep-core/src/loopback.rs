//! Loopback capability: a pure in-process stand-in for a remote batched
//! feature.
//!
//! Models the latency behavior of a real pipeline: each stream's output
//! at tick t is the input it submitted `priming_window` ticks earlier,
//! carried across ticks in per-stream state. Useful for wiring checks,
//! tests, and dry runs without a server; it also enforces the state
//! protocol (no use after the final post-release inference, no double
//! release).

use std::collections::VecDeque;

use tracing::trace;

use crate::error::{Error, Result};
use crate::orchestrator::{InferenceCapability, TickBatch};

/// Per-stream delay-line state.
pub struct LoopbackState<T> {
    pending: VecDeque<T>,
    released: bool,
    runs_after_release: u32,
}

impl<T> LoopbackState<T> {
    fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            released: false,
            runs_after_release: 0,
        }
    }
}

/// Identity delay line with configurable priming and flush windows.
pub struct LoopbackCapability<T> {
    priming_window: u32,
    flush_window: u32,
    padding: T,
    allocated: usize,
    released: usize,
}

impl<T: Clone> LoopbackCapability<T> {
    /// `padding` is the zero/silence unit cloned for flush ticks.
    pub fn new(priming_window: u32, flush_window: u32, padding: T) -> Self {
        Self {
            priming_window,
            flush_window,
            padding,
            allocated: 0,
            released: 0,
        }
    }

    /// State handles allocated so far.
    pub fn allocated(&self) -> usize {
        self.allocated
    }

    /// State handles released so far.
    pub fn released(&self) -> usize {
        self.released
    }
}

impl LoopbackCapability<Vec<f32>> {
    /// Audio variant: padding is one tick of silence.
    pub fn audio(priming_window: u32, flush_window: u32, samples_per_tick: usize) -> Self {
        Self::new(priming_window, flush_window, vec![0.0; samples_per_tick])
    }
}

impl<T: Clone> InferenceCapability for LoopbackCapability<T> {
    type Input = T;
    type Output = T;
    type State = LoopbackState<T>;

    fn priming_window_ticks(&self) -> u32 {
        self.priming_window
    }

    fn flush_window_ticks(&self) -> u32 {
        self.flush_window
    }

    fn allocate_state(&mut self) -> Result<Self::State> {
        self.allocated += 1;
        Ok(LoopbackState::new())
    }

    fn release_state(&mut self, state: &mut Self::State) -> Result<()> {
        if state.released {
            return Err(Error::InvalidInput(
                "loopback state released twice".into(),
            ));
        }
        state.released = true;
        self.released += 1;
        Ok(())
    }

    fn padding_input(&self) -> Self::Input {
        self.padding.clone()
    }

    fn run(
        &mut self,
        batch: &TickBatch<Self::Input>,
        states: &mut [&mut Self::State],
    ) -> Result<Vec<Option<Self::Output>>> {
        debug_assert_eq!(batch.len(), states.len());
        let mut outputs = Vec::with_capacity(batch.len());
        for (slot, state) in batch.slots.iter().zip(states.iter_mut()) {
            if state.released {
                state.runs_after_release += 1;
                // A released handle is consumed by exactly one more
                // inference, the one for the stream's last slot.
                if state.runs_after_release > 1 {
                    return Err(Error::InferenceFailure {
                        tick: batch.tick,
                        reason: format!(
                            "state for stream {} used {} ticks after release",
                            slot.stream, state.runs_after_release
                        ),
                    });
                }
            }
            state.pending.push_back(slot.input.clone());
            let ready = state.pending.len() as u32 > self.priming_window;
            trace!(
                tick = batch.tick,
                stream = slot.stream,
                queued = state.pending.len(),
                ready,
                "loopback slot"
            );
            outputs.push(if ready { state.pending.pop_front() } else { None });
        }
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::{BatchSlot, SlotKind};

    fn batch_of(tick: u64, streams: &[usize], value: u8) -> TickBatch<Vec<u8>> {
        let mut batch = TickBatch::new(tick);
        for &stream in streams {
            batch.slots.push(BatchSlot {
                stream,
                input: vec![value],
                kind: SlotKind::Real,
                last_contribution: false,
            });
        }
        batch
    }

    #[test]
    fn outputs_lag_inputs_by_the_priming_window() {
        let mut cap: LoopbackCapability<Vec<u8>> = LoopbackCapability::new(2, 2, vec![0]);
        let mut state = cap.allocate_state().unwrap();

        for (tick, value) in [0u64, 1].iter().zip([10u8, 11]) {
            let batch = batch_of(*tick, &[0], value);
            let out = cap.run(&batch, &mut [&mut state]).unwrap();
            assert_eq!(out, vec![None]);
        }
        let batch = batch_of(2, &[0], 12);
        let out = cap.run(&batch, &mut [&mut state]).unwrap();
        assert_eq!(out, vec![Some(vec![10])]);
    }

    #[test]
    fn released_state_survives_exactly_one_more_run() {
        let mut cap: LoopbackCapability<Vec<u8>> = LoopbackCapability::new(0, 1, vec![0]);
        let mut state = cap.allocate_state().unwrap();
        cap.release_state(&mut state).unwrap();

        let batch = batch_of(0, &[0], 1);
        assert!(cap.run(&batch, &mut [&mut state]).is_ok());
        let batch = batch_of(1, &[0], 2);
        assert!(cap.run(&batch, &mut [&mut state]).is_err());
    }

    #[test]
    fn double_release_is_an_error() {
        let mut cap: LoopbackCapability<Vec<u8>> = LoopbackCapability::new(0, 1, vec![0]);
        let mut state = cap.allocate_state().unwrap();
        cap.release_state(&mut state).unwrap();
        assert!(cap.release_state(&mut state).is_err());
    }

    #[test]
    fn audio_padding_is_silence() {
        let cap = LoopbackCapability::audio(1, 1, 8);
        assert_eq!(cap.padding_input(), vec![0.0; 8]);
    }
}
