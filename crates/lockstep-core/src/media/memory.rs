//! In-memory source and sink adapters.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::error::Result;
use crate::orchestrator::{OutputSink, StreamSource};

/// Source backed by a pre-loaded queue of input units.
pub struct MemorySource<I> {
    units: VecDeque<I>,
}

impl<I> MemorySource<I> {
    pub fn new(units: impl IntoIterator<Item = I>) -> Self {
        Self {
            units: units.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.units.len()
    }
}

impl<I> StreamSource for MemorySource<I> {
    type Input = I;

    fn next_input_unit(&mut self) -> Result<Option<I>> {
        Ok(self.units.pop_front())
    }
}

/// Sink that buffers outputs behind a shared handle, so a test or
/// harness can hand a clone to the driver and inspect what arrived after
/// the run.
pub struct MemorySink<O> {
    outputs: Arc<Mutex<Vec<O>>>,
}

impl<O> MemorySink<O> {
    pub fn new() -> Self {
        Self {
            outputs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn len(&self) -> usize {
        self.outputs.lock().expect("sink buffer poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<O: Clone> MemorySink<O> {
    /// Snapshot of everything written so far.
    pub fn outputs(&self) -> Vec<O> {
        self.outputs.lock().expect("sink buffer poisoned").clone()
    }
}

impl<O> Default for MemorySink<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O> Clone for MemorySink<O> {
    fn clone(&self) -> Self {
        Self {
            outputs: Arc::clone(&self.outputs),
        }
    }
}

impl<O> OutputSink for MemorySink<O> {
    type Output = O;

    fn write(&mut self, output: O) -> Result<()> {
        self.outputs
            .lock()
            .expect("sink buffer poisoned")
            .push(output);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_drains_in_order() {
        let mut source = MemorySource::new([1, 2, 3]);
        assert_eq!(source.next_input_unit().unwrap(), Some(1));
        assert_eq!(source.next_input_unit().unwrap(), Some(2));
        assert_eq!(source.next_input_unit().unwrap(), Some(3));
        assert_eq!(source.next_input_unit().unwrap(), None);
        // Exhausted sources keep reporting end of stream.
        assert_eq!(source.next_input_unit().unwrap(), None);
    }

    #[test]
    fn sink_clones_share_one_buffer() {
        let sink = MemorySink::new();
        let mut writer = sink.clone();
        writer.write(7).unwrap();
        writer.write(8).unwrap();
        assert_eq!(sink.outputs(), vec![7, 8]);
    }
}
