//! Batch assembly: one pass over all streams per tick.
//!
//! The assembler walks the registry in registration order and stages one
//! input unit per still-contributing stream into a dense batch. It owns
//! the real-input-to-padding transition, the flush-window countdown, and
//! the release-before-last-tick call; the driver only sees the finished
//! `TickBatch`.

use tracing::{debug, warn};

use crate::error::Result;
use crate::orchestrator::capability::{InferenceCapability, StreamSource};
use crate::orchestrator::registry::StreamRegistry;
use crate::orchestrator::types::{BatchSlot, SlotKind, StreamIndex, Tick, TickBatch};

/// Boxed source slot; `None` once the source is exhausted or dropped.
pub(crate) type SourceSlot<I> = Option<Box<dyn StreamSource<Input = I>>>;

pub struct BatchAssembler {
    /// Pipeline latency of the capability in ticks, queried once at setup.
    flush_window: u32,
    trace: bool,
}

impl BatchAssembler {
    pub fn new(flush_window: u32, trace: bool) -> Self {
        Self {
            flush_window,
            trace,
        }
    }

    pub fn flush_window(&self) -> u32 {
        self.flush_window
    }

    /// Assemble the batch for `tick`.
    ///
    /// An empty result means no stream produced a slot and the run is
    /// over. A `Err` return is fatal to the run (capability release
    /// failure); per-stream source failures only drop that stream.
    pub fn assemble<C: InferenceCapability>(
        &self,
        tick: Tick,
        registry: &mut StreamRegistry<C::State>,
        sources: &mut [SourceSlot<C::Input>],
        capability: &mut C,
    ) -> Result<TickBatch<C::Input>> {
        let mut batch = TickBatch::new(tick);

        for stream in 0..registry.len() {
            if !registry.is_active(stream) {
                continue;
            }

            if registry.is_flushing(stream) {
                self.push_padding_slot(stream, registry, capability, &mut batch)?;
                continue;
            }

            let unit = match sources[stream].as_mut() {
                Some(source) => source.next_input_unit(),
                // Source already gone while the stream is nominally live;
                // treat as end of data with nothing buffered.
                None => Ok(None),
            };

            match unit {
                Ok(Some(input)) => {
                    // Lazy state allocation on the first contributing
                    // tick; a failure drops this stream only.
                    if !registry.has_state(stream) {
                        if let Err(e) =
                            registry.allocate_state_with(stream, || capability.allocate_state())
                        {
                            warn!(stream, error = %e, "dropping stream: state allocation failed");
                            registry.mark_dropped(stream);
                            registry.mark_finished(stream);
                            sources[stream] = None;
                            continue;
                        }
                    }
                    registry.record_real_contribution(stream);
                    batch.slots.push(BatchSlot {
                        stream,
                        input,
                        kind: SlotKind::Real,
                        last_contribution: false,
                    });
                }
                Ok(None) => {
                    sources[stream] = None;
                    if !registry.has_state(stream) {
                        // Exhausted before ever contributing: no state,
                        // no flush, nothing to drain.
                        debug!(stream, tick, "stream empty at start; finishing");
                        registry.mark_finished(stream);
                        continue;
                    }
                    if self.flush_window == 0 {
                        // No pipeline latency: the previous tick was the
                        // last contribution, so release and retire now.
                        debug!(stream, tick, "source exhausted; no flush window");
                        registry
                            .release_state_with(stream, |s| capability.release_state(s))?;
                        registry.retire(stream);
                        continue;
                    }
                    debug!(
                        stream,
                        tick,
                        real_units = registry.real_units(stream),
                        "source exhausted; entering flush window"
                    );
                    registry.begin_flush(stream, self.flush_window);
                    self.push_padding_slot(stream, registry, capability, &mut batch)?;
                }
                Err(e) => {
                    warn!(stream, tick, error = %e, "dropping stream: source read failed");
                    drop_stream(stream, registry, capability);
                    sources[stream] = None;
                }
            }
        }

        if self.trace {
            debug!(tick, batch_size = batch.len(), "assembled batch");
        }
        Ok(batch)
    }

    /// Stage one synthetic padding slot and count down the flush window.
    /// When the counter reaches zero this is the stream's last
    /// contributing tick, so its state is released before the inference
    /// call that will consume this batch.
    fn push_padding_slot<C: InferenceCapability>(
        &self,
        stream: StreamIndex,
        registry: &mut StreamRegistry<C::State>,
        capability: &mut C,
        batch: &mut TickBatch<C::Input>,
    ) -> Result<()> {
        let remaining = registry.consume_flush_tick(stream);
        let last_contribution = remaining == 0;
        if last_contribution {
            registry.release_state_with(stream, |s| capability.release_state(s))?;
        } else {
            debug!(stream, remaining, "flush ticks remaining");
        }
        batch.slots.push(BatchSlot {
            stream,
            input: capability.padding_input(),
            kind: SlotKind::Padding,
            last_contribution,
        });
        Ok(())
    }
}

/// Remove a stream from the run outside the normal flush protocol
/// (source/sink failure). Releases its state handle if one is live and
/// marks it finished; the run itself continues.
pub(crate) fn drop_stream<C: InferenceCapability>(
    stream: StreamIndex,
    registry: &mut StreamRegistry<C::State>,
    capability: &mut C,
) {
    if registry.has_state(stream) && !registry.is_released(stream) {
        if let Err(e) = registry.release_state_with(stream, |s| capability.release_state(s)) {
            warn!(stream, error = %e, "state release failed while dropping stream");
        }
    }
    registry.mark_dropped(stream);
    registry.retire(stream);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::media::memory::MemorySource;
    use crate::orchestrator::types::StreamLifecycle;

    /// Minimal capability for assembly tests: unit state handles, scripted
    /// allocation failures, zero-chunk padding.
    struct ScriptedCapability {
        flush: u32,
        allocations: usize,
        fail_allocation_at: Option<usize>,
        releases: usize,
    }

    impl ScriptedCapability {
        fn new(flush: u32) -> Self {
            Self {
                flush,
                allocations: 0,
                fail_allocation_at: None,
                releases: 0,
            }
        }
    }

    impl InferenceCapability for ScriptedCapability {
        type Input = Vec<f32>;
        type Output = Vec<f32>;
        type State = ();

        fn priming_window_ticks(&self) -> u32 {
            0
        }

        fn flush_window_ticks(&self) -> u32 {
            self.flush
        }

        fn allocate_state(&mut self) -> Result<Self::State> {
            let attempt = self.allocations;
            self.allocations += 1;
            if self.fail_allocation_at == Some(attempt) {
                return Err(Error::InvalidInput("no free state slots".into()));
            }
            Ok(())
        }

        fn release_state(&mut self, _state: &mut Self::State) -> Result<()> {
            self.releases += 1;
            Ok(())
        }

        fn padding_input(&self) -> Self::Input {
            vec![0.0; 4]
        }

        fn run(
            &mut self,
            batch: &TickBatch<Self::Input>,
            _states: &mut [&mut Self::State],
        ) -> Result<Vec<Option<Self::Output>>> {
            Ok(batch.slots.iter().map(|_| None).collect())
        }
    }

    fn chunk(value: f32) -> Vec<f32> {
        vec![value; 4]
    }

    fn source_of(chunks: usize, value: f32) -> SourceSlot<Vec<f32>> {
        Some(Box::new(MemorySource::new(
            (0..chunks).map(|_| chunk(value)).collect::<Vec<_>>(),
        )))
    }

    fn setup(
        lengths: &[usize],
    ) -> (StreamRegistry<()>, Vec<SourceSlot<Vec<f32>>>) {
        let mut registry = StreamRegistry::new(None);
        let mut sources = Vec::new();
        for (i, &len) in lengths.iter().enumerate() {
            registry.register().unwrap();
            sources.push(source_of(len, i as f32));
        }
        (registry, sources)
    }

    #[test]
    fn slot_mapping_is_a_bijection_onto_contributors() {
        let mut capability = ScriptedCapability::new(2);
        let (mut registry, mut sources) = setup(&[3, 1, 2]);
        let assembler = BatchAssembler::new(2, false);

        let batch = assembler
            .assemble(0, &mut registry, &mut sources, &mut capability)
            .unwrap();
        assert_eq!(batch.stream_indices(), vec![0, 1, 2]);
        // No duplicate stream per tick, strictly increasing order.
        assert!(batch
            .stream_indices()
            .windows(2)
            .all(|w| w[0] < w[1]));
    }

    #[test]
    fn exhausted_stream_pads_exactly_flush_window_ticks() {
        let mut capability = ScriptedCapability::new(3);
        let (mut registry, mut sources) = setup(&[2]);
        let assembler = BatchAssembler::new(3, false);

        let mut kinds = Vec::new();
        for tick in 0..8 {
            let batch = assembler
                .assemble(tick, &mut registry, &mut sources, &mut capability)
                .unwrap();
            if batch.is_empty() {
                break;
            }
            kinds.push(batch.slots[0].kind);
            if batch.slots[0].last_contribution {
                registry.retire(0);
            }
        }
        assert_eq!(
            kinds,
            vec![
                SlotKind::Real,
                SlotKind::Real,
                SlotKind::Padding,
                SlotKind::Padding,
                SlotKind::Padding
            ]
        );
        assert_eq!(capability.releases, 1);
    }

    #[test]
    fn release_happens_on_the_last_padding_tick() {
        let mut capability = ScriptedCapability::new(2);
        let (mut registry, mut sources) = setup(&[1]);
        let assembler = BatchAssembler::new(2, false);

        // tick 0: real
        let batch = assembler
            .assemble(0, &mut registry, &mut sources, &mut capability)
            .unwrap();
        assert!(!batch.slots[0].last_contribution);
        assert_eq!(capability.releases, 0);

        // tick 1: first padding tick, not last
        let batch = assembler
            .assemble(1, &mut registry, &mut sources, &mut capability)
            .unwrap();
        assert_eq!(batch.slots[0].kind, SlotKind::Padding);
        assert!(!batch.slots[0].last_contribution);
        assert_eq!(capability.releases, 0);

        // tick 2: counter hits zero; released before this tick's run
        let batch = assembler
            .assemble(2, &mut registry, &mut sources, &mut capability)
            .unwrap();
        assert!(batch.slots[0].last_contribution);
        assert_eq!(capability.releases, 1);
        assert!(registry.is_released(0));
    }

    #[test]
    fn failed_allocation_drops_only_that_stream() {
        let mut capability = ScriptedCapability::new(1);
        capability.fail_allocation_at = Some(1);
        let (mut registry, mut sources) = setup(&[3, 3, 3]);
        let assembler = BatchAssembler::new(1, false);

        let batch = assembler
            .assemble(0, &mut registry, &mut sources, &mut capability)
            .unwrap();
        // Stream 1's allocation failed; streams 0 and 2 carry on.
        assert_eq!(batch.stream_indices(), vec![0, 2]);
        assert_eq!(registry.lifecycle(1), StreamLifecycle::Finished);
        assert_eq!(capability.releases, 0);
    }

    #[test]
    fn empty_source_finishes_without_state_or_flush() {
        let mut capability = ScriptedCapability::new(2);
        let (mut registry, mut sources) = setup(&[0, 2]);
        let assembler = BatchAssembler::new(2, false);

        let batch = assembler
            .assemble(0, &mut registry, &mut sources, &mut capability)
            .unwrap();
        assert_eq!(batch.stream_indices(), vec![1]);
        assert_eq!(registry.lifecycle(0), StreamLifecycle::Finished);
        assert!(!registry.has_state(0));
        assert_eq!(capability.allocations, 1);
    }

    #[test]
    fn zero_flush_window_releases_at_exhaustion() {
        let mut capability = ScriptedCapability::new(0);
        let (mut registry, mut sources) = setup(&[2]);
        let assembler = BatchAssembler::new(0, false);

        for tick in 0..2 {
            let batch = assembler
                .assemble(tick, &mut registry, &mut sources, &mut capability)
                .unwrap();
            assert_eq!(batch.len(), 1);
            assert_eq!(batch.slots[0].kind, SlotKind::Real);
        }
        let batch = assembler
            .assemble(2, &mut registry, &mut sources, &mut capability)
            .unwrap();
        assert!(batch.is_empty());
        assert_eq!(capability.releases, 1);
        assert_eq!(registry.lifecycle(0), StreamLifecycle::Finished);
    }

    #[test]
    fn source_error_drops_stream_and_releases_state() {
        struct FailingSource {
            reads: usize,
        }
        impl StreamSource for FailingSource {
            type Input = Vec<f32>;
            fn next_input_unit(&mut self) -> Result<Option<Vec<f32>>> {
                if self.reads == 0 {
                    self.reads += 1;
                    return Ok(Some(vec![1.0; 4]));
                }
                Err(Error::SourceRead {
                    stream: 0,
                    reason: "decoder gave up".into(),
                })
            }
        }

        let mut capability = ScriptedCapability::new(2);
        let mut registry = StreamRegistry::new(None);
        registry.register().unwrap();
        let mut sources: Vec<SourceSlot<Vec<f32>>> =
            vec![Some(Box::new(FailingSource { reads: 0 }))];
        let assembler = BatchAssembler::new(2, false);

        let batch = assembler
            .assemble(0, &mut registry, &mut sources, &mut capability)
            .unwrap();
        assert_eq!(batch.len(), 1);

        let batch = assembler
            .assemble(1, &mut registry, &mut sources, &mut capability)
            .unwrap();
        assert!(batch.is_empty());
        assert_eq!(registry.lifecycle(0), StreamLifecycle::Finished);
        assert_eq!(capability.releases, 1);
    }
}
