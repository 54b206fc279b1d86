//! Tick driver: the assemble -> infer -> distribute loop.
//!
//! One `TickDriver` owns one run. Each tick it asks the assembler for a
//! batch, hands the batch plus the contributing streams' state handles to
//! the capability in a single blocking call, then routes every ready
//! output to the sink of the stream it came from. Routing is keyed by
//! stream index, never by batch slot: slot membership changes every tick
//! as streams finish, and collapsing that distinction is the one bug this
//! design exists to prevent.

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::orchestrator::assembler::{drop_stream, BatchAssembler, SourceSlot};
use crate::orchestrator::capability::{InferenceCapability, OutputSink, StreamSource};
use crate::orchestrator::config::OrchestratorConfig;
use crate::orchestrator::metrics::RunMetrics;
use crate::orchestrator::registry::StreamRegistry;
use crate::orchestrator::types::{RunState, StreamIndex, Tick};

/// Boxed sink slot; `None` once the stream no longer produces output.
type SinkSlot<O> = Option<Box<dyn OutputSink<Output = O>>>;

/// Drives a set of independently-progressing streams through a batched,
/// stateful inference capability, one tick at a time.
pub struct TickDriver<C: InferenceCapability> {
    capability: C,
    registry: StreamRegistry<C::State>,
    assembler: BatchAssembler,
    sources: Vec<SourceSlot<C::Input>>,
    sinks: Vec<SinkSlot<C::Output>>,
    priming_window: u32,
    tick: Tick,
    state: RunState,
    metrics: RunMetrics,
}

impl<C: InferenceCapability> TickDriver<C> {
    /// Create a driver around a capability. The flush and priming windows
    /// are queried here, once, not per stream.
    pub fn new(config: OrchestratorConfig, capability: C) -> Self {
        let flush_window = capability.flush_window_ticks();
        let priming_window = capability.priming_window_ticks();
        info!(
            flush_window,
            priming_window, "created tick driver"
        );
        Self {
            registry: StreamRegistry::new(config.max_streams),
            assembler: BatchAssembler::new(flush_window, config.trace_batches),
            capability,
            sources: Vec::new(),
            sinks: Vec::new(),
            priming_window,
            tick: 0,
            state: RunState::Setup,
            metrics: RunMetrics::new(0),
        }
    }

    /// Register one stream: an input source paired with the sink its
    /// outputs will be written to. Only valid before the run starts.
    pub fn register_stream(
        &mut self,
        source: Box<dyn StreamSource<Input = C::Input>>,
        sink: Box<dyn OutputSink<Output = C::Output>>,
    ) -> Result<StreamIndex> {
        if self.state != RunState::Setup {
            return Err(Error::InvalidInput(
                "streams must be registered before the run starts".into(),
            ));
        }
        let index = self.registry.register()?;
        self.sources.push(Some(source));
        self.sinks.push(Some(sink));
        self.metrics.streams_registered = self.registry.len();
        Ok(index)
    }

    pub fn run_state(&self) -> RunState {
        self.state
    }

    /// Current tick counter (the next tick to execute).
    pub fn tick(&self) -> Tick {
        self.tick
    }

    pub fn priming_window_ticks(&self) -> u32 {
        self.priming_window
    }

    pub fn flush_window_ticks(&self) -> u32 {
        self.assembler.flush_window()
    }

    pub fn metrics(&self) -> &RunMetrics {
        &self.metrics
    }

    pub fn capability(&self) -> &C {
        &self.capability
    }

    /// Execute one tick. Returns `false` when the assembled batch was
    /// empty, which ends the run.
    pub fn step(&mut self) -> Result<bool> {
        if self.state == RunState::Done {
            return Ok(false);
        }
        if self.state == RunState::Setup {
            self.state = RunState::Running;
            self.metrics = RunMetrics::new(self.registry.len());
        }

        let batch = self.assembler.assemble(
            self.tick,
            &mut self.registry,
            &mut self.sources,
            &mut self.capability,
        )?;

        if batch.is_empty() {
            self.finish_run();
            return Ok(false);
        }
        self.metrics.record_batch(&batch);

        // Invoke the capability once with the full batch. State handles
        // are gathered in slot order; any error here is fatal to the run
        // because a batched, stateful failure cannot be pinned on one
        // stream.
        let stream_order = batch.stream_indices();
        let mut states = self.registry.states_in_slot_order(&stream_order);
        if states.len() != batch.len() {
            return Err(Error::InferenceFailure {
                tick: self.tick,
                reason: "state handle missing for a batched stream".into(),
            });
        }
        let outputs = self.capability.run(&batch, &mut states)?;
        if outputs.len() != batch.len() {
            return Err(Error::InferenceFailure {
                tick: self.tick,
                reason: format!(
                    "capability returned {} outputs for a batch of {}",
                    outputs.len(),
                    batch.len()
                ),
            });
        }

        // Distribute ready outputs, keyed by stream index.
        for (slot, output) in batch.slots.iter().zip(outputs) {
            let Some(output) = output else {
                continue;
            };
            self.registry.record_output_ready(slot.stream);
            let Some(sink) = self.sinks[slot.stream].as_mut() else {
                continue;
            };
            if let Err(e) = sink.write(output) {
                warn!(
                    stream = slot.stream,
                    tick = self.tick,
                    error = %e,
                    "dropping stream: sink write failed"
                );
                drop_stream(slot.stream, &mut self.registry, &mut self.capability);
                self.sources[slot.stream] = None;
                self.sinks[slot.stream] = None;
                continue;
            }
            self.metrics.record_output();
        }

        // Retire streams whose flush window ended with this tick: their
        // released state has now been consumed by its final inference.
        for slot in &batch.slots {
            if slot.last_contribution && self.registry.has_state(slot.stream) {
                self.registry.retire(slot.stream);
                self.sources[slot.stream] = None;
                self.sinks[slot.stream] = None;
            }
        }

        self.tick += 1;
        Ok(true)
    }

    /// Run the tick loop to completion and return the final metrics.
    pub fn run(&mut self) -> Result<RunMetrics> {
        while self.step()? {}
        Ok(self.metrics.clone())
    }

    fn finish_run(&mut self) {
        self.state = RunState::Done;
        let dropped = self.registry.dropped_count();
        let completed = self.registry.finished_count().saturating_sub(dropped);
        self.metrics.finish(completed, dropped);
        info!(
            ticks = self.metrics.ticks,
            outputs = self.metrics.outputs_written,
            completed,
            dropped,
            "run finished"
        );
    }
}
