//! Lockstep CLI - drive batches of WAV streams through the orchestrator.
//!
//! `lockstep run` chunks each input WAV into per-tick units, pushes all
//! streams through the built-in loopback capability in lockstep, and
//! writes one output WAV per input. Useful for exercising the tick loop
//! and inspecting batch behavior without a remote inference server.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lockstep_core::loopback::LoopbackCapability;
use lockstep_core::media::wav::{output_path_for, WavChunkSource, WavSink};
use lockstep_core::orchestrator::{OrchestratorConfig, TickDriver};

#[derive(Parser)]
#[command(
    name = "lockstep",
    about = "Multi-stream batched-inference orchestrator",
    version,
    arg_required_else_help = true,
    propagate_version = true
)]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run WAV streams through the built-in loopback capability
    Run {
        /// Input WAV files, one stream each (mono, identical sample rates)
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Tag appended to each input file name for its output file
        #[arg(long, default_value = "out")]
        output_name_tag: String,

        /// Audio samples submitted per stream per tick
        /// (default: one 30 fps frame at 16 kHz)
        #[arg(long, default_value_t = 533)]
        samples_per_tick: usize,

        /// Priming window of the capability, in ticks
        #[arg(long, default_value_t = 2)]
        priming_ticks: u32,

        /// Flush window of the capability, in ticks
        #[arg(long, default_value_t = 2)]
        flush_ticks: u32,

        /// Maximum number of streams accepted
        #[arg(long)]
        max_streams: Option<usize>,

        /// Print the run metrics as JSON on stdout
        #[arg(long)]
        json: bool,
    },

    /// Inspect a WAV file: sample rate and tick count
    Probe {
        input: PathBuf,

        /// Audio samples per tick used for the tick count
        #[arg(long, default_value_t = 533)]
        samples_per_tick: usize,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "lockstep=debug,lockstep_core=debug"
    } else {
        "lockstep=info,lockstep_core=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Run {
            inputs,
            output_name_tag,
            samples_per_tick,
            priming_ticks,
            flush_ticks,
            max_streams,
            json,
        } => run(
            inputs,
            &output_name_tag,
            samples_per_tick,
            priming_ticks,
            flush_ticks,
            max_streams,
            json,
        ),
        Commands::Probe {
            input,
            samples_per_tick,
        } => probe(&input, samples_per_tick),
    }
}

fn run(
    inputs: Vec<PathBuf>,
    output_name_tag: &str,
    samples_per_tick: usize,
    priming_ticks: u32,
    flush_ticks: u32,
    max_streams: Option<usize>,
    json: bool,
) -> anyhow::Result<()> {
    let capability = LoopbackCapability::audio(priming_ticks, flush_ticks, samples_per_tick);
    let config = OrchestratorConfig {
        max_streams,
        ..Default::default()
    };
    let mut driver = TickDriver::new(config, capability);

    let mut sample_rate = None;
    for input in &inputs {
        let source = WavChunkSource::open(input, samples_per_tick)
            .with_context(|| format!("opening {}", input.display()))?;
        match sample_rate {
            None => sample_rate = Some(source.sample_rate()),
            Some(rate) if rate != source.sample_rate() => bail!(
                "{}: sample rate {} does not match the first stream's {}",
                input.display(),
                source.sample_rate(),
                rate
            ),
            Some(_) => {}
        }

        let output = output_path_for(input, output_name_tag);
        let sink = WavSink::create(&output, source.sample_rate())
            .with_context(|| format!("creating {}", output.display()))?;

        let stream = driver
            .register_stream(Box::new(source), Box::new(sink))
            .context("registering stream")?;
        info!(
            stream,
            input = %input.display(),
            output = %output.display(),
            "registered stream"
        );
    }

    let metrics = driver.run().context("orchestrated run failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&metrics)?);
    } else {
        info!(
            ticks = metrics.ticks,
            outputs = metrics.outputs_written,
            completed = metrics.streams_completed,
            dropped = metrics.streams_dropped,
            peak_batch = metrics.peak_batch_size,
            elapsed_secs = metrics.elapsed_secs,
            "run complete"
        );
    }
    Ok(())
}

fn probe(input: &Path, samples_per_tick: usize) -> anyhow::Result<()> {
    let source = WavChunkSource::open(input, samples_per_tick)
        .with_context(|| format!("opening {}", input.display()))?;
    println!(
        "{}: {} Hz, {} ticks of {} samples",
        input.display(),
        source.sample_rate(),
        source.ticks(),
        samples_per_tick
    );
    Ok(())
}
