//! Chunked WAV file source and sink.
//!
//! `WavChunkSource` slices a mono WAV file into fixed-size per-tick
//! chunks, zero-padding the final partial chunk so every tick carries the
//! same number of samples. `WavSink` appends ready output chunks to a
//! float WAV file. Between them they cover the file-in, file-out role the
//! batch clients play around the orchestrator.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};
use crate::media::AudioChunk;
use crate::orchestrator::{OutputSink, StreamSource};

/// Fixed-chunk reader over a mono WAV file.
pub struct WavChunkSource {
    samples: Vec<f32>,
    position: usize,
    samples_per_tick: usize,
    sample_rate: u32,
}

impl WavChunkSource {
    /// Load a mono WAV file and prepare to serve `samples_per_tick`
    /// samples per tick. Integer formats are normalized to [-1, 1].
    pub fn open(path: impl AsRef<Path>, samples_per_tick: usize) -> Result<Self> {
        let path = path.as_ref();
        if samples_per_tick == 0 {
            return Err(Error::InvalidInput("samples_per_tick must be > 0".into()));
        }
        let mut reader = hound::WavReader::open(path)?;
        let spec = reader.spec();
        if spec.channels != 1 {
            return Err(Error::InvalidInput(format!(
                "{} has {} channels; only mono input is supported",
                path.display(),
                spec.channels
            )));
        }

        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Int => {
                let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .collect::<std::result::Result<Vec<_>, _>>()?
                    .into_iter()
                    .map(|s| s as f32 / max_val)
                    .collect()
            }
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<std::result::Result<Vec<_>, _>>()?,
        };

        debug!(
            path = %path.display(),
            samples = samples.len(),
            sample_rate = spec.sample_rate,
            samples_per_tick,
            "opened wav source"
        );
        Ok(Self {
            samples,
            position: 0,
            samples_per_tick,
            sample_rate: spec.sample_rate,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of ticks this source will produce.
    pub fn ticks(&self) -> usize {
        self.samples.len().div_ceil(self.samples_per_tick)
    }
}

impl StreamSource for WavChunkSource {
    type Input = AudioChunk;

    fn next_input_unit(&mut self) -> Result<Option<AudioChunk>> {
        if self.position >= self.samples.len() {
            return Ok(None);
        }
        let end = (self.position + self.samples_per_tick).min(self.samples.len());
        let mut chunk = self.samples[self.position..end].to_vec();
        // The tail chunk is zero-padded to the fixed tick size.
        chunk.resize(self.samples_per_tick, 0.0);
        self.position = end;
        Ok(Some(chunk))
    }
}

/// Float-WAV writer for ready output chunks.
pub struct WavSink {
    writer: hound::WavWriter<std::io::BufWriter<std::fs::File>>,
    path: PathBuf,
}

impl WavSink {
    pub fn create(path: impl AsRef<Path>, sample_rate: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let writer = hound::WavWriter::create(&path, spec)?;
        debug!(path = %path.display(), sample_rate, "created wav sink");
        Ok(Self { writer, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush the header and close the file. Also happens implicitly on
    /// drop, but dropping swallows I/O errors.
    pub fn finalize(self) -> Result<()> {
        self.writer.finalize()?;
        Ok(())
    }
}

impl OutputSink for WavSink {
    type Output = AudioChunk;

    fn write(&mut self, output: AudioChunk) -> Result<()> {
        for sample in output {
            self.writer.write_sample(sample)?;
        }
        Ok(())
    }
}

/// Output path derived from an input file: `<stem>_<tag>.wav` next to the
/// input, the naming scheme batch clients use for per-stream results.
pub fn output_path_for(input: &Path, tag: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    input.with_file_name(format!("{stem}_{tag}.wav"))
}
