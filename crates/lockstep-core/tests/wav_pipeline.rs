//! End-to-end: WAV files in, batched loopback inference, WAV files out.

use std::path::Path;

use lockstep_core::loopback::LoopbackCapability;
use lockstep_core::media::wav::{output_path_for, WavChunkSource, WavSink};
use lockstep_core::orchestrator::{OrchestratorConfig, TickDriver};

const SAMPLE_RATE: u32 = 16000;
const SAMPLES_PER_TICK: usize = 8;

fn write_wav(path: &Path, ticks: usize, value: i16) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for _ in 0..ticks * SAMPLES_PER_TICK {
        writer.write_sample(value).unwrap();
    }
    writer.finalize().unwrap();
}

fn read_wav(path: &Path) -> Vec<f32> {
    let mut reader = hound::WavReader::open(path).unwrap();
    reader.samples::<f32>().map(|s| s.unwrap()).collect()
}

#[test]
fn two_wav_streams_of_different_length() {
    let dir = tempfile::tempdir().unwrap();
    let short = dir.path().join("short.wav");
    let long = dir.path().join("long.wav");
    write_wav(&short, 3, 8192);
    write_wav(&long, 6, -8192);

    let capability = LoopbackCapability::audio(2, 2, SAMPLES_PER_TICK);
    let mut driver = TickDriver::new(OrchestratorConfig::default(), capability);

    for input in [&short, &long] {
        let source = WavChunkSource::open(input, SAMPLES_PER_TICK).unwrap();
        assert_eq!(source.sample_rate(), SAMPLE_RATE);
        let sink = WavSink::create(output_path_for(input, "out"), SAMPLE_RATE).unwrap();
        driver
            .register_stream(Box::new(source), Box::new(sink))
            .unwrap();
    }

    let metrics = driver.run().unwrap();

    // Longest stream (6 ticks) plus the flush window bounds the run.
    assert_eq!(metrics.ticks, 8);
    assert_eq!(metrics.real_slots, 9);
    assert_eq!(metrics.padding_slots, 4);
    assert_eq!(metrics.outputs_written, 9);
    assert_eq!(metrics.streams_completed, 2);

    // Each output file holds exactly its own stream's samples.
    let short_out = read_wav(&output_path_for(&short, "out"));
    assert_eq!(short_out.len(), 3 * SAMPLES_PER_TICK);
    assert!(short_out.iter().all(|&s| s > 0.2));

    let long_out = read_wav(&output_path_for(&long, "out"));
    assert_eq!(long_out.len(), 6 * SAMPLES_PER_TICK);
    assert!(long_out.iter().all(|&s| s < -0.2));
}
