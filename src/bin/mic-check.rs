//! Microphone diagnostic: list input devices and record a short smoke-test
//! sample to a WAV file for human inspection.
//!
//! Usage: `mic-check [device_index] [seconds]`
//!
//! This is a standalone diagnostic, not part of the dictation pipeline; the
//! WAV it writes is an ad hoc artifact for listening back.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let device_index: Option<usize> = match args.next() {
        Some(raw) => Some(raw.parse().context("device_index must be a number")?),
        None => None,
    };
    let seconds: u64 = match args.next() {
        Some(raw) => raw.parse().context("seconds must be a number")?,
        None => 3,
    };

    let host = cpal::default_host();
    let devices: Vec<_> = host
        .input_devices()
        .context("failed to enumerate input devices")?
        .collect();

    if devices.is_empty() {
        anyhow::bail!("no input devices available");
    }

    println!("Available input devices:");
    for (i, device) in devices.iter().enumerate() {
        let name = device.name().unwrap_or_else(|_| "unknown".to_owned());
        match device.default_input_config() {
            Ok(config) => println!(
                "{}: {} ({} Hz, {} channels, {:?})",
                i,
                name,
                config.sample_rate(),
                config.channels(),
                config.sample_format()
            ),
            Err(e) => println!("{i}: {name} (no default config: {e})"),
        }
    }

    let device = match device_index {
        Some(index) => devices
            .get(index)
            .with_context(|| format!("device index {index} out of range"))?,
        None => &devices[0],
    };
    let device_name = device.name().unwrap_or_else(|_| "unknown".to_owned());

    let supported_config = device
        .default_input_config()
        .context("failed to get default input config")?;
    let sample_rate = supported_config.sample_rate();
    let channels = supported_config.channels();

    println!("\nRecording {seconds}s from \"{device_name}\"...");

    let captured: Arc<Mutex<Vec<f32>>> = Arc::new(Mutex::new(Vec::new()));
    let captured_cb = Arc::clone(&captured);

    let stream = device
        .build_input_stream(
            &supported_config.into(),
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                captured_cb
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .extend_from_slice(data);
            },
            |err| eprintln!("stream error: {err}"),
            None,
        )
        .context("failed to build input stream")?;

    stream.play().context("failed to start stream")?;
    thread::sleep(Duration::from_secs(seconds));
    drop(stream);

    let samples = std::mem::take(
        &mut *captured.lock().unwrap_or_else(PoisonError::into_inner),
    );
    println!("Captured {} samples", samples.len());

    let peak = samples.iter().fold(0.0_f32, |max, &s| max.max(s.abs()));
    if peak < 0.001 {
        println!("WARNING: signal is near-silent, check that the mic is not muted");
    } else {
        println!("Peak level: {peak:.3}");
    }

    let out_path = Path::new("mic-check.wav");
    write_wav(&samples, sample_rate, channels, out_path)?;
    println!("Wrote {} - listen back to verify the device", out_path.display());

    Ok(())
}

fn write_wav(samples: &[f32], sample_rate: u32, channels: u16, path: &Path) -> Result<()> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };

    let mut writer = hound::WavWriter::create(path, spec).context("failed to create WAV file")?;
    for &sample in samples {
        writer
            .write_sample(sample)
            .context("failed to write sample")?;
    }
    writer.finalize().context("failed to finalize WAV file")?;

    Ok(())
}
