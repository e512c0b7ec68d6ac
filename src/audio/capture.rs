use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use hound::{WavSpec, WavWriter};
use ringbuf::{
    traits::{Consumer, Producer, Split},
    HeapCons, HeapRb,
};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::audio::UtteranceBuffer;
use crate::config::AudioConfig;

/// Capture failures; all of them abort the current utterance only
#[derive(Debug, Error)]
pub enum CaptureError {
    /// No input device present on the host
    #[error("no input device available")]
    NoDevice,

    /// Configured device index does not exist
    #[error("input device index {index} not found")]
    DeviceIndex {
        /// Index requested in configuration
        index: usize,
    },

    /// Device disappeared or errored mid-capture
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Stream could not be built or controlled
    #[error("audio stream failure: {0}")]
    Stream(String),
}

/// One push-to-talk capture source
///
/// `begin` opens the microphone, `append` drains frames that arrived since the
/// last call, `end` closes the stream and hands back the finalized buffer.
/// The controller drives the lifecycle; implementations only own the device.
pub trait CaptureControl {
    /// Start accumulating a new utterance
    ///
    /// # Errors
    /// Returns error if the device cannot be activated
    fn begin(&mut self) -> Result<(), CaptureError>;

    /// Move newly available frames into the active utterance
    ///
    /// # Errors
    /// Returns error if the device failed since the last call
    fn append(&mut self) -> Result<(), CaptureError>;

    /// Stop capturing and return the finalized buffer
    ///
    /// # Errors
    /// Returns error if the device failed or cannot be deactivated
    fn end(&mut self) -> Result<UtteranceBuffer, CaptureError>;

    /// Time since `begin`; zero when no capture is active
    fn elapsed(&self) -> Duration;
}

/// Audio stream lifecycle control
trait StreamControl {
    /// Resume the stream (activate microphone)
    fn play(&self) -> Result<(), CaptureError>;
    /// Pause the stream (deactivate microphone)
    fn pause(&self) -> Result<(), CaptureError>;
}

struct CpalStreamControl {
    stream: cpal::Stream,
}

impl StreamControl for CpalStreamControl {
    fn play(&self) -> Result<(), CaptureError> {
        self.stream
            .play()
            .map_err(|e| CaptureError::Stream(format!("failed to resume stream: {e}")))
    }

    fn pause(&self) -> Result<(), CaptureError> {
        self.stream
            .pause()
            .map_err(|e| CaptureError::Stream(format!("failed to pause stream: {e}")))
    }
}

/// Microphone capture via cpal with a lock-free ring buffer
///
/// The cpal callback thread pushes device-rate frames into the ring buffer
/// while the recording flag is set; `append` drains them on the control loop's
/// tick. Frames are downmixed and resampled to the target rate on `end`.
pub struct CaptureSession {
    // Kept alive so the stream is not dropped
    stream_control: Option<Box<dyn StreamControl>>,
    ring_buffer_consumer: HeapCons<f32>,
    is_recording: Arc<AtomicBool>,
    stream_failed: Arc<AtomicBool>,
    device_sample_rate: u32,
    device_channels: u16,
    target_sample_rate: u32,
    /// Raw device-rate samples accumulated for the active utterance
    pending: Vec<f32>,
    started_at: Option<Instant>,
}

impl CaptureSession {
    /// Open the configured input device and build a paused capture stream
    ///
    /// # Errors
    /// Returns error if the device is missing or the stream cannot be built
    pub fn new(config: &AudioConfig) -> Result<Self, CaptureError> {
        info!("initializing audio capture");

        let host = cpal::default_host();
        let device = match config.device_index {
            Some(index) => host
                .input_devices()
                .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?
                .nth(index)
                .ok_or(CaptureError::DeviceIndex { index })?,
            None => host.default_input_device().ok_or(CaptureError::NoDevice)?,
        };

        let device_name = device.name().unwrap_or_else(|_| "unknown".to_owned());
        info!("using input device: {}", device_name);

        // Capture at the device's native config; conversion happens at end()
        let supported_config = device
            .default_input_config()
            .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;

        let device_sample_rate = supported_config.sample_rate();
        let device_channels = supported_config.channels();

        info!(
            "device config: {} Hz, {} channels",
            device_sample_rate, device_channels
        );

        // Size the ring buffer for a full maximum-length utterance plus a
        // second of slack so the tick-driven drain never drops frames
        let ring_buffer_capacity = (device_sample_rate as usize)
            * (device_channels as usize)
            * (config.max_utterance_secs as usize + 1);
        debug!(
            capacity = ring_buffer_capacity,
            "allocating capture ring buffer"
        );
        let ring_buffer = HeapRb::<f32>::new(ring_buffer_capacity);
        let (ring_buffer_producer, ring_buffer_consumer) = ring_buffer.split();

        let is_recording = Arc::new(AtomicBool::new(false));
        let stream_failed = Arc::new(AtomicBool::new(false));

        let is_recording_cb = Arc::clone(&is_recording);
        let stream_failed_cb = Arc::clone(&stream_failed);
        let mut producer = ring_buffer_producer;

        let stream_config = supported_config.into();
        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if is_recording_cb.load(Ordering::Relaxed) {
                        let pushed = producer.push_slice(data);
                        if pushed < data.len() {
                            warn!("ring buffer full, dropped {} samples", data.len() - pushed);
                        }
                    }
                },
                move |err| {
                    warn!("audio stream error: {}", err);
                    stream_failed_cb.store(true, Ordering::Relaxed);
                },
                None,
            )
            .map_err(|e| CaptureError::Stream(format!("failed to build input stream: {e}")))?;

        let stream_control = CpalStreamControl { stream };

        // Start and immediately pause: the mic stays inactive until a press
        stream_control.play()?;
        stream_control.pause()?;
        info!("audio stream initialized (paused)");

        Ok(Self {
            stream_control: Some(Box::new(stream_control)),
            ring_buffer_consumer,
            is_recording,
            stream_failed,
            device_sample_rate,
            device_channels,
            target_sample_rate: config.sample_rate,
            pending: Vec::new(),
            started_at: None,
        })
    }

    fn check_stream_health(&self) -> Result<(), CaptureError> {
        if self.stream_failed.load(Ordering::Relaxed) {
            return Err(CaptureError::DeviceUnavailable(
                "stream reported an error during capture".to_owned(),
            ));
        }
        Ok(())
    }

    fn drain_ring_buffer(&mut self) {
        while let Some(sample) = self.ring_buffer_consumer.try_pop() {
            self.pending.push(sample);
        }
    }

    /// Downmix to mono and linearly resample to the target rate
    fn downmix_and_resample(&self, samples: &[f32]) -> Vec<f32> {
        let mono = downmix_to_mono(samples, self.device_channels);
        resample_linear(&mono, self.device_sample_rate, self.target_sample_rate)
    }

    /// Save samples to a WAV file for inspection (diagnostics only)
    ///
    /// # Errors
    /// Returns error if directory creation or the file write fails
    pub fn save_wav(samples: &[f32], sample_rate: u32, path: &Path) -> anyhow::Result<()> {
        use anyhow::Context;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("failed to create output directory")?;
        }

        let spec = WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };

        let mut writer = WavWriter::create(path, spec).context("failed to create WAV file")?;
        for &sample in samples {
            writer
                .write_sample(sample)
                .context("failed to write sample")?;
        }
        writer.finalize().context("failed to finalize WAV file")?;

        info!("saved WAV file: {:?} ({} samples)", path, samples.len());
        Ok(())
    }
}

impl CaptureControl for CaptureSession {
    fn begin(&mut self) -> Result<(), CaptureError> {
        debug!("capture begin");

        // Discard anything left over from a previous or aborted utterance
        self.ring_buffer_consumer.clear();
        self.pending.clear();
        self.stream_failed.store(false, Ordering::Relaxed);

        // Flag first, then resume, so the callback never misses early frames
        self.is_recording.store(true, Ordering::Relaxed);
        if let Some(stream_control) = &self.stream_control {
            stream_control.play()?;
        }

        self.started_at = Some(Instant::now());
        info!("recording started");
        Ok(())
    }

    fn append(&mut self) -> Result<(), CaptureError> {
        self.check_stream_health()?;
        self.drain_ring_buffer();
        Ok(())
    }

    fn end(&mut self) -> Result<UtteranceBuffer, CaptureError> {
        debug!("capture end");

        self.is_recording.store(false, Ordering::Relaxed);
        self.started_at = None;

        if let Some(stream_control) = &self.stream_control {
            stream_control.pause()?;
        }

        self.check_stream_health()?;
        self.drain_ring_buffer();

        let raw = std::mem::take(&mut self.pending);
        let converted = self.downmix_and_resample(&raw);
        let buffer = UtteranceBuffer::new(converted, self.target_sample_rate);

        info!(
            raw_samples = raw.len(),
            samples = buffer.len(),
            duration_ms = buffer.duration().as_millis(),
            "recording finished"
        );

        Ok(buffer)
    }

    fn elapsed(&self) -> Duration {
        self.started_at.map_or(Duration::ZERO, |t| t.elapsed())
    }
}

/// Average interleaved channels down to mono
fn downmix_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let channels_f64 = f64::from(channels);
    samples
        .chunks(channels as usize)
        .map(|frame| {
            let sum: f64 = frame.iter().map(|&s| f64::from(s)).sum();
            // f64 -> f32: samples are stored as f32, precision sufficient
            #[allow(clippy::cast_possible_truncation)]
            {
                (sum / channels_f64) as f32
            }
        })
        .collect()
}

/// Linear-interpolation resampler; adequate for speech fed to Whisper
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = f64::from(from_rate) / f64::from(to_rate);
    let output_len = ((samples.len() as f64) / ratio).ceil() as usize;

    let mut resampled = Vec::with_capacity(output_len);
    for i in 0..output_len {
        let src_idx = (i as f64) * ratio;
        let floor = (src_idx.floor() as usize).min(samples.len() - 1);
        let ceil = (floor + 1).min(samples.len() - 1);
        let fract = src_idx - src_idx.floor();

        let s1 = f64::from(samples[floor]);
        let s2 = f64::from(samples[ceil]);
        resampled.push(s1.mul_add(1.0 - fract, s2 * fract) as f32);
    }

    debug!(
        from_rate,
        to_rate,
        input_samples = samples.len(),
        output_samples = resampled.len(),
        "resampled"
    );

    resampled
}
