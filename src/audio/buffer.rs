use std::time::Duration;

/// One utterance worth of captured audio, finalized and immutable
///
/// Holds mono samples at the pipeline's target sample rate. Created by the
/// capture session when recording ends and moved by value into the
/// transcription stage; nothing retains it afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct UtteranceBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl UtteranceBuffer {
    #[must_use]
    pub const fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Audio duration represented by the buffer
    #[must_use]
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }

    #[must_use]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Consume the buffer, handing the samples to the model
    #[must_use]
    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }
}
