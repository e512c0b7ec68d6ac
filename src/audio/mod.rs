/// Finalized per-utterance sample buffer
pub mod buffer;
/// Microphone capture session
pub mod capture;

pub use buffer::UtteranceBuffer;
pub use capture::{CaptureControl, CaptureError, CaptureSession};
