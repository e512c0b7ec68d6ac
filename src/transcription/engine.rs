use anyhow::Context;
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

/// Errors that can occur at the transcription boundary
#[derive(Debug, Error)]
pub enum TranscriptionError {
    /// Failed to load the Whisper model (fatal at startup)
    #[error("failed to load whisper model from {path}: {source}")]
    ModelLoad {
        /// Path to model file
        path: String,
        /// Underlying error
        source: anyhow::Error,
    },

    /// Failed to create Whisper inference state
    #[error("failed to create whisper state")]
    StateCreation,

    /// Inference failed
    #[error("failed to transcribe audio")]
    Transcription(#[from] anyhow::Error),
}

/// Speech-to-text boundary
///
/// Consumes a finalized utterance and returns plain text. Empty text means the
/// model heard silence; that is a normal result, not an error. A call may
/// block for seconds and always runs to completion once started.
#[cfg_attr(test, mockall::automock)]
pub trait Transcriber: Send + Sync {
    /// Transcribe target-rate mono samples to text
    ///
    /// # Errors
    /// Returns error if inference fails
    fn transcribe(&self, audio: &[f32]) -> Result<String, TranscriptionError>;
}

/// Whisper transcription engine
pub struct WhisperEngine {
    /// Whisper context; exclusive access per inference
    ctx: Arc<Mutex<WhisperContext>>,
    threads: i32,
    beam_size: i32,
    language: Option<String>,
}

impl WhisperEngine {
    /// Load the model from `model_path`
    ///
    /// # Errors
    /// Returns error if the model file is missing/invalid or the parameters
    /// are out of range
    pub fn new(
        model_path: &Path,
        threads: usize,
        beam_size: usize,
        language: Option<String>,
    ) -> Result<Self, TranscriptionError> {
        let invalid = |msg: String| TranscriptionError::ModelLoad {
            path: model_path.display().to_string(),
            source: anyhow::anyhow!(msg),
        };

        if threads == 0 {
            return Err(invalid("threads must be > 0".to_owned()));
        }
        if beam_size == 0 {
            return Err(invalid("beam_size must be > 0".to_owned()));
        }
        let threads_i32 = i32::try_from(threads)
            .map_err(|_| invalid(format!("threads value too large (max: {})", i32::MAX)))?;
        let beam_size_i32 = i32::try_from(beam_size)
            .map_err(|_| invalid(format!("beam_size value too large (max: {})", i32::MAX)))?;

        tracing::info!(
            path = %model_path.display(),
            threads,
            beam_size,
            language = ?language,
            "loading whisper model"
        );

        let path_str = model_path
            .to_str()
            .ok_or_else(|| invalid("model path contains invalid UTF-8".to_owned()))?;

        let params = WhisperContextParameters::default();
        let ctx = WhisperContext::new_with_params(path_str, params).map_err(|e| {
            TranscriptionError::ModelLoad {
                path: model_path.display().to_string(),
                source: anyhow::anyhow!("{e:?}"),
            }
        })?;

        tracing::info!("whisper model loaded");

        Ok(Self {
            ctx: Arc::new(Mutex::new(ctx)),
            threads: threads_i32,
            beam_size: beam_size_i32,
            language,
        })
    }

    /// Greedy decoding for beam width 1, beam search otherwise
    const fn sampling_strategy(beam_size: i32) -> SamplingStrategy {
        if beam_size > 1 {
            SamplingStrategy::BeamSearch {
                beam_size,
                patience: -1.0,
            }
        } else {
            SamplingStrategy::Greedy { best_of: 1 }
        }
    }
}

impl Transcriber for WhisperEngine {
    fn transcribe(&self, audio: &[f32]) -> Result<String, TranscriptionError> {
        let _span = tracing::debug_span!("transcription", samples = audio.len()).entered();

        let mut state = self
            .ctx
            .lock()
            .map_err(|e| anyhow::anyhow!("mutex poisoned: {e}"))?
            .create_state()
            .map_err(|_| TranscriptionError::StateCreation)?;

        let mut params = FullParams::new(Self::sampling_strategy(self.beam_size));
        params.set_n_threads(self.threads);
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        params.set_language(self.language.as_deref());
        params.set_translate(false);

        let start = std::time::Instant::now();
        state
            .full(params, audio)
            .context("whisper inference failed")?;
        let inference_duration = start.elapsed();

        let mut result = String::new();
        for segment in state.as_iter() {
            result.push_str(&segment.to_string());
        }
        let result = result.trim().to_owned();

        tracing::info!(
            segments = state.full_n_segments(),
            text_len = result.len(),
            inference_ms = inference_duration.as_millis(),
            "transcription completed"
        );

        Ok(result)
    }
}

// SAFETY: the WhisperContext sits behind Arc<Mutex<>>, every method takes the
// lock before touching it, and no other shared mutable state exists.
#[allow(unsafe_code)]
unsafe impl Send for WhisperEngine {}
#[allow(unsafe_code)]
unsafe impl Sync for WhisperEngine {}

#[cfg(test)]
#[allow(clippy::print_stderr)] // Test diagnostics
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn get_test_model_path() -> Option<PathBuf> {
        let home = std::env::var("HOME").ok()?;
        let path = PathBuf::from(home)
            .join(".whisper-typer")
            .join("models")
            .join("ggml-tiny.bin");

        path.exists().then_some(path)
    }

    #[test]
    fn test_model_load_nonexistent_path() {
        let nonexistent_path = Path::new("/tmp/nonexistent_model.bin");
        let result = WhisperEngine::new(nonexistent_path, 4, 5, None);

        assert!(matches!(result, Err(TranscriptionError::ModelLoad { .. })));
        if let Err(TranscriptionError::ModelLoad { path, .. }) = result {
            assert!(path.contains("nonexistent_model.bin"));
        }
    }

    #[test]
    fn test_new_with_zero_threads() {
        let result = WhisperEngine::new(Path::new("/tmp/dummy.bin"), 0, 5, None);
        assert!(matches!(result, Err(TranscriptionError::ModelLoad { .. })));
        if let Err(TranscriptionError::ModelLoad { source, .. }) = result {
            assert!(source.to_string().contains("threads must be > 0"));
        }
    }

    #[test]
    fn test_new_with_zero_beam_size() {
        let result = WhisperEngine::new(Path::new("/tmp/dummy.bin"), 4, 0, None);
        assert!(matches!(result, Err(TranscriptionError::ModelLoad { .. })));
        if let Err(TranscriptionError::ModelLoad { source, .. }) = result {
            assert!(source.to_string().contains("beam_size must be > 0"));
        }
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_new_with_oversized_threads() {
        let result =
            WhisperEngine::new(Path::new("/tmp/dummy.bin"), (i32::MAX as usize) + 1, 5, None);
        assert!(matches!(result, Err(TranscriptionError::ModelLoad { .. })));
        if let Err(TranscriptionError::ModelLoad { source, .. }) = result {
            assert!(source.to_string().contains("threads value too large"));
        }
    }

    #[test]
    fn test_sampling_strategy_greedy() {
        let strategy = WhisperEngine::sampling_strategy(1);
        assert!(matches!(strategy, SamplingStrategy::Greedy { best_of: 1 }));
    }

    #[test]
    fn test_sampling_strategy_beam_search() {
        let strategy = WhisperEngine::sampling_strategy(5);
        assert!(matches!(
            strategy,
            SamplingStrategy::BeamSearch {
                beam_size: 5,
                patience: -1.0
            }
        ));
    }

    #[test]
    fn test_sampling_strategy_boundary() {
        assert!(matches!(
            WhisperEngine::sampling_strategy(1),
            SamplingStrategy::Greedy { .. }
        ));
        assert!(matches!(
            WhisperEngine::sampling_strategy(2),
            SamplingStrategy::BeamSearch { .. }
        ));
    }

    #[test]
    fn test_engine_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<WhisperEngine>();
        assert_sync::<WhisperEngine>();
    }

    #[test]
    fn test_mock_transcriber() {
        let mut mock = MockTranscriber::new();
        mock.expect_transcribe()
            .returning(|_| Ok("hello world".to_owned()));

        let text = mock.transcribe(&[0.0; 16000]).unwrap();
        assert_eq!(text, "hello world");
    }

    #[test]
    #[ignore = "requires actual model file"]
    fn test_transcribe_silence() {
        let Some(model_path) = get_test_model_path() else {
            eprintln!("Skipping test: no model found at ~/.whisper-typer/models/ggml-tiny.bin");
            return;
        };

        let engine = WhisperEngine::new(&model_path, 4, 5, None).unwrap();

        // 1 second of silence (16 kHz)
        let silence: Vec<f32> = vec![0.0; 16000];
        let text = engine.transcribe(&silence).unwrap();

        assert!(
            text.is_empty() || text.len() < 50,
            "Expected empty or minimal output for silence, got: '{text}'"
        );
    }

    #[test]
    #[ignore = "requires actual model file"]
    fn test_multiple_transcriptions() {
        let Some(model_path) = get_test_model_path() else {
            eprintln!("Skipping test: no model found");
            return;
        };

        let engine = WhisperEngine::new(&model_path, 4, 5, None).unwrap();

        for _ in 0..3 {
            let silence: Vec<f32> = vec![0.0; 16000];
            assert!(engine.transcribe(&silence).is_ok());
        }
    }
}
