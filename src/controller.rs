use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::audio::{CaptureControl, UtteranceBuffer};
use crate::input::{EdgeSource, HotkeyEdge, TextInjector};
use crate::session::{SessionHandle, SessionState};
use crate::transcription::Transcriber;

/// Edge/tick poll interval for the control loop
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Per-utterance duration limits from configuration
#[derive(Debug, Clone, Copy)]
pub struct UtteranceLimits {
    /// Force-end a capture at this duration even if the key stays held
    pub max_capture: Duration,
    /// Buffers below this never reach the model
    pub min_utterance: Duration,
}

/// What became of one utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UtteranceOutcome {
    /// Transcript typed into the focused window
    Injected(String),
    /// Buffer below the minimum duration; the model was never invoked
    TooShort,
    /// The model heard silence; nothing injected
    Silence,
    /// Inference failed; utterance lost
    TranscriptionFailed,
    /// Keystroke injection failed; utterance lost
    InjectionFailed,
}

/// Run one finalized buffer through transcription and injection
///
/// Every failure is absorbed here: a bad utterance is logged and dropped, the
/// control loop keeps serving the next press.
pub fn process_utterance<T, I>(
    buffer: UtteranceBuffer,
    min_utterance: Duration,
    transcriber: &T,
    injector: &mut I,
) -> UtteranceOutcome
where
    T: Transcriber + ?Sized,
    I: TextInjector + ?Sized,
{
    let duration = buffer.duration();
    if buffer.is_empty() || duration < min_utterance {
        info!(
            duration_ms = duration.as_millis(),
            min_ms = min_utterance.as_millis(),
            "utterance below minimum duration, no speech assumed"
        );
        return UtteranceOutcome::TooShort;
    }

    let text = match transcriber.transcribe(buffer.samples()) {
        Ok(text) => text,
        Err(e) => {
            error!(error = %e, "transcription failed, utterance dropped");
            return UtteranceOutcome::TranscriptionFailed;
        }
    };

    if text.is_empty() {
        info!("silence detected, nothing to inject");
        return UtteranceOutcome::Silence;
    }

    match injector.inject(&text) {
        Ok(()) => {
            info!(chars = text.chars().count(), "utterance typed");
            UtteranceOutcome::Injected(text)
        }
        Err(e) => {
            error!(error = %e, "injection failed, utterance lost");
            UtteranceOutcome::InjectionFailed
        }
    }
}

/// Pipeline task: pulls finalized buffers and runs them sequentially
///
/// Exits when the capture side drops its sender, after draining whatever is
/// still in flight - this is what makes shutdown complete the current
/// utterance instead of truncating it.
async fn run_pipeline<T, I>(
    mut rx: mpsc::Receiver<UtteranceBuffer>,
    session: SessionHandle,
    transcriber: Arc<T>,
    injector: I,
    min_utterance: Duration,
) where
    T: Transcriber + 'static,
    I: TextInjector + 'static,
{
    let mut injector = injector;

    while let Some(buffer) = rx.recv().await {
        let transcriber = Arc::clone(&transcriber);
        let mut moved_injector = injector;

        // Inference blocks for seconds; keep it off the runtime threads
        let handle = tokio::task::spawn_blocking(move || {
            let outcome =
                process_utterance(buffer, min_utterance, transcriber.as_ref(), &mut moved_injector);
            (outcome, moved_injector)
        });

        match handle.await {
            Ok((outcome, returned_injector)) => {
                injector = returned_injector;
                debug!(?outcome, "utterance processed");
            }
            Err(e) => {
                error!(error = %e, "pipeline task failed");
                if let Err(e) = session.finish_utterance() {
                    warn!(error = %e, "session out of sync after pipeline failure");
                }
                return;
            }
        }

        if let Err(e) = session.finish_utterance() {
            warn!(error = %e, "session out of sync after utterance");
        }
    }

    debug!("pipeline drained, exiting");
}

/// Lifecycle controller: push-to-talk loop plus sequential pipeline
///
/// One foreground loop polls hotkey edges, pumps capture frames while the key
/// is held, and enforces the maximum capture duration. Finalized buffers cross
/// a bounded channel to the pipeline task; the session handle keeps the two
/// sides agreeing that at most one utterance is ever in flight.
pub struct Controller<E, C> {
    edges: E,
    capture: C,
    session: SessionHandle,
    limits: UtteranceLimits,
}

impl<E, C> Controller<E, C>
where
    E: EdgeSource,
    C: CaptureControl,
{
    #[must_use]
    pub const fn new(edges: E, capture: C, session: SessionHandle, limits: UtteranceLimits) -> Self {
        Self {
            edges,
            capture,
            session,
            limits,
        }
    }

    /// Run until shutdown is requested and any in-flight utterance completes
    ///
    /// # Errors
    /// Currently infallible at runtime; per-utterance failures are logged and
    /// absorbed. The Result stays for parity with the startup path.
    pub async fn run<T, I>(mut self, transcriber: Arc<T>, injector: I) -> anyhow::Result<()>
    where
        T: Transcriber + 'static,
        I: TextInjector + 'static,
    {
        // Capacity 1: the state machine already guarantees a single in-flight
        // utterance, the bound just keeps that honest
        let (tx, rx) = mpsc::channel::<UtteranceBuffer>(1);

        let pipeline = tokio::spawn(run_pipeline(
            rx,
            self.session.clone(),
            transcriber,
            injector,
            self.limits.min_utterance,
        ));

        let mut tick = tokio::time::interval(POLL_INTERVAL);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!("push-to-talk loop running");

        loop {
            tick.tick().await;

            while let Some(edge) = self.edges.try_next() {
                match edge {
                    HotkeyEdge::Pressed => self.on_press(),
                    HotkeyEdge::Released => self.on_release(&tx).await,
                }
            }

            if self.session.state() == SessionState::Recording {
                self.pump_capture(&tx).await;
            }

            // Shutdown only from Idle: an in-flight utterance always finishes
            if self.session.is_stopping() && self.session.is_idle() {
                info!("shutdown requested, loop idle, exiting");
                break;
            }
        }

        // Closing the channel lets the pipeline drain and stop
        drop(tx);
        if let Err(e) = pipeline.await {
            warn!(error = %e, "pipeline task did not exit cleanly");
        }

        Ok(())
    }

    fn on_press(&mut self) {
        if self.session.is_stopping() {
            debug!("press ignored, shutting down");
            return;
        }
        if !self.session.try_begin_recording() {
            return;
        }
        if let Err(e) = self.capture.begin() {
            warn!(error = %e, "failed to start capture");
            if let Err(e) = self.session.abort_recording() {
                warn!(error = %e, "session out of sync after capture failure");
            }
        }
    }

    async fn on_release(&mut self, tx: &mpsc::Sender<UtteranceBuffer>) {
        // A release in any other state (after a timeout force-end, or a
        // stray release while idle) is a no-op
        if self.session.state() == SessionState::Recording {
            self.finish_capture(tx).await;
        } else {
            debug!("release ignored, not recording");
        }
    }

    /// Pump frames into the active utterance; force-end at the limit
    async fn pump_capture(&mut self, tx: &mpsc::Sender<UtteranceBuffer>) {
        if let Err(e) = self.capture.append() {
            warn!(error = %e, "capture failed, dropping utterance");
            if let Err(e) = self.session.abort_recording() {
                warn!(error = %e, "session out of sync after capture failure");
            }
            return;
        }

        if self.capture.elapsed() >= self.limits.max_capture {
            info!(
                limit_secs = self.limits.max_capture.as_secs(),
                "maximum capture duration reached, force-ending"
            );
            self.finish_capture(tx).await;
        }
    }

    async fn finish_capture(&mut self, tx: &mpsc::Sender<UtteranceBuffer>) {
        match self.capture.end() {
            Ok(buffer) => {
                if let Err(e) = self.session.begin_transcribing() {
                    warn!(error = %e, "session out of sync at capture end");
                    return;
                }
                if tx.send(buffer).await.is_err() {
                    error!("pipeline task gone, dropping utterance");
                    if let Err(e) = self.session.finish_utterance() {
                        warn!(error = %e, "session out of sync after dropped utterance");
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "capture failed at end, utterance dropped");
                if let Err(e) = self.session.abort_recording() {
                    warn!(error = %e, "session out of sync after capture failure");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::inject::MockTextInjector;
    use crate::transcription::engine::MockTranscriber;

    fn buffer_with_duration(ms: u64) -> UtteranceBuffer {
        let samples = (16000 * ms / 1000) as usize;
        UtteranceBuffer::new(vec![0.01; samples], 16000)
    }

    #[test]
    fn test_short_buffer_never_reaches_model() {
        let mut transcriber = MockTranscriber::new();
        transcriber.expect_transcribe().times(0);
        let mut injector = MockTextInjector::new();
        injector.expect_inject().times(0);

        let outcome = process_utterance(
            buffer_with_duration(100),
            Duration::from_millis(300),
            &transcriber,
            &mut injector,
        );

        assert_eq!(outcome, UtteranceOutcome::TooShort);
    }

    #[test]
    fn test_empty_buffer_never_reaches_model() {
        let mut transcriber = MockTranscriber::new();
        transcriber.expect_transcribe().times(0);
        let mut injector = MockTextInjector::new();
        injector.expect_inject().times(0);

        let outcome = process_utterance(
            UtteranceBuffer::new(Vec::new(), 16000),
            Duration::ZERO,
            &transcriber,
            &mut injector,
        );

        assert_eq!(outcome, UtteranceOutcome::TooShort);
    }

    #[test]
    fn test_silence_suppresses_injection() {
        let mut transcriber = MockTranscriber::new();
        transcriber
            .expect_transcribe()
            .times(1)
            .returning(|_| Ok(String::new()));
        let mut injector = MockTextInjector::new();
        injector.expect_inject().times(0);

        let outcome = process_utterance(
            buffer_with_duration(1000),
            Duration::from_millis(300),
            &transcriber,
            &mut injector,
        );

        assert_eq!(outcome, UtteranceOutcome::Silence);
    }

    #[test]
    fn test_transcript_is_injected_exactly_once() {
        let mut transcriber = MockTranscriber::new();
        transcriber
            .expect_transcribe()
            .times(1)
            .returning(|_| Ok("hello world".to_owned()));
        let mut injector = MockTextInjector::new();
        injector
            .expect_inject()
            .withf(|text| text == "hello world")
            .times(1)
            .returning(|_| Ok(()));

        let outcome = process_utterance(
            buffer_with_duration(1200),
            Duration::from_millis(300),
            &transcriber,
            &mut injector,
        );

        assert_eq!(outcome, UtteranceOutcome::Injected("hello world".to_owned()));
    }

    #[test]
    fn test_transcription_failure_is_absorbed() {
        let mut transcriber = MockTranscriber::new();
        transcriber
            .expect_transcribe()
            .times(1)
            .returning(|_| Err(crate::transcription::TranscriptionError::StateCreation));
        let mut injector = MockTextInjector::new();
        injector.expect_inject().times(0);

        let outcome = process_utterance(
            buffer_with_duration(1000),
            Duration::from_millis(300),
            &transcriber,
            &mut injector,
        );

        assert_eq!(outcome, UtteranceOutcome::TranscriptionFailed);
    }

    #[test]
    fn test_injection_failure_is_absorbed() {
        let mut transcriber = MockTranscriber::new();
        transcriber
            .expect_transcribe()
            .times(1)
            .returning(|_| Ok("lost words".to_owned()));
        let mut injector = MockTextInjector::new();
        injector
            .expect_inject()
            .times(1)
            .returning(|_| Err(crate::input::InjectError::SendFailed("focus gone".to_owned())));

        let outcome = process_utterance(
            buffer_with_duration(1000),
            Duration::from_millis(300),
            &transcriber,
            &mut injector,
        );

        assert_eq!(outcome, UtteranceOutcome::InjectionFailed);
    }
}
