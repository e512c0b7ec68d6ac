use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::debug;

/// Pipeline state for the single in-flight utterance
///
/// Strictly sequential: Idle -> Recording -> Transcribing -> Idle. At most one
/// utterance is ever active; a press arriving outside Idle is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Recording,
    Transcribing,
}

impl SessionState {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Recording => "recording",
            Self::Transcribing => "transcribing",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Transition attempted from the wrong state
#[derive(Debug, Clone, Error)]
#[error("cannot {action} while {current}")]
pub struct InvalidTransition {
    /// State the session was in when the transition was attempted
    pub current: SessionState,
    /// Human-readable name of the rejected transition
    pub action: &'static str,
}

/// Shared handle over the session state and the shutdown flag
///
/// The state is read from the hotkey event path and from the pipeline task;
/// every mutation goes through one of the transition methods here so the
/// single-utterance invariant holds regardless of which thread observes an
/// edge first.
#[derive(Debug, Clone, Default)]
pub struct SessionHandle {
    state: Arc<Mutex<SessionState>>,
    stopping: Arc<AtomicBool>,
}

impl SessionHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state snapshot
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.state() == SessionState::Idle
    }

    /// Idle -> Recording; returns false (and leaves state untouched) when a
    /// press arrives while an utterance is already in flight
    pub fn try_begin_recording(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == SessionState::Idle {
            *state = SessionState::Recording;
            debug!("session: idle -> recording");
            true
        } else {
            let current = *state;
            debug!(current = %current, "press ignored, utterance in flight");
            false
        }
    }

    /// Recording -> Transcribing (release edge or capture timeout)
    ///
    /// # Errors
    /// Returns `InvalidTransition` when not currently recording
    pub fn begin_transcribing(&self) -> Result<(), InvalidTransition> {
        self.transition(SessionState::Recording, SessionState::Transcribing, "finish capture")
    }

    /// Transcribing -> Idle (pipeline done, injected or suppressed)
    ///
    /// # Errors
    /// Returns `InvalidTransition` when not currently transcribing
    pub fn finish_utterance(&self) -> Result<(), InvalidTransition> {
        self.transition(SessionState::Transcribing, SessionState::Idle, "finish utterance")
    }

    /// Recording -> Idle without transcription (capture failure path)
    ///
    /// # Errors
    /// Returns `InvalidTransition` when not currently recording
    pub fn abort_recording(&self) -> Result<(), InvalidTransition> {
        self.transition(SessionState::Recording, SessionState::Idle, "abort capture")
    }

    fn transition(
        &self,
        from: SessionState,
        to: SessionState,
        action: &'static str,
    ) -> Result<(), InvalidTransition> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != from {
            return Err(InvalidTransition {
                current: *state,
                action,
            });
        }
        *state = to;
        debug!("session: {} -> {}", from, to);
        Ok(())
    }

    /// Request graceful shutdown; an in-flight utterance still completes
    pub fn request_stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_handle_is_idle_and_running() {
        let session = SessionHandle::new();
        assert!(session.is_idle());
        assert!(!session.is_stopping());
    }

    #[test]
    fn full_cycle() {
        let session = SessionHandle::new();

        assert!(session.try_begin_recording());
        assert_eq!(session.state(), SessionState::Recording);

        session.begin_transcribing().unwrap();
        assert_eq!(session.state(), SessionState::Transcribing);

        session.finish_utterance().unwrap();
        assert!(session.is_idle());

        // A fresh cycle starts cleanly
        assert!(session.try_begin_recording());
    }

    #[test]
    fn press_while_recording_is_noop() {
        let session = SessionHandle::new();
        assert!(session.try_begin_recording());

        assert!(!session.try_begin_recording());
        assert_eq!(session.state(), SessionState::Recording);
    }

    #[test]
    fn press_while_transcribing_is_noop() {
        let session = SessionHandle::new();
        assert!(session.try_begin_recording());
        session.begin_transcribing().unwrap();

        assert!(!session.try_begin_recording());
        assert_eq!(session.state(), SessionState::Transcribing);
    }

    #[test]
    fn abort_returns_to_idle() {
        let session = SessionHandle::new();
        assert!(session.try_begin_recording());

        session.abort_recording().unwrap();
        assert!(session.is_idle());
    }

    #[test]
    fn begin_transcribing_from_idle_fails() {
        let session = SessionHandle::new();
        let err = session.begin_transcribing().unwrap_err();
        assert_eq!(err.current, SessionState::Idle);
        assert!(err.to_string().contains("finish capture"));
    }

    #[test]
    fn finish_utterance_from_recording_fails() {
        let session = SessionHandle::new();
        assert!(session.try_begin_recording());
        let err = session.finish_utterance().unwrap_err();
        assert_eq!(err.current, SessionState::Recording);
    }

    #[test]
    fn stop_flag_is_shared_between_clones() {
        let session = SessionHandle::new();
        let observer = session.clone();

        session.request_stop();
        assert!(observer.is_stopping());
    }

    #[test]
    fn clones_share_state() {
        let session = SessionHandle::new();
        let observer = session.clone();

        assert!(session.try_begin_recording());
        assert_eq!(observer.state(), SessionState::Recording);
        // The clone sees the in-flight utterance and refuses a second one
        assert!(!observer.try_begin_recording());
    }

    #[test]
    fn state_display() {
        assert_eq!(SessionState::Idle.to_string(), "idle");
        assert_eq!(SessionState::Recording.to_string(), "recording");
        assert_eq!(SessionState::Transcribing.to_string(), "transcribing");
    }
}
