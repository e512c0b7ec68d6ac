use thiserror::Error;
use tracing::{error, info};

/// Text injection errors
#[derive(Debug, Error)]
pub enum InjectError {
    /// The OS input-synthesis backend could not be initialized
    #[error("failed to initialize input backend: {0}")]
    Backend(String),

    /// Sending the synthesized keystrokes failed
    #[error("failed to send text: {0}")]
    SendFailed(String),

    /// Text is empty
    #[error("text is empty")]
    EmptyText,
}

/// Sends text as synthetic keystrokes to the focused window
///
/// Focus is read at injection time, not at capture time: if the user switched
/// windows while the model was running, the text lands in the new target.
/// That race is inherent to the feature and accepted.
#[cfg_attr(test, mockall::automock)]
pub trait TextInjector: Send {
    /// Type `text` into whatever currently holds input focus
    ///
    /// # Errors
    /// Returns error if the backend fails; there is no retry, the utterance
    /// is simply lost
    fn inject(&mut self, text: &str) -> Result<(), InjectError>;
}

/// Cross-platform injector backed by enigo
///
/// The enigo connection is built per call; construction doubles as the
/// startup permission probe via [`EnigoInjector::new`].
pub struct EnigoInjector;

impl EnigoInjector {
    /// Verify the input-synthesis backend is usable and build the injector
    ///
    /// # Errors
    /// Returns `InjectError::Backend` when the OS refuses input synthesis
    /// (missing permission, no display, ...)
    pub fn new() -> Result<Self, InjectError> {
        use enigo::{Enigo, Settings};

        // Probe once so a denied permission fails startup, not the first
        // utterance
        Enigo::new(&Settings::default()).map_err(|e| InjectError::Backend(e.to_string()))?;
        Ok(Self)
    }
}

impl TextInjector for EnigoInjector {
    fn inject(&mut self, text: &str) -> Result<(), InjectError> {
        use enigo::{Enigo, Keyboard, Settings};

        if text.is_empty() {
            error!("attempted to inject empty text");
            return Err(InjectError::EmptyText);
        }

        info!(
            text_len = text.len(),
            text_preview = %text_preview(text),
            "injecting text into focused window"
        );

        let mut enigo =
            Enigo::new(&Settings::default()).map_err(|e| InjectError::Backend(e.to_string()))?;
        enigo
            .text(text)
            .map_err(|e| InjectError::SendFailed(e.to_string()))?;

        Ok(())
    }
}

/// Generate preview of text for logging (pure, testable)
///
/// Truncates text >50 chars with "..." suffix. Respects UTF-8 char boundaries.
#[must_use]
pub fn text_preview(text: &str) -> String {
    if text.len() > 50 {
        // Find char boundary at or before byte 47
        let mut end = 47.min(text.len());
        while end > 0 && !text.is_char_boundary(end) {
            end -= 1;
        }
        if end == 0 {
            return "...".to_owned();
        }
        format!("{}...", &text[..end])
    } else {
        text.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_preview_short() {
        assert_eq!(text_preview("hello"), "hello");
        assert_eq!(text_preview(""), "");
    }

    #[test]
    fn test_text_preview_exactly_50_chars() {
        let text_50 = "a".repeat(50);
        assert_eq!(text_preview(&text_50), text_50);
    }

    #[test]
    fn test_text_preview_long() {
        let text_100 = "a".repeat(100);
        let preview = text_preview(&text_100);
        assert!(preview.len() <= 50);
        assert!(preview.ends_with("..."));
        assert!(preview.starts_with(&text_100[..preview.len() - 3]));
    }

    #[test]
    fn test_text_preview_unicode_boundary() {
        // Each emoji is 4 bytes; truncation must not split one
        let long_unicode = "👋".repeat(30);
        let preview = text_preview(&long_unicode);
        assert!(preview.ends_with("..."));
        assert!(preview.len() < long_unicode.len());
        // Still valid UTF-8 by construction; char iteration must not panic
        let _ = preview.chars().count();
    }

    #[test]
    fn test_mock_injector_records_calls() {
        let mut mock = MockTextInjector::new();
        mock.expect_inject()
            .withf(|text| text == "hello world")
            .times(1)
            .returning(|_| Ok(()));

        mock.inject("hello world").unwrap();
    }

    #[test]
    #[ignore = "requires a display and input permission"]
    fn test_enigo_injector_construction() {
        let injector = EnigoInjector::new();
        assert!(injector.is_ok());
    }

    #[test]
    #[ignore = "requires a display, input permission, and a focused text input"]
    fn test_inject_simple_text() {
        let mut injector = EnigoInjector::new().unwrap();
        injector.inject("hello").unwrap();
    }
}
