use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub hotkey: HotkeyConfig,
    pub audio: AudioConfig,
    pub model: ModelConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct HotkeyConfig {
    /// Modifier names ("Control", "Shift", ...); empty for a bare key
    pub modifiers: Vec<String>,
    /// Key name, e.g. "F19" or "Z"
    pub key: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AudioConfig {
    /// Input device index; omit to use the system default device
    pub device_index: Option<usize>,
    /// Target sample rate handed to the model (device audio is resampled)
    pub sample_rate: u32,
    /// Target channel count; only mono is supported
    pub channels: u16,
    /// Force-end a capture after this many seconds even if the key is held
    pub max_utterance_secs: u64,
    /// Buffers shorter than this are treated as "no speech" and skipped
    pub min_utterance_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    /// ggml model name, e.g. "tiny", "base.en", "small"
    pub name: String,
    pub path: String,
    /// Language code; omit for auto-detect
    pub language: Option<String>,
    pub threads: usize,
    pub beam_size: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub log_path: String,
}

impl AudioConfig {
    /// Maximum capture duration before force-ending
    #[must_use]
    pub const fn max_utterance(&self) -> Duration {
        Duration::from_secs(self.max_utterance_secs)
    }

    /// Minimum buffer duration worth sending to the model
    #[must_use]
    pub const fn min_utterance(&self) -> Duration {
        Duration::from_millis(self.min_utterance_ms)
    }
}

impl Config {
    /// Load config from ~/.whisper-typer.toml, creating it with defaults first
    /// if it does not exist
    ///
    /// # Errors
    /// Returns error if the file cannot be read/written, fails to parse, or
    /// fails validation
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            Self::create_default(&config_path).context("failed to create default config")?;
        }

        let contents = fs::read_to_string(&config_path).context("failed to read config file")?;

        let config: Config = toml::from_str(&contents).context("failed to parse config TOML")?;

        config.validate()?;

        Ok(config)
    }

    fn config_path() -> Result<PathBuf> {
        let home = std::env::var("HOME").context("HOME environment variable not set")?;
        Ok(PathBuf::from(home).join(".whisper-typer.toml"))
    }

    fn create_default(path: &PathBuf) -> Result<()> {
        let default_config = r#"[hotkey]
# Bare function key by default; add modifiers like ["Control", "Alt"] if the
# key collides with something else
modifiers = []
key = "F19"

[audio]
# device_index = 0       # omit to use the system default input device
sample_rate = 16000
channels = 1
max_utterance_secs = 30
min_utterance_ms = 300

[model]
name = "small"
path = "~/.whisper-typer/models/ggml-small.bin"
# language = "en"        # omit to auto-detect
threads = 4
beam_size = 5

[telemetry]
enabled = false
log_path = "~/.whisper-typer/whisper-typer.log"
"#;
        fs::write(path, default_config).context("failed to write default config")?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.hotkey.key.is_empty() {
            bail!("hotkey.key must not be empty");
        }
        if self.audio.sample_rate == 0 {
            bail!("audio.sample_rate must be > 0");
        }
        if self.audio.channels != 1 {
            bail!(
                "audio.channels = {} is unsupported (only mono capture)",
                self.audio.channels
            );
        }
        if self.audio.max_utterance_secs == 0 {
            bail!("audio.max_utterance_secs must be > 0");
        }
        if self.audio.min_utterance() >= self.audio.max_utterance() {
            bail!(
                "audio.min_utterance_ms ({}) must be below max_utterance_secs ({})",
                self.audio.min_utterance_ms,
                self.audio.max_utterance_secs
            );
        }
        Ok(())
    }

    /// Expand ~ in paths to home directory
    ///
    /// # Errors
    /// Returns error if HOME is not set
    pub fn expand_path(path: &str) -> Result<PathBuf> {
        if let Some(stripped) = path.strip_prefix("~/") {
            let home = std::env::var("HOME").context("HOME environment variable not set")?;
            Ok(PathBuf::from(home).join(stripped))
        } else {
            Ok(PathBuf::from(path))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> Config {
        toml::from_str(toml_str).unwrap()
    }

    const VALID: &str = r#"
[hotkey]
modifiers = []
key = "F19"

[audio]
sample_rate = 16000
channels = 1
max_utterance_secs = 30
min_utterance_ms = 300

[model]
name = "small"
path = "~/.whisper-typer/models/ggml-small.bin"
threads = 4
beam_size = 5

[telemetry]
enabled = false
log_path = "~/.whisper-typer/whisper-typer.log"
"#;

    #[test]
    fn test_parse_valid_config() {
        let config = parse(VALID);
        assert_eq!(config.hotkey.key, "F19");
        assert!(config.hotkey.modifiers.is_empty());
        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.audio.device_index, None);
        assert_eq!(config.model.name, "small");
        assert_eq!(config.model.language, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duration_helpers() {
        let config = parse(VALID);
        assert_eq!(config.audio.max_utterance(), Duration::from_secs(30));
        assert_eq!(config.audio.min_utterance(), Duration::from_millis(300));
    }

    #[test]
    fn test_parse_optional_fields() {
        let with_options = VALID
            .replace("[model]", "[model]\nlanguage = \"en\"")
            .replace("[audio]", "[audio]\ndevice_index = 2");
        let config = parse(&with_options);
        assert_eq!(config.audio.device_index, Some(2));
        assert_eq!(config.model.language.as_deref(), Some("en"));
    }

    #[test]
    fn test_validate_rejects_stereo() {
        let stereo = VALID.replace("channels = 1", "channels = 2");
        let config = parse(&stereo);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("only mono"));
    }

    #[test]
    fn test_validate_rejects_zero_max_duration() {
        let zero = VALID.replace("max_utterance_secs = 30", "max_utterance_secs = 0");
        let config = parse(&zero);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_min_above_max() {
        let inverted = VALID.replace("min_utterance_ms = 300", "min_utterance_ms = 31000");
        let config = parse(&inverted);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("min_utterance_ms"));
    }

    #[test]
    fn test_validate_rejects_empty_key() {
        let empty = VALID.replace("key = \"F19\"", "key = \"\"");
        let config = parse(&empty);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let home = std::env::var("HOME").unwrap();
        let result = Config::expand_path("~/models/ggml-small.bin").unwrap();
        assert_eq!(result, PathBuf::from(home).join("models/ggml-small.bin"));
    }

    #[test]
    fn test_expand_path_absolute() {
        let result = Config::expand_path("/opt/models/ggml-small.bin").unwrap();
        assert_eq!(result, PathBuf::from("/opt/models/ggml-small.bin"));
    }
}
