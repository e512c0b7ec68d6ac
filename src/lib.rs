//! Whisper Typer - push-to-talk dictation
//!
//! Hold the configured hotkey, speak, release; the utterance is transcribed
//! with a local Whisper model and typed into the focused window. This library
//! exports the pipeline pieces so they can be exercised in tests.

/// Audio capture and utterance buffers
pub mod audio;
/// Configuration management
pub mod config;
/// Lifecycle controller and utterance pipeline
pub mod controller;
/// Input handling (hotkey, text injection)
pub mod input;
/// Startup permission checks
pub mod permissions;
/// Session state machine
pub mod session;
/// Logging setup
pub mod telemetry;
/// Whisper transcription
pub mod transcription;
