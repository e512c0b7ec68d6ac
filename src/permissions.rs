use anyhow::{Context, Result};
use cpal::traits::HostTrait;

use crate::config::AudioConfig;
use crate::input::EnigoInjector;

/// Check that the configured capture device exists
///
/// Opening the stream happens later; this only verifies the device can be
/// found so a missing microphone fails startup instead of the first press.
///
/// # Errors
/// Returns error if no device (or the configured index) is present
pub fn check_capture_device(config: &AudioConfig) -> Result<()> {
    tracing::info!("checking capture device");

    let host = cpal::default_host();
    match config.device_index {
        Some(index) => {
            host.input_devices()
                .context("failed to enumerate input devices")?
                .nth(index)
                .with_context(|| format!("input device index {index} not found"))?;
        }
        None => {
            host.default_input_device()
                .context("no default input device available")?;
        }
    }

    tracing::info!("capture device present");
    Ok(())
}

/// Check that the OS allows synthesizing keyboard input
///
/// # Errors
/// Returns error if the input-synthesis backend refuses to initialize
/// (missing permission, no display session)
pub fn check_input_injection() -> Result<()> {
    tracing::info!("checking input injection permission");

    EnigoInjector::new().context(
        "input injection unavailable - grant the accessibility/input permission and restart",
    )?;

    tracing::info!("input injection permission granted");
    Ok(())
}

/// Run all startup preflight checks
///
/// The global input hook itself is verified when the hotkey registers; these
/// cover the remaining collaborators. Any failure here is fatal.
///
/// # Errors
/// Returns error if any check fails
pub fn preflight(config: &AudioConfig) -> Result<()> {
    tracing::info!("running startup preflight");

    check_capture_device(config)?;
    check_input_injection()?;

    tracing::info!("preflight passed");
    Ok(())
}
