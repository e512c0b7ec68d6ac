use anyhow::Result;
use std::sync::Arc;

use whisper_typer::audio::CaptureSession;
use whisper_typer::config::Config;
use whisper_typer::controller::{Controller, UtteranceLimits};
use whisper_typer::input::{EnigoInjector, GlobalHotkeyEdges, HotkeyMonitor};
use whisper_typer::session::SessionHandle;
use whisper_typer::transcription::{ensure_model_downloaded, WhisperEngine};
use whisper_typer::{permissions, telemetry};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load()?;
    println!("✓ Config loaded from ~/.whisper-typer.toml");

    // Initialize logging
    telemetry::init(config.telemetry.enabled, &config.telemetry.log_path)?;
    tracing::info!("whisper-typer starting");

    // Startup preflight: capture device + injection permission
    permissions::preflight(&config.audio)?;
    println!("✓ Capture device and input permission OK");

    // Load the model, downloading it on first run; the blocking HTTP client
    // must not run on the async runtime threads
    let model_path = Config::expand_path(&config.model.path)?;
    let downloaded = {
        let name = config.model.name.clone();
        let path = model_path.clone();
        tokio::task::spawn_blocking(move || ensure_model_downloaded(&name, &path)).await??
    };
    if downloaded {
        println!("✓ Model downloaded: {}", config.model.name);
    }
    let engine = Arc::new(WhisperEngine::new(
        &model_path,
        config.model.threads,
        config.model.beam_size,
        config.model.language.clone(),
    )?);
    println!("✓ Model loaded: {}", config.model.name);

    // Global hotkey (fails fast if the OS denies the input hook)
    let monitor = HotkeyMonitor::new(&config.hotkey)?;
    println!(
        "✓ Hotkey registered: {:?} + {}",
        config.hotkey.modifiers, config.hotkey.key
    );

    let capture = CaptureSession::new(&config.audio)?;
    let injector = EnigoInjector::new()?;

    // Graceful shutdown: an in-flight utterance still finishes
    let session = SessionHandle::new();
    let signal_session = session.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            println!("\nShutting down...");
            signal_session.request_stop();
        }
    });

    let limits = UtteranceLimits {
        max_capture: config.audio.max_utterance(),
        min_utterance: config.audio.min_utterance(),
    };

    println!(
        "\nWhisper Typer is running. Hold the hotkey to dictate into the focused window."
    );
    println!("Press Ctrl+C to exit.\n");

    let controller = Controller::new(GlobalHotkeyEdges::new(monitor), capture, session, limits);
    controller.run(engine, injector).await?;

    tracing::info!("whisper-typer stopped");
    Ok(())
}
