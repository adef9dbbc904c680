//! Hark application binary - composition root.
//!
//! Ties the crates together into a single executable:
//! 1. Load configuration from TOML
//! 2. Read the command grammar file
//! 3. Initialize the speech decoder and the session state machine
//! 4. Start microphone capture into the frame queue
//! 5. Run the session loop until interrupt or fatal decoder error
//!
//! Shutdown releases resources in reverse-acquisition order: capture stream
//! first, then the frame queue, then the decoder (dropped with the listener
//! when the consumer task joins).

mod cli;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use hark_audio::{AudioCaptureService, CaptureConfig, CpalCaptureService, FrameQueue};
use hark_core::events::LogSink;
use hark_core::HarkConfig;
use hark_decoder::{VoskDecoder, VoskDecoderConfig};
use hark_session::{CommandListener, ListenerConfig};

use cli::CliArgs;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Tracing.
    let default_level = args.resolve_log_level("info");
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    tracing::info!("Starting Hark v{}", env!("CARGO_PKG_VERSION"));

    // Config.
    let config_file = args.resolve_config_path();
    let mut config = HarkConfig::load_or_default(&config_file);
    if let Some(device) = args.device {
        config.audio.device_name = device;
    }
    if let Some(phrase) = args.wake_phrase {
        config.decoder.wake_phrase = phrase;
    }

    // The command grammar is read once at startup; a missing file is fatal.
    let grammar = std::fs::read_to_string(&config.decoder.grammar_path).map_err(|e| {
        tracing::error!(
            path = %config.decoder.grammar_path,
            error = %e,
            "Failed to read grammar file"
        );
        e
    })?;

    if !config.decoder.dictionary_path.is_empty() {
        tracing::debug!(
            path = %config.decoder.dictionary_path,
            "Pronunciation dictionary configured; the Vosk backend derives pronunciations from its model and will not use it"
        );
    }

    // Decoder. Startup errors (missing model, missing backend) are fatal.
    let decoder = VoskDecoder::new(VoskDecoderConfig {
        model_path: config.decoder.model_path.clone(),
        sample_rate: config.audio.sample_rate,
    })
    .map_err(|e| {
        tracing::error!(error = %e, "Failed to initialize speech decoder");
        e
    })?;

    // Session state machine.
    let listener_config = ListenerConfig {
        wake_phrase: config.decoder.wake_phrase.clone(),
        grammar,
        command_window: Duration::from_secs(config.session.command_window_secs),
        backlog_threshold: config.audio.backlog_threshold,
    };
    let mut listener = CommandListener::new(decoder, listener_config, Arc::new(LogSink::new()))?;

    // Frame queue and capture.
    let queue = Arc::new(FrameQueue::new(config.audio.queue_capacity));
    let capture = CpalCaptureService::new(
        CaptureConfig {
            device_name: config.audio.device_name.clone(),
            sample_rate: config.audio.sample_rate,
            frame_samples: config.audio.frame_samples,
        },
        Arc::clone(&queue),
    );
    capture.start().await.map_err(|e| {
        tracing::error!(error = %e, "Failed to start audio capture");
        e
    })?;

    // The session loop owns the decoder and blocks on the queue, so it runs
    // on a blocking thread rather than the async executor.
    let consumer_queue = Arc::clone(&queue);
    let mut consumer = tokio::task::spawn_blocking(move || listener.run(&consumer_queue));

    tracing::info!("Ready..");

    let early_exit = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupt received, shutting down");
            None
        }
        joined = &mut consumer => Some(joined),
    };

    // Reverse-acquisition release: stop capture, close the queue, join the
    // consumer. This path runs for both interrupt and fatal-error exits.
    if capture.is_active() {
        if let Err(e) = capture.stop().await {
            tracing::warn!(error = %e, "Failed to stop audio capture");
        }
    }
    queue.close();

    let session_result = match early_exit {
        Some(joined) => joined?,
        None => consumer.await?,
    };

    match session_result {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "Session loop failed");
            Err(e.into())
        }
    }
}
