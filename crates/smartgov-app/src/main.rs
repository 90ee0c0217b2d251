//! SmartGov terminal client - composition root.
//!
//! 1. Parse CLI args and load configuration from TOML
//! 2. Build the HTTP transport with the injected credential
//! 3. Wire the session store, speech bridge and turn controller
//! 4. Load sessions, then read questions and commands from stdin

mod cli;
mod repl;

use std::io::Write;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;

use smartgov_chat::{HttpTransport, NoSpeechPlatform, SessionStore, SpeechBridge, TurnController};
use smartgov_core::{ChatEvent, SmartGovConfig};

use crate::cli::CliArgs;
use crate::repl::{failure_line, parse_command, run_command};

/// Mirror controller events into the log.
async fn log_events(mut events: broadcast::Receiver<ChatEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => tracing::debug!(event = ?event, "Chat event"),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "Event log lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let mut config = SmartGovConfig::load_or_default(&config_file);

    // Tracing. Logs go to stderr so they never interleave with replies.
    let log_level = args.resolve_log_level(&config.general.log_level);
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .init();

    tracing::info!("Starting SmartGov v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration loaded");

    config.backend.base_url = args.resolve_backend_url(&config.backend.base_url);
    config.chat.default_language = args.resolve_language(config.chat.default_language)?;
    config.chat.default_category = args.resolve_category(&config.chat.default_category)?;
    if args.no_speech {
        config.speech.enabled = false;
    }

    let credential = args
        .resolve_token()
        .ok_or("no API token: pass --token or set SMARTGOV_TOKEN")?;

    // Transport and session store.
    let transport = Arc::new(HttpTransport::new(&config.backend, &credential)?);
    tracing::info!(base_url = %config.backend.base_url, "Backend transport ready");

    let store = Arc::new(SessionStore::new(
        transport.clone(),
        config.chat.title_max_chars,
    ));

    // The terminal has no microphone or speaker integration.
    let speech = SpeechBridge::new(Arc::new(NoSpeechPlatform), config.speech.clone());

    let controller = TurnController::new(store, transport, speech, config.chat.clone());
    tokio::spawn(log_events(controller.subscribe()));

    let mut out = std::io::stdout();
    match controller.load_sessions().await {
        Ok(sessions) => writeln!(out, "Loaded {} session(s). Type /help for commands.", sessions.len())?,
        Err(e) => writeln!(out, "{}", failure_line(&e))?,
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        write!(out, "> ")?;
        out.flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };

        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(usage) => {
                writeln!(out, "{usage}")?;
                continue;
            }
        };
        if !run_command(&controller, command, &mut out).await? {
            break;
        }
    }

    tracing::info!("SmartGov shut down");
    Ok(())
}
