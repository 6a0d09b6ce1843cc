// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Relay Daemon (relayd)
//!
//! Background process that owns the pipeline orchestrator: dispatcher,
//! maintenance scheduler, transcription pool, and tiered audio store.
//!
//! A transport-agnostic inbound producer calls `OnMessage` with a topic,
//! a JSON payload, and a receive time; this binary's own stdin reader is a
//! minimal newline-delimited-JSON reference producer for local exercising
//! only, not a production transport.

use std::sync::Arc;

use relay_core::clock::{Clock, SystemClock};
use relay_core::Metrics;
use relay_daemon::{DaemonConfig, Orchestrator, OrchestratorDeps};
use relay_storage::MemStore;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};

#[derive(Debug, Deserialize)]
struct StdinMessage {
    topic: String,
    payload: serde_json::Value,
    #[serde(default)]
    receive_time_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("relayd {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" => {
                println!("relayd {}", env!("CARGO_PKG_VERSION"));
                println!("Radio telemetry ingest daemon");
                println!();
                println!("Reads newline-delimited JSON messages of the form");
                println!(r#"{{"topic": "...", "payload": {{...}}}}"# );
                println!("from stdin and feeds them to the pipeline. For local exercising only.");
                return Ok(());
            }
            other => {
                eprintln!("error: unexpected argument '{other}'");
                eprintln!("usage: relayd [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let config = DaemonConfig::load()?;
    let _log_guard = setup_logging(&config)?;

    info!(state_dir = %config.state_dir.display(), "starting relay daemon");

    std::fs::create_dir_all(&config.state_dir)?;
    let store: Arc<dyn relay_storage::Store> = Arc::new(MemStore::open(&config.store_path)?);
    let metrics = Arc::new(Metrics::default());

    // No transcription provider or remote blob backend is wired here: both
    // are external services with no concrete client shipped in this
    // workspace. Configure `audio_store_mode = "local"` to exercise the
    // audio store without one.
    let orchestrator = Orchestrator::start(OrchestratorDeps {
        store,
        config: Arc::new(config.pipeline),
        metrics,
        clock: SystemClock,
        provider: None,
        remote: None,
    })
    .await?;

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    info!("daemon ready, reading newline-delimited JSON from stdin");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<StdinMessage>(&line) {
                            Ok(msg) => {
                                let receive_time_ms = msg.receive_time_ms.unwrap_or_else(|| SystemClock.epoch_ms());
                                orchestrator.on_message(&msg.topic, msg.payload, receive_time_ms).await;
                            }
                            Err(err) => warn!(error = %err, "malformed stdin line, skipping"),
                        }
                    }
                    Ok(None) => {
                        info!("stdin closed, shutting down");
                        break;
                    }
                    Err(err) => {
                        error!(error = %err, "error reading stdin");
                        break;
                    }
                }
            }
            _ = sigterm.recv() => {
                info!("received SIGTERM, shutting down");
                break;
            }
            _ = sigint.recv() => {
                info!("received SIGINT, shutting down");
                break;
            }
        }
    }

    orchestrator.shutdown().await;
    info!("daemon stopped");
    Ok(())
}

fn setup_logging(
    config: &DaemonConfig,
) -> Result<tracing_appender::non_blocking::WorkerGuard, relay_daemon::LifecycleError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    if let Some(parent) = config.log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file_appender = tracing_appender::rolling::never(
        config.log_path.parent().ok_or(relay_daemon::LifecycleError::NoStateDir)?,
        config.log_path.file_name().ok_or(relay_daemon::LifecycleError::NoStateDir)?,
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}
