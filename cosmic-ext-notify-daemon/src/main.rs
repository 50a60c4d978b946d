//! COSMIC notification daemon
//!
//! Runs one notification engine for one client session. Events arrive as
//! JSON lines on stdin, alerts go to the freedesktop notification server (or
//! the in-app bubble stack) and activations come back as JSON lines on stdout.

mod client;
mod config;
mod diagnostics;
mod freedesktop;
mod sound;

use anyhow::{Context, Result};
use clap::Parser;
use config::{BackendKind, Config};
use cosmic_ext_notify::{
    DisplayBackend, Engine, EngineDriver, EngineEvent, InAppBackend, MemorySession,
};
use diagnostics::{BuildInfo, Cli, DiagnosticCommand};
use freedesktop::FreedesktopBackend;
use std::rc::Rc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// How long queued backend commands may take after the engine stopped
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => Config::load().context("Failed to load configuration")?,
    };
    if let Some(kind) = cli.backend {
        config.backend.kind = kind;
    }
    Ok(config)
}

fn handle_diagnostic_command(cli: &Cli, command: &DiagnosticCommand) -> Result<()> {
    match command {
        DiagnosticCommand::Version { verbose } => {
            BuildInfo::get().display(*verbose);
            Ok(())
        }
        DiagnosticCommand::DumpConfig => {
            let config = load_config(cli)?;
            let contents =
                toml::to_string_pretty(&config).context("Failed to serialize config")?;
            println!("{}", contents);
            Ok(())
        }
        DiagnosticCommand::CheckConfig => {
            let config = load_config(cli)?;
            config.validate()?;
            println!("Configuration OK ({:?} backend)", config.backend.kind);
            Ok(())
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(command) = &cli.command {
        return handle_diagnostic_command(&cli, command);
    }

    diagnostics::init_logging(&cli).context("Failed to initialize logging")?;

    info!("Starting notification daemon...");

    let config = load_config(&cli)?;
    info!("Configuration loaded");
    info!("Backend: {:?}", config.backend.kind);
    info!(
        "Timing: delay={}ms grouping={}ms max={}ms",
        config.timing.minimum_delay_ms,
        config.timing.grouping_window_ms,
        config.timing.max_grouping_window_ms
    );

    let (events_tx, events_rx) = mpsc::unbounded_channel();

    let (backend, worker) = match config.backend.kind {
        BackendKind::Freedesktop => {
            let (backend, worker) = FreedesktopBackend::connect(&config.backend, events_tx.clone())
                .await
                .context("Failed to start freedesktop backend")?;
            (Box::new(backend) as Box<dyn DisplayBackend>, Some(worker))
        }
        BackendKind::InApp => (
            Box::new(InAppBackend::new(&config.notifications)) as Box<dyn DisplayBackend>,
            None,
        ),
    };

    let session = Rc::new(MemorySession::new());
    let engine = Engine::new(
        config.timing.clone(),
        config.notifications.clone(),
        session.clone(),
        backend,
    )
    .context("Failed to create notification engine")?
    .with_sound(sound::slot(&config.sound))
    .with_actions(Box::new(client::JsonLinesActions::stdout()))
    .with_app_name(config.backend.app_name.clone());

    let input_tx = events_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = client::read_events(tokio::io::stdin(), input_tx).await {
            error!("Client input failed: {:#}", e);
        }
    });

    let signal_tx = events_tx;
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupted, shutting down");
                let _ = signal_tx.send(EngineEvent::Shutdown);
            }
            Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    let engine = EngineDriver::new(engine, session, events_rx).run().await;
    info!(
        "Engine stopped ({} waiters, {} parked)",
        engine.registry().len(),
        engine.registry().parked_len()
    );
    drop(engine);

    if let Some(worker) = worker {
        if tokio::time::timeout(DRAIN_TIMEOUT, worker).await.is_err() {
            warn!("Notification worker did not finish in time");
        }
    }

    info!("Notification daemon stopped");
    Ok(())
}
