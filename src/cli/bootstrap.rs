//! CLI bootstrap - wire the orchestrator for terminal use.
//!
//! `CliContext` owns the same components a GUI host would build, with a
//! `ChannelRuntime` in place of the GUI event bridge.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;

use crate::client::HttpProcessingClient;
use crate::orchestrator::Orchestrator;
use crate::runtime::{ChannelRuntime, RuntimeEvent};
use crate::settings::{DdasSettings, SettingsManager};
use crate::store::FileStore;

use super::args::Args;

/// Name of the store document inside the data directory.
const STORE_FILE: &str = "store.json";

/// Context for CLI execution containing all initialized services.
pub struct CliContext {
    pub orchestrator: Orchestrator,

    /// Concrete runtime, kept for answering consent requests
    pub runtime: Arc<ChannelRuntime>,

    /// Event receiver for the output handler; taken once
    pub event_rx: Option<mpsc::UnboundedReceiver<RuntimeEvent>>,

    pub settings_manager: Arc<SettingsManager>,

    /// Effective settings after command-line overrides
    pub settings: DdasSettings,

    pub args: Args,
}

impl CliContext {
    /// Stop the heartbeat and cancel outstanding prompts.
    ///
    /// Pending entries stay on disk and resume on the next run.
    pub async fn shutdown(self) -> Result<()> {
        self.orchestrator.shutdown().await;
        Ok(())
    }
}

/// Initialize logging, settings, storage and the orchestrator.
///
/// The orchestrator is built but not started, so one-shot commands never
/// resume the queue.
pub async fn initialize(args: &Args) -> Result<CliContext> {
    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        // Only warn on errors other than file not found
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("[cli] Failed to load .env file: {}", e);
        }
    }

    let settings_manager = Arc::new(match &args.settings {
        Some(path) => SettingsManager::with_path(path).await,
        None => SettingsManager::new().await,
    }
    .context("Failed to initialize settings manager")?);

    let mut settings = settings_manager.get().await;

    // Logs go to stderr so JSON lines on stdout stay clean
    let log_level = if args.verbose {
        "debug".to_string()
    } else {
        settings.advanced.log_level.clone()
    };
    let directive = format!("ddas={}", log_level)
        .parse::<tracing_subscriber::filter::Directive>()
        .with_context(|| format!("Invalid log level '{}'", log_level))?;
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(directive))
        .try_init();

    // Ensure settings file exists (creates template on first run)
    if let Err(e) = settings_manager.ensure_settings_file().await {
        tracing::warn!("Failed to create settings template: {}", e);
    }

    if let Some(url) = &args.service_url {
        settings.service.base_url = url.clone();
    }
    if let Some(dir) = &args.data_dir {
        settings.storage.data_dir = Some(dir.display().to_string());
    }

    if args.verbose {
        eprintln!(
            "[cli] Settings loaded from {}",
            settings_manager.path().display()
        );
        eprintln!("[cli] Processing service: {}", settings.service.base_url);
    }

    let data_dir = settings.data_dir();
    tokio::fs::create_dir_all(&data_dir)
        .await
        .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;
    let store = Arc::new(
        FileStore::open(data_dir.join(STORE_FILE))
            .await
            .context("Failed to open store")?,
    );

    if args.verbose {
        eprintln!("[cli] Store: {}", store.path().display());
    }

    let client = Arc::new(
        HttpProcessingClient::new(settings.client_config())
            .context("Failed to create processing client")?,
    );

    let (runtime, event_rx) = ChannelRuntime::new(args.auto_accept);
    let runtime = Arc::new(runtime);

    let auth_token = settings_manager.auth_token().await;
    let orchestrator = Orchestrator::new(
        settings.orchestrator_config(auth_token),
        store,
        client,
        runtime.clone(),
    )
    .await
    .context("Failed to initialize orchestrator")?;

    Ok(CliContext {
        orchestrator,
        runtime,
        event_rx: Some(event_rx),
        settings_manager,
        settings,
        args: args.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[tokio::test]
    async fn test_initialize_with_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let settings_path = dir.path().join("settings.toml");
        let data_dir = dir.path().join("data");

        let args = Args::parse_from([
            "ddas-cli".to_string(),
            "--settings".to_string(),
            settings_path.display().to_string(),
            "--data-dir".to_string(),
            data_dir.display().to_string(),
            "--service-url".to_string(),
            "http://127.0.0.1:6553".to_string(),
        ]);

        let ctx = initialize(&args).await.unwrap();
        assert!(settings_path.exists());
        assert_eq!(ctx.settings.service.base_url, "http://127.0.0.1:6553");
        assert_eq!(ctx.settings.data_dir(), data_dir);
        assert!(ctx.orchestrator.pending().await.is_empty());
        assert!(ctx.event_rx.is_some());

        ctx.shutdown().await.unwrap();
    }
}
