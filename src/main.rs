//! Linkwatch - media pipeline service
//!
//! Entry point for the linkwatch service.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use linkwatch::jobs::DryRunClient;
use linkwatch::observability::init_tracing;
use linkwatch::{App, Config};
use tokio_util::sync::CancellationToken;

/// Linkwatch - watch a media directory and submit new files as jobs
#[derive(Parser, Debug)]
#[command(name = "linkwatch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON settings file; command-line values take precedence
    #[arg(short, long, env = "LINKWATCH_SETTINGS")]
    settings: Option<PathBuf>,

    /// Directory to watch for new media files
    #[arg(short, long, env = "LINKWATCH_MEDIA_DIR")]
    media_dir: Option<PathBuf>,

    /// Directory processed files are moved into
    #[arg(short, long, env = "LINKWATCH_ARCHIVE_DIR")]
    archive_dir: Option<PathBuf>,

    /// `SQLite` file recording submitted jobs
    #[arg(long, env = "LINKWATCH_JOB_DB")]
    job_db: Option<PathBuf>,

    /// Days finished jobs are kept (0 keeps them forever)
    #[arg(long, env = "LINKWATCH_RETENTION_DAYS")]
    retention_days: Option<u64>,

    /// Seconds between processor cycles
    #[arg(long, env = "LINKWATCH_POLL_INTERVAL")]
    poll_interval: Option<u64>,

    /// Maximum jobs tracked and submitted per cycle
    #[arg(long, env = "LINKWATCH_BATCH_SIZE")]
    batch_size: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LINKWATCH_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging output
    #[arg(long, env = "LINKWATCH_LOG_JSON")]
    log_json: bool,
}

impl Cli {
    /// Layer command-line values over the settings file over defaults.
    fn into_config(self) -> anyhow::Result<Config> {
        let mut config = match &self.settings {
            Some(path) => Config::from_file(path)
                .with_context(|| format!("loading settings from {}", path.display()))?,
            None => Config::default(),
        };

        if let Some(dir) = self.media_dir {
            config.media_dir = dir;
        }
        if let Some(dir) = self.archive_dir {
            config.archive_dir = dir;
        }
        if let Some(db) = self.job_db {
            config.job_db = db;
        }
        if let Some(days) = self.retention_days {
            config.retention_days = days;
        }
        if let Some(secs) = self.poll_interval {
            config.poll_interval_secs = secs;
        }
        if let Some(size) = self.batch_size {
            config.batch_size = size;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        config.log_json |= self.log_json;

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Cli::parse().into_config()?;
    config.validate().context("invalid configuration")?;

    init_tracing(&config.log_level, config.log_json);

    tracing::info!(
        "Linkwatch v{} starting...",
        env!("CARGO_PKG_VERSION")
    );
    tracing::debug!(?config, "Configuration loaded");

    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            return;
        }
        tracing::info!("Received Ctrl+C, shutting down");
        signal_token.cancel();
    });

    App::new(config, DryRunClient::new())
        .run(token)
        .await
        .context("service failed")?;

    Ok(())
}
