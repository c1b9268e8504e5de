//! # hub-publish CLI
//!
//! Command parsing and the async [`run`] entrypoint. All publishing logic
//! lives in `hub-publish-core`; this module loads the configuration, builds
//! the Hub client and reports the outcome.
//!
//! - `hub-publish site --config <file> [--dry-run]`
//! - `hub-publish downloads --config <file> [--dry-run]`

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use hub_publish_core::client::HubClient;
use hub_publish_core::data::DataService;
use hub_publish_core::downloads::{publish_downloads, ReleaseAssets};
use hub_publish_core::site::{publish_site, SiteOutcome};

use crate::load_config::{load_config, CliConfig};

/// CLI for hub-publish: publish build output to a Hub repository.
#[derive(Parser)]
#[clap(
    name = "hub-publish",
    version,
    about = "Publish a generated site into a branch, or release binaries as downloads, on a Hub repository"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Commit the site output directory to the configured branch
    Site {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Read from the Hub but write nothing
        #[clap(long)]
        dry_run: bool,
    },
    /// Upload release binaries as downloads of the configured release tag
    Downloads {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// List existing downloads but neither delete nor upload
        #[clap(long)]
        dry_run: bool,
    },
}

async fn run_site(config: CliConfig) -> Result<()> {
    let CliConfig {
        hub,
        repository,
        project,
        settings,
        site,
        ..
    } = config;
    site.trace_loaded();
    if site.skip {
        tracing::info!(command = "site", "Site publication skipped by configuration");
        return Ok(());
    }

    let client = HubClient::from_config(&hub, settings.as_ref())?;
    let data = DataService::new(client);
    match publish_site(&data, &site, &repository, project.as_ref()).await {
        Ok(SiteOutcome::Published(report)) => {
            tracing::info!(
                command = "site",
                repository = %report.repository,
                reference = %report.reference,
                entries = report.entries.len(),
                commit = %report.commit_sha,
                update = ?report.update,
                dry_run = report.dry_run,
                "Site publication complete"
            );
            Ok(())
        }
        Ok(SiteOutcome::Skipped) => {
            tracing::info!(command = "site", "Site publication skipped");
            Ok(())
        }
        Err(e) => {
            tracing::error!(command = "site", error = %e, "Site publication failed");
            Err(anyhow::Error::new(e))
        }
    }
}

async fn run_downloads(config: CliConfig) -> Result<()> {
    let CliConfig {
        hub,
        repository,
        project,
        settings,
        downloads,
        ..
    } = config;
    downloads.trace_loaded();

    let client = HubClient::from_config(&hub, settings.as_ref())?;
    let service = ReleaseAssets::new(client);
    match publish_downloads(&service, &downloads, &repository, project.as_ref()).await {
        Ok(report) => {
            tracing::info!(
                command = "downloads",
                repository = %report.repository,
                tag = %report.tag,
                deleted = report.deleted.len(),
                uploaded = report.uploaded.len(),
                dry_run = report.dry_run,
                "Downloads publication complete"
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!(command = "downloads", error = %e, "Downloads publication failed");
            Err(anyhow::Error::new(e))
        }
    }
}

/// Async CLI entrypoint, shared by `main` and the integration tests.
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Site { config, dry_run } => {
            let mut config = load_config(config)?;
            config.site.dry_run |= dry_run;
            tracing::info!(command = "site", "Starting site publication");
            run_site(config).await
        }
        Commands::Downloads { config, dry_run } => {
            let mut config = load_config(config)?;
            config.downloads.dry_run |= dry_run;
            tracing::info!(command = "downloads", "Starting downloads publication");
            run_downloads(config).await
        }
    }
}
