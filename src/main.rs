//! # Repository Sync Entry Point

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use repo_sync::{
    config::ConfigLoader,
    db,
    provider::GitHubClient,
    seeds::seed_default_repository,
    server::{AppState, run_server},
    sync::{RepositorySynchronizer, SyncContext, SyncSettings},
    telemetry,
};

#[derive(Parser)]
#[command(name = "repo-sync", version, about = "Repository commit synchronization service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run migrations, resume synchronization and serve the HTTP API (default)
    Serve,
    /// Apply database migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Arc::new(ConfigLoader::new().load()?);
    telemetry::init_tracing(&config)?;

    info!(profile = %config.profile, "Loaded configuration");
    if let Ok(redacted_json) = config.redacted_json() {
        tracing::debug!(config = %redacted_json, "Effective configuration");
    }

    let db = Arc::new(db::init_pool(&config).await?);
    db::run_migrations(&db).await?;

    if matches!(cli.command, Some(Command::Migrate)) {
        info!("Migrations applied");
        return Ok(());
    }

    let provider = Arc::new(GitHubClient::from_config(&config)?);
    let ctx = SyncContext::from_database(db.clone(), provider, SyncSettings::from_config(&config));
    let shutdown = CancellationToken::new();
    let synchronizer = Arc::new(RepositorySynchronizer::new(ctx, shutdown.child_token()));

    synchronizer.resume_all().await?;
    seed_default_repository(&synchronizer, &config).await;

    let server_shutdown = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received");
                server_shutdown.cancel();
            }
            Err(err) => error!(error = %err, "Failed to listen for shutdown signal"),
        }
    });

    let state = AppState {
        config: config.clone(),
        db,
        synchronizer: synchronizer.clone(),
    };
    let served = run_server(state, shutdown.clone()).await;

    shutdown.cancel();
    synchronizer.shutdown().await;
    info!("Shutdown complete");

    served
}
