//! `credence-sweeper`: runs migrations and prunes dead refresh and email tokens.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use credence::{
    auth::CleanupService,
    config::AppConfig,
    observability::{init_observability, log_config_info},
    storage::{check_connection, create_pool, run_migrations, PgTransactionManager},
    APP_NAME, VERSION,
};
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "credence-sweeper")]
#[command(about = "Credence token maintenance")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Database URL override
    #[arg(long)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sweep periodically until interrupted (default)
    Run,
    /// Sweep once and exit
    Sweep,
    /// Apply pending migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(url) = cli.database_url {
        config.database.url = url;
        config.validate().context("validating database URL override")?;
    }

    init_observability(&config.observability).context("initializing observability")?;
    info!(app_name = APP_NAME, version = VERSION, "starting credence sweeper");
    log_config_info(&config);

    let pool = create_pool(&config.database).await.context("creating database pool")?;
    check_connection(&pool).await.context("checking database connection")?;

    let command = cli.command.unwrap_or(Commands::Run);
    if matches!(command, Commands::Migrate) {
        if config.database.auto_migrate {
            info!("migrations already applied at pool creation");
        } else {
            run_migrations(&pool).await.context("running migrations")?;
        }
        return Ok(());
    }

    let manager = PgTransactionManager::new(pool).with_timeout(config.database.transaction_timeout());
    let service = CleanupService::new(Arc::new(manager), config.cleanup.retention_days);

    if matches!(command, Commands::Sweep) {
        let report = service.run_once().await.context("sweeping tokens")?;
        info!(
            refresh_tokens = report.refresh_tokens,
            email_tokens = report.email_tokens,
            "sweep complete"
        );
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = service.spawn(config.cleanup.interval(), shutdown_rx);

    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);
    sweeper.await.context("joining sweeper task")?;

    info!("credence sweeper stopped");
    Ok(())
}
