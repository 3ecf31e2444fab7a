use clap::{Args, Parser};
use notifications::api::{self, ApiError, AppState};
use notifications::bootstrap::{self, BootstrapError};
use notifications::config::Config;
use notifications::migration::MigrationError;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "notifications")]
enum CliCommand {
    /// Runs the administrative API
    Serve(ServeArgs),
    /// Backfills endpoint ownership into the relations API and exits
    MigrateAssets(MigrateArgs),
}

#[derive(Args)]
struct ServeArgs {
    #[arg(long)]
    config: PathBuf,
}

#[derive(Args)]
struct MigrateArgs {
    #[arg(long)]
    config: PathBuf,
    /// Only migrate this organization's endpoints
    #[arg(long)]
    org_id: Option<String>,
}

#[derive(thiserror::Error, Debug)]
enum AppError {
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Migration(#[from] MigrationError),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliCommand::parse();

    let config_path = match &cli {
        CliCommand::Serve(args) => &args.config,
        CliCommand::MigrateAssets(args) => &args.config,
    };
    let config = match Config::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let _sentry = bootstrap::init_logging(config.common.logging.as_ref());

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "exiting");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: CliCommand, config: Config) -> Result<(), AppError> {
    let metrics = bootstrap::init_metrics(config.common.metrics.as_ref())?;
    let store = bootstrap::build_store(&config.routing_store).await?;
    let job = bootstrap::build_migration_job(&config, store.clone(), metrics.clone())?;

    match cli {
        CliCommand::Serve(_) => {
            let state = AppState {
                authorization: bootstrap::build_authorization(&config, store, metrics)?,
                migration: Arc::new(job),
                max_batch_size: config.migration.max_batch_size,
            };
            api::serve(&config.listener, state).await?;
        }
        CliCommand::MigrateAssets(args) => {
            job.migrate(config.migration.max_batch_size, args.org_id.as_deref())
                .await?;
        }
    }

    Ok(())
}
