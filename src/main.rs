use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crm_records::CrmServices;
use crm_records::blob::MemoryBlobStore;
use crm_records::config::{Config, LoggingConfig};
use crm_records::db::{BackendGate, EnvGate};
use crm_records::fallback::FallbackStore;
use crm_records::session::FixedUser;
use crm_records::settings::Settings;

mod cli;

use cli::{Cli, Command};

/// Logs go to stderr; stdout carries the JSON envelope.
fn init_tracing(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(&config.filter)
        .with_context(|| format!("invalid log filter '{}'", config.filter))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow::anyhow!("failed to install log subscriber: {e}"))
}

#[cfg(feature = "postgres")]
async fn init_schema(config: &Config) -> anyhow::Result<()> {
    let database = config
        .database
        .as_ref()
        .context("no remote store configured (set DATABASE_URL)")?;
    let backend = crm_records::db::postgres::PgBackend::new(database)?;
    backend.ensure_schema().await?;
    tracing::info!("Remote schema is up to date");
    Ok(())
}

#[cfg(not(feature = "postgres"))]
async fn init_schema(_config: &Config) -> anyhow::Result<()> {
    anyhow::bail!("built without the postgres feature")
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let settings = Settings::load(&cli.config)?;
    let config = Config::resolve(&settings)?;
    init_tracing(&config.logging)?;

    if matches!(cli.command, Command::InitSchema) {
        init_schema(&config).await?;
        return Ok(ExitCode::SUCCESS);
    }

    let user = cli.user.clone().or(config.user_id.clone());
    let url_ttl = config.storage.url_ttl;
    let gate: Arc<dyn BackendGate> = Arc::new(EnvGate::new(settings));
    let services = CrmServices::new(
        gate,
        Arc::new(FallbackStore::seeded()?),
        Arc::new(FixedUser::from(user)),
        Arc::new(MemoryBlobStore::new(config.storage)),
        url_ttl,
    );

    let envelope = cli::execute(&services, cli.command).await?;
    println!("{}", serde_json::to_string_pretty(&envelope)?);
    if envelope["error"] == serde_json::Value::Bool(true) {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
