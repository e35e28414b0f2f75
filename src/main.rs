use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use miette::{IntoDiagnostic, Result, WrapErr};
use payroll_core::api::{AppState, create_router};
use payroll_core::config::{ConfigLoader, LoggingConfig, ServiceConfig, StorageBackend};
use payroll_core::store::MemoryStore;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the YAML service configuration. Defaults apply if omitted.
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Listen address, overriding `server.bind_addr`.
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loader = match &cli.config {
        Some(path) => ConfigLoader::load(path)
            .into_diagnostic()
            .wrap_err("failed to load configuration")?,
        None => ConfigLoader::default(),
    };
    let mut config = loader.config().clone();
    if let Some(bind) = cli.bind {
        config.server.bind_addr = bind;
    }

    init_logging(&config.logging);

    let bind_addr = config.server.bind_addr.clone();
    let state = build_state(config).await?;

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to bind {}", bind_addr))?;
    info!(bind_addr = %bind_addr, "Payroll server listening");

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .into_diagnostic()?;

    info!("Payroll server stopped");
    Ok(())
}

/// `RUST_LOG` takes precedence over the configured level.
fn init_logging(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn build_state(config: ServiceConfig) -> Result<AppState> {
    match config.storage.backend {
        StorageBackend::Memory => {
            warn!(
                "Using in-memory storage; row locks and idempotency keys are local to this process"
            );
            let store = Arc::new(MemoryStore::new());
            Ok(AppState::from_stores(store.clone(), store, config))
        }
        StorageBackend::Postgres => postgres_state(config).await,
    }
}

#[cfg(feature = "postgres")]
async fn postgres_state(config: ServiceConfig) -> Result<AppState> {
    use payroll_core::store::PgStore;

    let url = config
        .storage
        .database_url
        .clone()
        .ok_or_else(|| {
            miette::miette!("storage.database_url is required for the postgres backend")
        })?;
    let store = PgStore::connect(&url, config.storage.max_connections)
        .await
        .into_diagnostic()
        .wrap_err("failed to connect to postgres")?;
    store.migrate().await.into_diagnostic()?;
    info!(max_connections = config.storage.max_connections, "Connected to postgres");

    let store = Arc::new(store);
    Ok(AppState::from_stores(store.clone(), store, config))
}

#[cfg(not(feature = "postgres"))]
async fn postgres_state(_config: ServiceConfig) -> Result<AppState> {
    Err(miette::miette!(
        "storage.backend is postgres but this binary was built without the `postgres` feature"
    ))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
