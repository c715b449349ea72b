//! Parley API server

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use parley_api::{
    chat::install_default_rules,
    store::{MemoryStore, PostgresStore, RuleStore, SessionStore},
    AppState, Config,
};
use parley_shared::db::{create_pool, run_migrations};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("parley_api=debug,tower_http=debug"));

    let json = std::env::var("LOG_FORMAT")
        .map(|f| f.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn build_stores(config: &Config) -> anyhow::Result<(Arc<dyn SessionStore>, Arc<dyn RuleStore>)> {
    match &config.database_url {
        Some(url) => {
            let pool = create_pool(url, config.database_max_connections)
                .await
                .context("failed to connect to database")?;
            run_migrations(&pool).await.context("failed to run migrations")?;
            tracing::info!(max_connections = config.database_max_connections, "Connected to database");

            let store = Arc::new(PostgresStore::new(pool));
            let sessions: Arc<dyn SessionStore> = store.clone();
            let rules: Arc<dyn RuleStore> = store;
            Ok((sessions, rules))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory stores; nothing will persist");
            let store = Arc::new(MemoryStore::new());
            let installed = install_default_rules(store.as_ref()).await?;
            tracing::info!(rules = installed, "Installed default automated responses");
            let sessions: Arc<dyn SessionStore> = store.clone();
            let rules: Arc<dyn RuleStore> = store;
            Ok((sessions, rules))
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = Config::from_env().context("invalid configuration")?;
    let bind_address = config.bind_address.clone();

    let (sessions, rules) = build_stores(&config).await?;
    let state = AppState::new(config, sessions, rules);
    let app = parley_api::create_router(state.clone());

    let listener = TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {bind_address}"))?;
    tracing::info!(address = %bind_address, "Parley API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    state.scheduler.shutdown();
    tracing::info!("Parley API stopped");

    Ok(())
}
