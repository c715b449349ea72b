//! Install the default automated response rules
//!
//! Rules are matched by name and trigger type, so running this more than
//! once leaves existing rules (and any edits made to them) untouched.
//!
//! Usage:
//!   DATABASE_URL=postgres://... cargo run --bin seed-default-responses

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use parley_api::{chat::install_default_rules, chat::default_rules, store::PostgresStore};
use parley_shared::db::{create_pool, run_migrations};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let pool = create_pool(&database_url, 2)
        .await
        .context("failed to connect to database")?;
    run_migrations(&pool).await.context("failed to run migrations")?;

    let store = PostgresStore::new(pool);
    let created = install_default_rules(&store).await?;

    println!(
        "Installed {created} of {} default automated responses",
        default_rules().len()
    );

    Ok(())
}
