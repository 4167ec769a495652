//! ResellBay - Peer-to-peer Marketplace Backend

use anyhow::Result;
use resellbay::config::{self, Config};
use resellbay::idempotency::{self, IdempotencyStore, MemoryIdempotencyStore};
use resellbay::AppState;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(Config::from_env()?);
    let db = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&db).await?;

    let nats = match &config.nats_url {
        Some(url) => match async_nats::connect(url).await {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, order confirmations disabled");
                None
            }
        },
        None => None,
    };

    let store: Arc<dyn IdempotencyStore> =
        Arc::new(MemoryIdempotencyStore::new(config::IDEMPOTENCY_TTL));
    idempotency::spawn_sweeper(store.clone(), config::IDEMPOTENCY_SWEEP_INTERVAL);

    let port = config.port;
    let state = AppState {
        db,
        nats,
        idempotency: store,
        config,
    };
    let app = resellbay::router(state);

    tracing::info!("ResellBay listening on 0.0.0.0:{}", port);
    axum::serve(
        tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?,
        app,
    )
    .await?;
    Ok(())
}
