use std::sync::Arc;

use feed_courier::config::Config;
use feed_courier::db::Database;
use feed_courier::pipeline::{start_background_check, Pipeline};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "feed_courier=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path =
        std::env::var("FEED_COURIER_CONFIG").unwrap_or_else(|_| "feeds.toml".to_string());
    let config = Config::load(&config_path)?;
    info!(
        "Loaded {} feeds and {} webhooks from {}",
        config.feeds.len(),
        config.webhooks.len(),
        config_path
    );

    // Initialize database
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite:feed_courier.db?mode=rwc".to_string());
    let db = Database::new(&database_url).await?;
    db.initialize().await?;
    info!("Database initialized");

    let db = Arc::new(db);
    let pipeline = Arc::new(Pipeline::from_config(db, &config));
    pipeline.sync_config(&config).await?;

    tokio::select! {
        _ = start_background_check(pipeline, config.refresh_interval) => {}
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Shutting down");
        }
    }

    Ok(())
}
