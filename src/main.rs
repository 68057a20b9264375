use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use upstream_resilience::{
    forecast::{ForecastCache, OpenWeatherClient},
    CacheStore, Config, SystemClock,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "upstream_resilience=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::from_env()?;

    let cache = ForecastCache::new(
        CacheStore::new(config.cache_path.clone()),
        Arc::new(SystemClock::new(config.app_timezone)),
    );

    if std::env::args().skip(1).any(|arg| arg == "--purge-cache") {
        let removed = cache.purge()?;
        tracing::info!(path = %cache.path().display(), removed, "Forecast cache purged");
        return Ok(());
    }

    let weather_client = OpenWeatherClient::new(config.clone())?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling pending requests");
            on_interrupt.cancel();
        }
    });

    let forecast = weather_client
        .get_forecast(&cache, &config.location, &cancel)
        .await?;

    tracing::info!(
        location = %config.location.location,
        source = ?forecast.source,
        "Forecast ready"
    );
    println!("{}", serde_json::to_string_pretty(&forecast)?);

    Ok(())
}
