//! Weather Service - HTTP API for weather reports.
//!
//! Run with: `cargo run -p weather-service`

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use weather_core::{OpenWeatherClient, WeatherSource};
use weather_service::{AppState, CacheSweeper, Config, ReportGenerator, ReportService, api};
use weather_store::{ReportStore, SharedStore, WeatherCacheStore};

/// Weather Service - generate, list and compare weather reports.
#[derive(Parser, Debug)]
#[command(name = "weather-service")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address (overrides config).
    #[arg(short, long)]
    bind: Option<String>,

    /// Database path (overrides config).
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Disable the background cache sweeper.
    #[arg(long)]
    no_sweeper: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("weather_service=info".parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .init();

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default().unwrap_or_default(),
    };
    config.apply_env_overrides();

    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(db_path) = args.database {
        config.storage.path = db_path;
    }
    config.validate()?;

    if config.weather.api_key.is_empty() {
        warn!("No OpenWeather API key configured; upstream requests will be rejected");
    }

    info!("Opening database at {:?}", config.storage.path);
    let store = SharedStore::open(&config.storage.path)?;
    let reports: Arc<dyn ReportStore> = Arc::new(store.clone());
    let cache: Arc<dyn WeatherCacheStore> = Arc::new(store);

    let source: Arc<dyn WeatherSource> =
        Arc::new(OpenWeatherClient::new(config.weather.client_config())?);
    let generator = ReportGenerator::new(source, Arc::clone(&reports), Arc::clone(&cache))
        .with_cache_ttl(config.cache.ttl());
    let service = ReportService::from_parts(generator, reports);

    let state = AppState::new(service, cache, config.clone());

    if !args.no_sweeper {
        CacheSweeper::new(Arc::clone(&state)).start();
    } else {
        info!("Cache sweeper disabled");
    }

    let app = api::app(Arc::clone(&state));
    let addr: SocketAddr = config.server.bind.parse()?;

    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.sweeper.signal_stop();
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
