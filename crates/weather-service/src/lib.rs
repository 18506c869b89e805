//! Weather report generation and comparison over HTTP.
//!
//! This crate provides a service that:
//! - Generates weather reports for a fixed location, current or historical
//! - Reuses recently fetched readings from a time-window cache
//! - Coalesces concurrent identical upstream requests into one
//! - Lists reports with filtering, sorting and pagination
//! - Compares two reports field by field
//! - Sweeps expired cache entries in the background
//!
//! # REST API Endpoints
//!
//! - `GET /api/health` - Service health check
//! - `POST /api/reports` - Generate a report (`{"timestamp": "<RFC 3339>"}`, optional)
//! - `GET /api/reports` - All reports, newest first
//! - `GET /api/reports/paginated` - One page of reports with filters
//! - `GET /api/reports/{id}` - A single report
//! - `POST /api/reports/compare` - Compare two reports (`{"reportId1", "reportId2"}`)
//!
//! # Configuration
//!
//! The service reads configuration from `~/.config/weather-report/server.toml`:
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:8080"
//! cors_allowed_origins = ["*"]
//!
//! [weather]
//! api_key = "your-openweather-key"
//!
//! [cache]
//! ttl_secs = 3600
//! sweep_interval_secs = 300
//! ```
//!
//! `OPENWEATHER_API_KEY`, `CORS_ALLOWED_ORIGINS` and `PORT` override the file.

pub mod api;
pub mod comparator;
pub mod config;
pub mod error;
pub mod generator;
pub mod reports;
pub mod state;
pub mod sweeper;

pub use comparator::ReportComparator;
pub use config::{
    CacheConfig, Config, ConfigError, ServerConfig, StorageConfig, ValidationError, WeatherConfig,
};
pub use error::ReportError;
pub use generator::{
    CACHE_HIT_WINDOW_MINUTES, CURRENT_WEATHER_THRESHOLD, DEFAULT_CACHE_TTL, ReportGenerator,
};
pub use reports::ReportService;
pub use state::{AppState, SweeperState};
pub use sweeper::CacheSweeper;
