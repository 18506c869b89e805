//! Persistence for weather reports and cached upstream readings.
//!
//! This crate provides SQLite-based storage for generated weather reports
//! and for the upstream readings kept to avoid repeated API calls.
//!
//! # Features
//!
//! - Store reports with lossless timestamps and UUID identifiers
//! - Filtered, sorted, paginated report queries with total counts
//! - Time-window cache lookups and bulk expiry
//! - Async [`ReportStore`] / [`WeatherCacheStore`] traits with SQLite
//!   ([`SharedStore`]) and in-memory ([`MemoryStore`]) implementations
//!
//! # Example
//!
//! ```no_run
//! use weather_store::{ReportQuery, Store};
//!
//! let store = Store::open_default()?;
//!
//! let page = store.query_reports(&ReportQuery::new().limit(10))?;
//! println!("{} of {} reports", page.reports.len(), page.total_count);
//! # Ok::<(), weather_store::Error>(())
//! ```

mod error;
mod memory;
mod models;
mod queries;
mod schema;
mod store;
mod traits;

pub use error::{Error, Result};
pub use memory::MemoryStore;
pub use models::ReportPage;
pub use queries::{DEFAULT_PAGE_LIMIT, ReportQuery};
pub use store::{Store, is_storable_timestamp};
pub use traits::{DEFAULT_CACHE_WINDOW_MINUTES, ReportStore, SharedStore, WeatherCacheStore};

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/weather-report/data.db`
/// - macOS: `~/Library/Application Support/weather-report/data.db`
/// - Windows: `C:\Users\<user>\AppData\Local\weather-report\data.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("weather-report")
        .join("data.db")
}
