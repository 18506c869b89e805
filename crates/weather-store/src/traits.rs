//! Async store traits and the SQLite-backed implementation.
//!
//! Services depend on [`ReportStore`] and [`WeatherCacheStore`] rather than a
//! concrete backend, so the SQLite [`SharedStore`] and the in-memory
//! [`MemoryStore`](crate::MemoryStore) are interchangeable.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use time::{Duration, OffsetDateTime};
use tokio::sync::Mutex;

use weather_types::{WeatherCacheEntry, WeatherReport};

use crate::error::Result;
use crate::models::ReportPage;
use crate::queries::ReportQuery;
use crate::store::Store;

/// Window, in minutes on either side, used for cache lookups when the
/// caller has no stronger requirement.
pub const DEFAULT_CACHE_WINDOW_MINUTES: i64 = 10;

/// Half-width of a cache lookup window. Negative widths count as their
/// magnitude and oversized ones saturate.
pub(crate) fn window_span(window_minutes: i64) -> Duration {
    Duration::minutes(window_minutes.saturating_abs().min(i64::MAX / 60))
}

/// Persistence for generated reports.
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Persist a report, returning the assigned id.
    async fn insert(&self, report: &WeatherReport) -> Result<String>;

    /// Every report, newest timestamp first.
    async fn find_all(&self) -> Result<Vec<WeatherReport>>;

    /// Look up one report. Absent ids yield [`Error::NotFound`](crate::Error::NotFound).
    async fn find_by_id(&self, id: &str) -> Result<WeatherReport>;

    /// One filtered, sorted page plus the filtered total.
    async fn find_paginated(&self, query: &ReportQuery) -> Result<ReportPage>;

    /// Total number of reports.
    async fn count(&self) -> Result<u64>;
}

/// Persistence for upstream readings kept for reuse.
#[async_trait]
pub trait WeatherCacheStore: Send + Sync {
    /// Persist an entry, returning the assigned id.
    async fn save(&self, entry: &WeatherCacheEntry) -> Result<String>;

    /// Newest entry by timestamp whose expiry is after `now`.
    async fn find_latest_valid(&self, now: OffsetDateTime) -> Result<Option<WeatherCacheEntry>>;

    /// Closest entry with a timestamp within `window_minutes` of `timestamp`.
    ///
    /// Expired entries still match.
    async fn find_by_timestamp_window(
        &self,
        timestamp: OffsetDateTime,
        window_minutes: i64,
    ) -> Result<Option<WeatherCacheEntry>>;

    /// Remove entries whose expiry is at or before `now`, returning how many.
    async fn delete_expired(&self, now: OffsetDateTime) -> Result<u64>;
}

/// A [`Store`] shared between tasks.
///
/// Cloning is cheap; every clone uses the same connection.
#[derive(Clone)]
pub struct SharedStore {
    inner: Arc<Mutex<Store>>,
}

impl SharedStore {
    /// Wrap an opened store.
    pub fn new(store: Store) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Store::open(path).map(Self::new)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        Store::open_in_memory().map(Self::new)
    }
}

#[async_trait]
impl ReportStore for SharedStore {
    async fn insert(&self, report: &WeatherReport) -> Result<String> {
        self.inner.lock().await.insert_report(report)
    }

    async fn find_all(&self) -> Result<Vec<WeatherReport>> {
        self.inner.lock().await.list_reports()
    }

    async fn find_by_id(&self, id: &str) -> Result<WeatherReport> {
        self.inner.lock().await.get_report(id)
    }

    async fn find_paginated(&self, query: &ReportQuery) -> Result<ReportPage> {
        self.inner.lock().await.query_reports(query)
    }

    async fn count(&self) -> Result<u64> {
        self.inner.lock().await.count_reports()
    }
}

#[async_trait]
impl WeatherCacheStore for SharedStore {
    async fn save(&self, entry: &WeatherCacheEntry) -> Result<String> {
        self.inner.lock().await.save_cache_entry(entry)
    }

    async fn find_latest_valid(&self, now: OffsetDateTime) -> Result<Option<WeatherCacheEntry>> {
        self.inner.lock().await.latest_valid_cache(now)
    }

    async fn find_by_timestamp_window(
        &self,
        timestamp: OffsetDateTime,
        window_minutes: i64,
    ) -> Result<Option<WeatherCacheEntry>> {
        self.inner
            .lock()
            .await
            .cache_in_window(timestamp, window_span(window_minutes))
    }

    async fn delete_expired(&self, now: OffsetDateTime) -> Result<u64> {
        let deleted = self.inner.lock().await.delete_expired_cache(now)?;
        Ok(deleted as u64)
    }
}
