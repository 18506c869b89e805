//! In-memory store for testing.
//!
//! [`MemoryStore`] implements [`ReportStore`] and [`WeatherCacheStore`] with
//! the same filtering, ordering and id rules as the SQLite store, without
//! touching disk.
//!
//! # Features
//!
//! - **Failure injection**: fail reads, report writes, or cache writes
//! - **Call counters**: observe how many inserts, saves and cache lookups ran

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use weather_types::{WeatherCacheEntry, WeatherReport};

use crate::error::{Error, Result};
use crate::models::ReportPage;
use crate::queries::ReportQuery;
use crate::store::canonical_id;
use crate::traits::{ReportStore, WeatherCacheStore, window_span};

#[derive(Default)]
struct Tables {
    reports: Vec<WeatherReport>,
    cache: Vec<WeatherCacheEntry>,
}

/// A store that keeps everything in process memory.
///
/// # Example
///
/// ```
/// use weather_store::{MemoryStore, ReportStore};
/// use weather_types::{WeatherReading, WeatherReport};
/// use time::OffsetDateTime;
///
/// #[tokio::main]
/// async fn main() {
///     let store = MemoryStore::new();
///     let now = OffsetDateTime::now_utc();
///     let id = store
///         .insert(&WeatherReport::new(now, WeatherReading::default(), now))
///         .await
///         .unwrap();
///
///     assert_eq!(store.find_by_id(&id).await.unwrap().id, id);
///     assert_eq!(store.insert_count(), 1);
/// }
/// ```
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_reads: AtomicBool,
    fail_report_writes: AtomicBool,
    fail_cache_writes: AtomicBool,
    insert_count: AtomicU32,
    save_count: AtomicU32,
    cache_lookup_count: AtomicU32,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a report under the id it already carries.
    ///
    /// Lets tests seed reports with ids the store would never generate.
    pub fn insert_with_id(&self, report: WeatherReport) {
        self.tables().reports.push(report);
    }

    /// Make every read (report or cache) fail.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::Relaxed);
    }

    /// Make report inserts fail.
    pub fn set_fail_report_writes(&self, fail: bool) {
        self.fail_report_writes.store(fail, Ordering::Relaxed);
    }

    /// Make cache saves fail.
    pub fn set_fail_cache_writes(&self, fail: bool) {
        self.fail_cache_writes.store(fail, Ordering::Relaxed);
    }

    /// Number of successful report inserts.
    pub fn insert_count(&self) -> u32 {
        self.insert_count.load(Ordering::Relaxed)
    }

    /// Number of successful cache saves.
    pub fn save_count(&self) -> u32 {
        self.save_count.load(Ordering::Relaxed)
    }

    /// Number of cache lookups attempted, failed ones included.
    pub fn cache_lookup_count(&self) -> u32 {
        self.cache_lookup_count.load(Ordering::Relaxed)
    }

    /// Snapshot of the cache table.
    pub fn cache_entries(&self) -> Vec<WeatherCacheEntry> {
        self.tables().cache.clone()
    }

    fn check_read(&self, collection: &'static str) -> Result<()> {
        if self.fail_reads.load(Ordering::Relaxed) {
            return Err(Error::read(collection, "injected read failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl ReportStore for MemoryStore {
    async fn insert(&self, report: &WeatherReport) -> Result<String> {
        if self.fail_report_writes.load(Ordering::Relaxed) {
            return Err(Error::write("reports", "injected write failure"));
        }

        let id = Uuid::new_v4().to_string();
        self.tables().reports.push(report.clone().with_id(id.clone()));
        self.insert_count.fetch_add(1, Ordering::Relaxed);
        Ok(id)
    }

    async fn find_all(&self) -> Result<Vec<WeatherReport>> {
        self.check_read("reports")?;
        let mut reports = self.tables().reports.clone();
        reports.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.id.cmp(&a.id)));
        Ok(reports)
    }

    async fn find_by_id(&self, id: &str) -> Result<WeatherReport> {
        self.check_read("reports")?;
        let key = canonical_id(id);
        self.tables()
            .reports
            .iter()
            .find(|r| r.id == key)
            .cloned()
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    async fn find_paginated(&self, query: &ReportQuery) -> Result<ReportPage> {
        self.check_read("reports")?;
        let limit = query.effective_limit();

        let mut matching: Vec<WeatherReport> = self
            .tables()
            .reports
            .iter()
            .filter(|r| query.matches(r))
            .cloned()
            .collect();
        matching.sort_by(|a, b| query.compare(a, b));

        let total_count = matching.len() as u64;
        let mut reports: Vec<WeatherReport> = matching
            .into_iter()
            .skip(query.offset as usize)
            .take(limit as usize + 1)
            .collect();

        let has_more = reports.len() > limit as usize;
        if has_more {
            reports.pop();
        }

        Ok(ReportPage::new(
            reports,
            total_count,
            has_more,
            limit,
            query.offset,
        ))
    }

    async fn count(&self) -> Result<u64> {
        self.check_read("reports")?;
        Ok(self.tables().reports.len() as u64)
    }
}

#[async_trait]
impl WeatherCacheStore for MemoryStore {
    async fn save(&self, entry: &WeatherCacheEntry) -> Result<String> {
        if self.fail_cache_writes.load(Ordering::Relaxed) {
            return Err(Error::write("weather_cache", "injected write failure"));
        }

        let id = Uuid::new_v4().to_string();
        let mut entry = entry.clone();
        entry.id = id.clone();
        self.tables().cache.push(entry);
        self.save_count.fetch_add(1, Ordering::Relaxed);
        Ok(id)
    }

    async fn find_latest_valid(&self, now: OffsetDateTime) -> Result<Option<WeatherCacheEntry>> {
        self.check_read("weather_cache")?;
        Ok(self
            .tables()
            .cache
            .iter()
            .filter(|e| e.is_valid_at(now))
            .max_by(|a, b| {
                a.timestamp
                    .cmp(&b.timestamp)
                    .then_with(|| a.created_at.cmp(&b.created_at))
            })
            .cloned())
    }

    async fn find_by_timestamp_window(
        &self,
        timestamp: OffsetDateTime,
        window_minutes: i64,
    ) -> Result<Option<WeatherCacheEntry>> {
        self.cache_lookup_count.fetch_add(1, Ordering::Relaxed);
        self.check_read("weather_cache")?;

        let window = window_span(window_minutes);
        Ok(self
            .tables()
            .cache
            .iter()
            .filter(|e| (e.timestamp - timestamp).abs() <= window)
            .min_by(|a, b| {
                (a.timestamp - timestamp)
                    .abs()
                    .cmp(&(b.timestamp - timestamp).abs())
                    .then_with(|| b.created_at.cmp(&a.created_at))
                    .then_with(|| b.id.cmp(&a.id))
            })
            .cloned())
    }

    async fn delete_expired(&self, now: OffsetDateTime) -> Result<u64> {
        let mut tables = self.tables();
        let before = tables.cache.len();
        tables.cache.retain(|e| e.is_valid_at(now));
        Ok((before - tables.cache.len()) as u64)
    }
}
