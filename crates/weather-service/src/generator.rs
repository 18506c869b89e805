//! Report generation.
//!
//! A report request first looks for a cached reading close to the requested
//! instant. On a miss the reading is fetched through a coalescing source,
//! persisted as a new report, and written through to the cache.

use std::sync::Arc;

use time::{Duration, OffsetDateTime};
use tracing::{debug, info, warn};

use weather_core::{CoalescingSource, WeatherSource};
use weather_store::{ReportStore, WeatherCacheStore, is_storable_timestamp};
use weather_types::{WeatherCacheEntry, WeatherReading, WeatherReport};

use crate::error::{ReportError, Result};

/// Requests younger than this are served from current conditions.
pub const CURRENT_WEATHER_THRESHOLD: Duration = Duration::minutes(10);

/// Half-width of the window searched for a reusable cached reading.
pub const CACHE_HIT_WINDOW_MINUTES: i64 = 1;

/// How long a written-through reading stays valid.
pub const DEFAULT_CACHE_TTL: Duration = Duration::hours(1);

/// Produces weather reports for requested instants.
pub struct ReportGenerator {
    source: CoalescingSource<dyn WeatherSource>,
    reports: Arc<dyn ReportStore>,
    cache: Arc<dyn WeatherCacheStore>,
    cache_ttl: Duration,
}

impl ReportGenerator {
    /// Create a generator. Upstream calls through `source` are coalesced.
    pub fn new(
        source: Arc<dyn WeatherSource>,
        reports: Arc<dyn ReportStore>,
        cache: Arc<dyn WeatherCacheStore>,
    ) -> Self {
        Self {
            source: CoalescingSource::new(source),
            reports,
            cache,
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }

    /// Set the lifetime of written-through cache entries.
    #[must_use]
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Lifetime of written-through cache entries.
    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    /// Number of upstream requests currently in flight.
    pub fn in_flight(&self) -> usize {
        self.source.coalescer().in_flight()
    }

    /// Generate a report for `timestamp`, or for now when absent.
    pub async fn generate(&self, timestamp: Option<OffsetDateTime>) -> Result<WeatherReport> {
        let now = OffsetDateTime::now_utc();
        self.generate_at(timestamp.unwrap_or(now), now).await
    }

    /// Generate a report for `timestamp` as seen from `now`.
    pub async fn generate_at(
        &self,
        timestamp: OffsetDateTime,
        now: OffsetDateTime,
    ) -> Result<WeatherReport> {
        if !is_storable_timestamp(timestamp) {
            return Err(ReportError::UnsupportedTimestamp(timestamp));
        }

        if let Some(entry) = self.cached(timestamp).await {
            debug!(%timestamp, cache_id = %entry.id, "Serving report from cache");
            return Ok(WeatherReport::new(timestamp, entry.reading, timestamp).with_id(entry.id));
        }

        let reading = self
            .fetch(timestamp, now)
            .await
            .map_err(ReportError::WeatherFetchFailed)?;

        let report = WeatherReport::new(timestamp, reading, now);
        let id = self
            .reports
            .insert(&report)
            .await
            .map_err(ReportError::ReportPersistFailed)?;
        let report = report.with_id(id);

        let entry = WeatherCacheEntry::new(timestamp, reading, now, self.cache_ttl);
        if let Err(e) = self.cache.save(&entry).await {
            warn!(%timestamp, error = %e, "Failed to cache weather reading");
        }

        info!(id = %report.id, %timestamp, "Generated weather report");
        Ok(report)
    }

    async fn cached(&self, timestamp: OffsetDateTime) -> Option<WeatherCacheEntry> {
        match self
            .cache
            .find_by_timestamp_window(timestamp, CACHE_HIT_WINDOW_MINUTES)
            .await
        {
            Ok(entry) => entry,
            Err(e) => {
                warn!(%timestamp, error = %e, "Weather cache lookup failed, fetching upstream");
                None
            }
        }
    }

    async fn fetch(
        &self,
        timestamp: OffsetDateTime,
        now: OffsetDateTime,
    ) -> weather_core::Result<WeatherReading> {
        if now - timestamp < CURRENT_WEATHER_THRESHOLD {
            debug!(%timestamp, "Fetching current weather");
            self.source.current().await
        } else {
            debug!(%timestamp, "Fetching historical weather");
            self.source.historical(timestamp).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    use futures::future::join_all;
    use time::macros::datetime;
    use weather_core::MockWeatherSource;
    use weather_store::MemoryStore;

    const NOW: OffsetDateTime = datetime!(2023-01-01 12:00:00 UTC);

    fn setup() -> (Arc<MockWeatherSource>, Arc<MemoryStore>, ReportGenerator) {
        let source = Arc::new(MockWeatherSource::new());
        let store = Arc::new(MemoryStore::new());
        let generator = ReportGenerator::new(source.clone(), store.clone(), store.clone());
        (source, store, generator)
    }

    #[tokio::test]
    async fn test_recent_timestamp_uses_current_weather() {
        let (source, store, generator) = setup();
        let ts = NOW - Duration::minutes(10) + Duration::seconds(1);

        let report = generator.generate_at(ts, NOW).await.unwrap();

        assert_eq!(source.current_calls(), 1);
        assert_eq!(source.historical_calls(), 0);
        assert_eq!(report.reading, source.current_reading());
        assert_eq!(report.timestamp, ts);
        assert_eq!(report.created_at, NOW);
        assert_eq!(store.find_by_id(&report.id).await.unwrap(), report);
    }

    #[tokio::test]
    async fn test_old_timestamp_uses_historical_weather() {
        let (source, _store, generator) = setup();
        let ts = NOW - Duration::minutes(10);

        let report = generator.generate_at(ts, NOW).await.unwrap();

        assert_eq!(source.current_calls(), 0);
        assert_eq!(source.historical_calls(), 1);
        assert_eq!(source.last_historical_request(), Some(ts));
        assert_eq!(report.reading, source.historical_reading());
    }

    #[tokio::test]
    async fn test_future_timestamp_counts_as_current() {
        let (source, _store, generator) = setup();

        generator
            .generate_at(NOW + Duration::hours(3), NOW)
            .await
            .unwrap();

        assert_eq!(source.current_calls(), 1);
        assert_eq!(source.historical_calls(), 0);
    }

    #[tokio::test]
    async fn test_generate_without_timestamp_uses_now() {
        let (source, _store, generator) = setup();
        let before = OffsetDateTime::now_utc();

        let report = generator.generate(None).await.unwrap();

        assert_eq!(source.current_calls(), 1);
        assert!(report.timestamp >= before);
        assert_eq!(report.timestamp, report.created_at);
    }

    #[tokio::test]
    async fn test_cache_hit_short_circuits() {
        let (source, store, generator) = setup();
        let ts = NOW - Duration::hours(2);
        let cached = WeatherReading::new(21.0, 1001.0, 50.0, 10.0);
        let cache_id = store
            .save(&WeatherCacheEntry::new(
                ts + Duration::seconds(30),
                cached,
                NOW - Duration::minutes(5),
                Duration::hours(1),
            ))
            .await
            .unwrap();

        let report = generator.generate_at(ts, NOW).await.unwrap();

        assert_eq!(report.id, cache_id);
        assert_eq!(report.reading, cached);
        assert_eq!(report.timestamp, ts);
        assert_eq!(report.created_at, ts);
        assert_eq!(source.current_calls() + source.historical_calls(), 0);
        assert_eq!(store.insert_count(), 0);
        assert_eq!(store.save_count(), 1);
    }

    #[tokio::test]
    async fn test_cache_entry_outside_window_is_a_miss() {
        let (source, store, generator) = setup();
        let ts = NOW - Duration::hours(2);
        store
            .save(&WeatherCacheEntry::new(
                ts + Duration::minutes(2),
                WeatherReading::default(),
                NOW,
                Duration::hours(1),
            ))
            .await
            .unwrap();

        generator.generate_at(ts, NOW).await.unwrap();

        assert_eq!(source.historical_calls(), 1);
        assert_eq!(store.insert_count(), 1);
    }

    #[tokio::test]
    async fn test_second_request_hits_written_through_cache() {
        let (source, store, generator) = setup();
        let ts = NOW - Duration::days(1);

        let first = generator.generate_at(ts, NOW).await.unwrap();
        let second = generator.generate_at(ts, NOW).await.unwrap();

        assert_eq!(source.historical_calls(), 1);
        assert_eq!(store.insert_count(), 1);
        assert_eq!(second.reading, first.reading);
        assert_ne!(second.id, first.id);
    }

    #[tokio::test]
    async fn test_write_through_entry_uses_ttl() {
        let (_source, store, generator) = setup();
        let generator = generator.with_cache_ttl(Duration::minutes(15));
        assert_eq!(generator.cache_ttl(), Duration::minutes(15));

        let ts = NOW - Duration::hours(1);
        let report = generator.generate_at(ts, NOW).await.unwrap();

        let entries = store.cache_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].timestamp, ts);
        assert_eq!(entries[0].reading, report.reading);
        assert_eq!(entries[0].created_at, NOW);
        assert_eq!(entries[0].expires_at, NOW + Duration::minutes(15));
    }

    #[tokio::test]
    async fn test_cache_read_failure_is_a_miss() {
        let (source, store, generator) = setup();
        store.set_fail_reads(true);

        let report = generator.generate_at(NOW, NOW).await.unwrap();

        assert_eq!(store.cache_lookup_count(), 1);
        assert_eq!(source.current_calls(), 1);
        assert_eq!(store.insert_count(), 1);
        assert!(!report.id.is_empty());
    }

    #[tokio::test]
    async fn test_source_failure_writes_nothing() {
        let (source, store, generator) = setup();
        source.set_should_fail(Some(weather_core::Error::UpstreamBadStatus {
            status: 401,
            message: "Invalid API key.".to_string(),
        }));

        let err = generator.generate_at(NOW, NOW).await.unwrap_err();

        assert!(matches!(
            err,
            ReportError::WeatherFetchFailed(weather_core::Error::UpstreamBadStatus { status: 401, .. })
        ));
        assert_eq!(store.insert_count(), 0);
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn test_persist_failure_skips_cache_write() {
        let (_source, store, generator) = setup();
        store.set_fail_report_writes(true);

        let err = generator.generate_at(NOW, NOW).await.unwrap_err();

        assert!(matches!(err, ReportError::ReportPersistFailed(_)));
        assert_eq!(store.save_count(), 0);
        assert!(store.cache_entries().is_empty());
    }

    #[tokio::test]
    async fn test_unstorable_timestamp_rejected_before_fetch() {
        let source = Arc::new(MockWeatherSource::new());
        let store = weather_store::SharedStore::open_in_memory().unwrap();
        let generator = ReportGenerator::new(
            source.clone(),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
        );

        for ts in [
            datetime!(2300-01-01 00:00:00 UTC),
            datetime!(1600-01-01 00:00:00 UTC),
        ] {
            let err = generator.generate_at(ts, NOW).await.unwrap_err();
            assert!(matches!(err, ReportError::UnsupportedTimestamp(t) if t == ts));
        }

        assert_eq!(source.current_calls() + source.historical_calls(), 0);
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cache_write_failure_is_swallowed() {
        let (_source, store, generator) = setup();
        store.set_fail_cache_writes(true);

        let report = generator.generate_at(NOW, NOW).await.unwrap();

        assert_eq!(store.find_by_id(&report.id).await.unwrap(), report);
        assert!(store.cache_entries().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_requests_share_one_upstream_call() {
        let (source, store, generator) = setup();
        source.set_latency(StdDuration::from_millis(200));
        let ts = NOW - Duration::days(2);

        let results = join_all((0..8).map(|_| generator.generate_at(ts, NOW))).await;

        assert_eq!(source.historical_calls(), 1);
        assert_eq!(generator.in_flight(), 0);
        assert_eq!(store.insert_count(), 8);
        for result in results {
            assert_eq!(result.unwrap().reading, source.historical_reading());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_failures_reach_every_caller() {
        let (source, store, generator) = setup();
        source.set_latency(StdDuration::from_millis(200));
        source.set_should_fail(Some(weather_core::Error::NoHistoricalData(0)));

        let results = join_all((0..4).map(|_| generator.generate_at(NOW, NOW))).await;

        assert_eq!(source.current_calls(), 1);
        assert_eq!(store.insert_count(), 0);
        for result in results {
            assert!(matches!(
                result,
                Err(ReportError::WeatherFetchFailed(weather_core::Error::NoHistoricalData(0)))
            ));
        }
    }
}
