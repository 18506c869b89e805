//! Background removal of expired weather cache entries.

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::state::AppState;

/// Deletes expired cache entries on a fixed interval until stopped.
pub struct CacheSweeper {
    state: Arc<AppState>,
}

impl CacheSweeper {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Spawn the sweep loop. Stops when [`SweeperState::signal_stop`] is
    /// called.
    ///
    /// [`SweeperState::signal_stop`]: crate::state::SweeperState::signal_stop
    pub fn start(&self) -> JoinHandle<()> {
        let state = Arc::clone(&self.state);
        let period = state.config.cache.sweep_interval();
        state.sweeper.set_running(true);

        info!("Starting cache sweeper (interval: {}s)", period.as_secs());
        tokio::spawn(async move {
            sweep_loop(state, period).await;
        })
    }
}

async fn sweep_loop(state: Arc<AppState>, period: Duration) {
    let mut stop_rx = state.sweeper.subscribe_stop();
    let mut timer = interval(period.max(Duration::from_secs(1)));
    let mut consecutive_failures = 0u32;

    loop {
        tokio::select! {
            _ = timer.tick() => {}
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    info!("Cache sweeper stopped");
                    break;
                }
                continue;
            }
        }

        match sweep_once(&state, OffsetDateTime::now_utc()).await {
            Ok(deleted) => {
                consecutive_failures = 0;
                debug!("Removed {} expired cache entries", deleted);
            }
            Err(e) => {
                consecutive_failures += 1;
                if consecutive_failures <= 3 {
                    warn!(
                        "Failed to sweep weather cache: {} (attempt {})",
                        e, consecutive_failures
                    );
                } else if consecutive_failures == 4 {
                    error!(
                        "Failed to sweep weather cache after {} attempts, will continue trying silently",
                        consecutive_failures
                    );
                }
            }
        }
    }

    state.sweeper.set_running(false);
}

/// Delete entries expired at `now` and record the sweep.
pub async fn sweep_once(state: &AppState, now: OffsetDateTime) -> weather_store::Result<u64> {
    let deleted = state.cache.delete_expired(now).await?;
    state.sweeper.record_sweep(now, deleted).await;
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;
    use weather_core::MockWeatherSource;
    use weather_store::{MemoryStore, WeatherCacheStore};
    use weather_types::{WeatherCacheEntry, WeatherReading};

    use crate::config::Config;
    use crate::reports::ReportService;

    fn state_with(store: Arc<MemoryStore>, config: Config) -> Arc<AppState> {
        let service = ReportService::new(
            Arc::new(MockWeatherSource::new()),
            store.clone(),
            store.clone(),
        );
        AppState::new(service, store, config)
    }

    fn entry(created_at: OffsetDateTime, ttl: time::Duration) -> WeatherCacheEntry {
        WeatherCacheEntry::new(created_at, WeatherReading::default(), created_at, ttl)
    }

    #[tokio::test]
    async fn test_sweep_once_removes_only_expired() {
        let store = Arc::new(MemoryStore::new());
        let now = datetime!(2023-01-01 12:00:00 UTC);
        store
            .save(&entry(now - time::Duration::hours(2), time::Duration::hours(1)))
            .await
            .unwrap();
        store
            .save(&entry(now - time::Duration::minutes(30), time::Duration::hours(1)))
            .await
            .unwrap();
        let state = state_with(store.clone(), Config::default());

        assert_eq!(sweep_once(&state, now).await.unwrap(), 1);
        assert_eq!(store.cache_entries().len(), 1);
        assert_eq!(state.sweeper.deleted_total(), 1);
        assert_eq!(state.sweeper.last_sweep_at().await, Some(now));

        assert_eq!(sweep_once(&state, now).await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_runs_until_stopped() {
        let store = Arc::new(MemoryStore::new());
        let long_ago = OffsetDateTime::now_utc() - time::Duration::days(1);
        store
            .save(&entry(long_ago, time::Duration::hours(1)))
            .await
            .unwrap();

        let mut config = Config::default();
        config.cache.sweep_interval_secs = 1;
        let state = state_with(store.clone(), config);

        let handle = CacheSweeper::new(Arc::clone(&state)).start();
        assert!(state.sweeper.is_running());

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(store.cache_entries().is_empty());
        assert_eq!(state.sweeper.deleted_total(), 1);
        assert!(state.sweeper.last_sweep_at().await.is_some());

        state.sweeper.signal_stop();
        handle.await.unwrap();
        assert!(!state.sweeper.is_running());
    }
}
