//! Application state shared across handlers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use time::OffsetDateTime;
use tokio::sync::{RwLock, watch};

use weather_store::WeatherCacheStore;

use crate::config::Config;
use crate::reports::ReportService;

/// Shared application state.
pub struct AppState {
    /// Report operations.
    pub service: ReportService,
    /// Cache store, swept in the background.
    pub cache: Arc<dyn WeatherCacheStore>,
    /// Configuration the server was started with.
    pub config: Config,
    /// Cache sweeper control state.
    pub sweeper: SweeperState,
}

impl AppState {
    /// Create new application state.
    pub fn new(service: ReportService, cache: Arc<dyn WeatherCacheStore>, config: Config) -> Arc<Self> {
        Arc::new(Self {
            service,
            cache,
            config,
            sweeper: SweeperState::new(),
        })
    }
}

/// State for tracking and controlling the cache sweeper.
pub struct SweeperState {
    running: AtomicBool,
    deleted_total: AtomicU64,
    last_sweep_at: RwLock<Option<OffsetDateTime>>,
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
}

impl SweeperState {
    pub fn new() -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        Self {
            running: AtomicBool::new(false),
            deleted_total: AtomicU64::new(0),
            last_sweep_at: RwLock::new(None),
            stop_tx,
            stop_rx,
        }
    }

    /// Check if the sweeper is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    /// Total cache entries removed since startup.
    pub fn deleted_total(&self) -> u64 {
        self.deleted_total.load(Ordering::SeqCst)
    }

    /// Time of the last successful sweep.
    pub async fn last_sweep_at(&self) -> Option<OffsetDateTime> {
        *self.last_sweep_at.read().await
    }

    /// Record a successful sweep.
    pub async fn record_sweep(&self, at: OffsetDateTime, deleted: u64) {
        self.deleted_total.fetch_add(deleted, Ordering::SeqCst);
        *self.last_sweep_at.write().await = Some(at);
    }

    /// Get a receiver for the stop signal.
    pub fn subscribe_stop(&self) -> watch::Receiver<bool> {
        self.stop_rx.clone()
    }

    /// Signal the sweeper to stop.
    pub fn signal_stop(&self) {
        let _ = self.stop_tx.send(true);
        self.running.store(false, Ordering::SeqCst);
    }
}

impl Default for SweeperState {
    fn default() -> Self {
        Self::new()
    }
}
