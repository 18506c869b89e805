//! Mock weather source for testing.
//!
//! [`MockWeatherSource`] implements [`WeatherSource`] without any network
//! access, so report generation and coalescing can be tested
//! deterministically.
//!
//! # Features
//!
//! - **Configurable readings**: separate values for current and historical calls
//! - **Failure injection**: return a chosen [`Error`] from every call
//! - **Latency simulation**: delay each call with `tokio::time::sleep`
//! - **Call counters**: observe how often each endpoint was hit

use std::sync::RwLock;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;

use weather_types::WeatherReading;

use crate::error::{Error, Result};
use crate::source::WeatherSource;

/// A weather source that answers from memory.
///
/// # Example
///
/// ```
/// use weather_core::{MockWeatherSource, WeatherSource};
/// use weather_types::WeatherReading;
///
/// #[tokio::main]
/// async fn main() {
///     let source = MockWeatherSource::new();
///     source.set_current_reading(WeatherReading::new(30.0, 1008.0, 80.0, 75.0));
///
///     let reading = source.current().await.unwrap();
///     assert_eq!(reading.temperature, 30.0);
///     assert_eq!(source.current_calls(), 1);
/// }
/// ```
pub struct MockWeatherSource {
    current: RwLock<WeatherReading>,
    historical: RwLock<WeatherReading>,
    failure: RwLock<Option<Error>>,
    latency_ms: AtomicU64,
    current_calls: AtomicU32,
    historical_calls: AtomicU32,
    last_historical: RwLock<Option<OffsetDateTime>>,
}

impl Default for MockWeatherSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MockWeatherSource {
    /// Create a source with plausible tropical readings and no latency.
    pub fn new() -> Self {
        Self {
            current: RwLock::new(WeatherReading::new(30.0, 1008.0, 75.0, 40.0)),
            historical: RwLock::new(WeatherReading::new(26.5, 1010.0, 85.0, 60.0)),
            failure: RwLock::new(None),
            latency_ms: AtomicU64::new(0),
            current_calls: AtomicU32::new(0),
            historical_calls: AtomicU32::new(0),
            last_historical: RwLock::new(None),
        }
    }

    /// Reading returned by `current()`.
    pub fn current_reading(&self) -> WeatherReading {
        *self.current.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Reading returned by `historical()`.
    pub fn historical_reading(&self) -> WeatherReading {
        *self.historical.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Set the reading returned by `current()`.
    pub fn set_current_reading(&self, reading: WeatherReading) {
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = reading;
    }

    /// Set the reading returned by `historical()`.
    pub fn set_historical_reading(&self, reading: WeatherReading) {
        *self.historical.write().unwrap_or_else(|e| e.into_inner()) = reading;
    }

    /// Make every call fail with `error`, or succeed again with `None`.
    pub fn set_should_fail(&self, error: Option<Error>) {
        *self.failure.write().unwrap_or_else(|e| e.into_inner()) = error;
    }

    /// Set simulated latency.
    ///
    /// Each call sleeps for this duration before answering.
    /// Set to `Duration::ZERO` to disable latency simulation.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Number of `current()` calls.
    pub fn current_calls(&self) -> u32 {
        self.current_calls.load(Ordering::Relaxed)
    }

    /// Number of `historical()` calls.
    pub fn historical_calls(&self) -> u32 {
        self.historical_calls.load(Ordering::Relaxed)
    }

    /// Instant passed to the most recent `historical()` call.
    pub fn last_historical_request(&self) -> Option<OffsetDateTime> {
        *self.last_historical.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Reset both call counters.
    pub fn reset_calls(&self) {
        self.current_calls.store(0, Ordering::Relaxed);
        self.historical_calls.store(0, Ordering::Relaxed);
    }

    async fn simulate(&self) -> Result<()> {
        let latency = self.latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        match self.failure.read().unwrap_or_else(|e| e.into_inner()).clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl WeatherSource for MockWeatherSource {
    async fn current(&self) -> Result<WeatherReading> {
        self.current_calls.fetch_add(1, Ordering::Relaxed);
        self.simulate().await?;
        Ok(self.current_reading())
    }

    async fn historical(&self, at: OffsetDateTime) -> Result<WeatherReading> {
        self.historical_calls.fetch_add(1, Ordering::Relaxed);
        *self.last_historical.write().unwrap_or_else(|e| e.into_inner()) = Some(at);
        self.simulate().await?;
        Ok(self.historical_reading())
    }
}
