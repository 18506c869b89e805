//! Trait abstraction over weather data sources.

use async_trait::async_trait;
use time::OffsetDateTime;

use weather_types::WeatherReading;

use crate::error::Result;

/// Something that can produce a weather reading for the configured location.
///
/// Implemented by [`OpenWeatherClient`](crate::OpenWeatherClient) for real
/// traffic, by [`MockWeatherSource`](crate::MockWeatherSource) for tests, and
/// by [`CoalescingSource`](crate::CoalescingSource) as a decorator.
///
/// Each call performs at most one upstream request.
#[async_trait]
pub trait WeatherSource: Send + Sync {
    /// Conditions right now.
    async fn current(&self) -> Result<WeatherReading>;

    /// Conditions at a past instant.
    async fn historical(&self, at: OffsetDateTime) -> Result<WeatherReading>;
}
