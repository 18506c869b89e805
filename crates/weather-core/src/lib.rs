//! Upstream weather access for the weather report service.
//!
//! This crate provides:
//!
//! - [`WeatherSource`], the seam between report generation and the weather API
//! - [`OpenWeatherClient`], the production source for OpenWeather One Call 3.0
//! - [`RequestCoalescer`] and [`CoalescingSource`], which collapse concurrent
//!   identical requests into one upstream call
//! - [`MockWeatherSource`], a deterministic source for tests
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use weather_core::{CoalescingSource, OpenWeatherClient, OpenWeatherConfig, WeatherSource};
//!
//! # async fn example() -> Result<(), weather_core::Error> {
//! let client = OpenWeatherClient::new(OpenWeatherConfig {
//!     api_key: std::env::var("OPENWEATHER_API_KEY").unwrap_or_default(),
//!     ..Default::default()
//! })?;
//! let source = CoalescingSource::new(Arc::new(client));
//!
//! // Concurrent callers share one request.
//! let (a, b) = tokio::join!(source.current(), source.current());
//! assert_eq!(a?, b?);
//! # Ok(())
//! # }
//! ```

pub mod coalesce;
pub mod error;
pub mod mock;
pub mod openweather;
pub mod source;

pub use coalesce::{CoalesceKey, CoalescingSource, RequestCoalescer};
pub use error::{Error, Result};
pub use mock::MockWeatherSource;
pub use openweather::{OpenWeatherClient, OpenWeatherConfig};
pub use source::WeatherSource;
