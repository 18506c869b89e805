//! Shared types for the weather report service.
//!
//! This crate provides the value and entity types used by the store
//! (weather-store), the upstream client (weather-core) and the HTTP service
//! (weather-service).
//!
//! # Features
//!
//! - Weather readings and the per-field deviation between two of them
//! - Persisted reports and cache entries
//! - Sort vocabulary for paginated report listings
//!
//! # Example
//!
//! ```
//! use weather_types::{SortField, SortOrder, WeatherReading};
//!
//! let reading = WeatherReading::new(25.5, 1013.2, 60.0, 30.0);
//! assert_eq!(reading.deviation(&reading).temperature, 0.0);
//!
//! let field: SortField = "cloudCover".parse().unwrap();
//! assert_eq!(field, SortField::CloudCover);
//! assert_eq!("DESC".parse::<SortOrder>().unwrap(), SortOrder::Desc);
//! ```

pub mod error;
pub mod types;

pub use error::{ParseError, ParseResult};
pub use types::{
    ComparisonResult, Deviation, SortField, SortOrder, WeatherCacheEntry, WeatherReading,
    WeatherReport,
};
