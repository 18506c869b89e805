//! Core types for weather readings and reports.

use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::ParseError;

/// A single weather observation for one instant.
///
/// All values are in metric units as returned by the upstream API with
/// `units=metric`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct WeatherReading {
    /// Temperature in Celsius.
    pub temperature: f64,
    /// Atmospheric pressure in hPa.
    pub pressure: f64,
    /// Relative humidity percentage.
    pub humidity: f64,
    /// Cloud cover percentage.
    pub cloud_cover: f64,
}

impl WeatherReading {
    /// Create a reading from its four measurements.
    #[must_use]
    pub fn new(temperature: f64, pressure: f64, humidity: f64, cloud_cover: f64) -> Self {
        Self {
            temperature,
            pressure,
            humidity,
            cloud_cover,
        }
    }

    /// Field-wise absolute difference between two readings.
    ///
    /// The result is symmetric: `a.deviation(&b) == b.deviation(&a)`.
    ///
    /// # Examples
    ///
    /// ```
    /// use weather_types::WeatherReading;
    ///
    /// let a = WeatherReading::new(25.5, 1013.2, 60.0, 30.0);
    /// let b = WeatherReading::new(26.5, 1014.2, 65.0, 35.0);
    /// let d = a.deviation(&b);
    /// assert!((d.temperature - 1.0).abs() < 1e-9);
    /// assert!((d.humidity - 5.0).abs() < 1e-9);
    /// ```
    #[must_use]
    pub fn deviation(&self, other: &WeatherReading) -> Deviation {
        Deviation {
            temperature: (other.temperature - self.temperature).abs(),
            pressure: (other.pressure - self.pressure).abs(),
            humidity: (other.humidity - self.humidity).abs(),
            cloud_cover: (other.cloud_cover - self.cloud_cover).abs(),
        }
    }
}

/// A persisted weather report bound to a requested timestamp.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct WeatherReport {
    /// Store-assigned identifier. Empty until the report is persisted.
    pub id: String,
    /// The observation instant the caller asked for.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub timestamp: OffsetDateTime,
    /// The weather values for `timestamp`.
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub reading: WeatherReading,
    /// When the report was persisted.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub created_at: OffsetDateTime,
}

impl WeatherReport {
    /// Create an unpersisted report (empty id).
    #[must_use]
    pub fn new(timestamp: OffsetDateTime, reading: WeatherReading, created_at: OffsetDateTime) -> Self {
        Self {
            id: String::new(),
            timestamp,
            reading,
            created_at,
        }
    }

    /// Set the identifier.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

/// A previously fetched reading kept for reuse.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct WeatherCacheEntry {
    /// Store-assigned identifier. Empty until saved.
    pub id: String,
    /// Observation instant the reading corresponds to.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub timestamp: OffsetDateTime,
    /// The cached weather values.
    pub reading: WeatherReading,
    /// When the entry was written.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub created_at: OffsetDateTime,
    /// After this instant the entry no longer counts as valid.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub expires_at: OffsetDateTime,
}

impl WeatherCacheEntry {
    /// Create an unsaved entry that expires `ttl` after `created_at`.
    #[must_use]
    pub fn new(
        timestamp: OffsetDateTime,
        reading: WeatherReading,
        created_at: OffsetDateTime,
        ttl: time::Duration,
    ) -> Self {
        Self {
            id: String::new(),
            timestamp,
            reading,
            created_at,
            expires_at: created_at + ttl,
        }
    }

    /// Whether the entry is still valid at `now`.
    #[must_use]
    pub fn is_valid_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at > now
    }
}

/// Absolute per-field difference between two readings.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Deviation {
    pub temperature: f64,
    pub pressure: f64,
    pub humidity: f64,
    pub cloud_cover: f64,
}

/// Two reports side by side with their deviation.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ComparisonResult {
    pub report1: WeatherReport,
    pub report2: WeatherReport,
    pub deviation: Deviation,
}

/// Column a report listing can be ordered by.
///
/// Parsed from the camelCase names used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum SortField {
    /// Requested observation instant.
    #[default]
    Timestamp,
    /// Persistence instant.
    CreatedAt,
    Temperature,
    Pressure,
    Humidity,
    CloudCover,
}

impl SortField {
    /// Wire name of the field.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SortField::Timestamp => "timestamp",
            SortField::CreatedAt => "createdAt",
            SortField::Temperature => "temperature",
            SortField::Pressure => "pressure",
            SortField::Humidity => "humidity",
            SortField::CloudCover => "cloudCover",
        }
    }
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortField {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "timestamp" => Ok(SortField::Timestamp),
            "createdAt" | "created_at" => Ok(SortField::CreatedAt),
            "temperature" => Ok(SortField::Temperature),
            "pressure" => Ok(SortField::Pressure),
            "humidity" => Ok(SortField::Humidity),
            "cloudCover" | "cloud_cover" => Ok(SortField::CloudCover),
            other => Err(ParseError::UnknownSortField(other.to_string())),
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum SortOrder {
    Asc,
    /// Newest / largest first.
    #[default]
    Desc,
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortOrder::Asc => f.write_str("asc"),
            SortOrder::Desc => f.write_str("desc"),
        }
    }
}

impl FromStr for SortOrder {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            _ => Err(ParseError::UnknownSortOrder(s.to_string())),
        }
    }
}
