//! Error types for weather-core.
//!
//! Errors are `Clone` so one upstream outcome can be handed to every caller
//! waiting on the same coalesced request. Causes are therefore kept as
//! rendered messages rather than source chains.
//!
//! | Error | Meaning |
//! |-------|---------|
//! | [`Error::UpstreamUnavailable`] | Transport failure, timeout, DNS, TLS |
//! | [`Error::UpstreamBadStatus`] | The API answered with a non-2xx status |
//! | [`Error::UpstreamDecodeError`] | The body did not match the expected shape |
//! | [`Error::NoHistoricalData`] | The time-machine endpoint returned zero points |
//! | [`Error::Abandoned`] | A coalesced request ended without an outcome |
//! | [`Error::InvalidConfig`] | Client settings were rejected before any call |

use thiserror::Error;

/// Errors that can occur while fetching weather.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// The upstream API could not be reached.
    #[error("Weather API unreachable at {url}: {message}")]
    UpstreamUnavailable { url: String, message: String },

    /// The upstream API returned a non-success status.
    #[error("Weather API returned status {status}: {message}")]
    UpstreamBadStatus { status: u16, message: String },

    /// The upstream response body could not be decoded.
    #[error("Failed to decode weather API response: {0}")]
    UpstreamDecodeError(String),

    /// The historical endpoint returned no data points.
    #[error("No historical weather data for {0}")]
    NoHistoricalData(i64),

    /// The in-flight request this caller joined ended without a result.
    #[error("Coalesced weather request for {0} was abandoned")]
    Abandoned(String),

    /// The client configuration is invalid.
    #[error("Invalid weather client configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias using weather-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
