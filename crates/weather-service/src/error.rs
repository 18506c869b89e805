//! Error types for report generation and comparison.

use thiserror::Error;

/// Errors produced by [`ReportService`](crate::ReportService) operations.
#[derive(Debug, Error)]
pub enum ReportError {
    /// The requested instant cannot be stored. Nothing was fetched.
    #[error("Timestamp {0} is outside the supported range")]
    UnsupportedTimestamp(time::OffsetDateTime),

    /// The upstream weather source failed. Nothing was written.
    #[error("Failed to fetch weather data: {0}")]
    WeatherFetchFailed(#[source] weather_core::Error),

    /// The report could not be stored. The cache was not written either.
    #[error("Failed to save report: {0}")]
    ReportPersistFailed(#[source] weather_store::Error),

    /// Loading the first report of a comparison failed.
    #[error("Failed to get first report: {0}")]
    FirstReportUnavailable(#[source] weather_store::Error),

    /// Loading the second report of a comparison failed.
    #[error("Failed to get second report: {0}")]
    SecondReportUnavailable(#[source] weather_store::Error),

    /// Direct store access failed.
    #[error(transparent)]
    Store(#[from] weather_store::Error),
}

impl ReportError {
    /// Whether the failure comes down to a missing report.
    pub fn is_not_found(&self) -> bool {
        match self {
            ReportError::FirstReportUnavailable(e)
            | ReportError::SecondReportUnavailable(e)
            | ReportError::Store(e) => e.is_not_found(),
            ReportError::UnsupportedTimestamp(_)
            | ReportError::WeatherFetchFailed(_)
            | ReportError::ReportPersistFailed(_) => false,
        }
    }
}

/// Result type for report operations.
pub type Result<T> = std::result::Result<T, ReportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_classification() {
        let missing = || weather_store::Error::NotFound("abc".to_string());

        assert!(ReportError::Store(missing()).is_not_found());
        assert!(ReportError::FirstReportUnavailable(missing()).is_not_found());
        assert!(ReportError::SecondReportUnavailable(missing()).is_not_found());
        assert!(!ReportError::ReportPersistFailed(missing()).is_not_found());
        assert!(
            !ReportError::UnsupportedTimestamp(time::macros::datetime!(2300-01-01 00:00:00 UTC))
                .is_not_found()
        );
        assert!(
            !ReportError::FirstReportUnavailable(weather_store::Error::read("reports", "boom"))
                .is_not_found()
        );
        assert!(
            !ReportError::WeatherFetchFailed(weather_core::Error::NoHistoricalData(0))
                .is_not_found()
        );
    }

    #[test]
    fn test_error_messages_name_the_stage() {
        let err = ReportError::WeatherFetchFailed(weather_core::Error::UpstreamBadStatus {
            status: 401,
            message: "Invalid API key.".to_string(),
        });
        assert!(err.to_string().starts_with("Failed to fetch weather data"));

        let err = ReportError::SecondReportUnavailable(weather_store::Error::NotFound(
            "xyz".to_string(),
        ));
        assert!(err.to_string().starts_with("Failed to get second report"));
    }
}
