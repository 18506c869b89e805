//! Side-by-side comparison of two stored reports.

use std::sync::Arc;

use tracing::debug;

use weather_store::ReportStore;
use weather_types::ComparisonResult;

use crate::error::{ReportError, Result};

/// Loads two reports and computes how far apart their readings are.
pub struct ReportComparator {
    reports: Arc<dyn ReportStore>,
}

impl ReportComparator {
    pub fn new(reports: Arc<dyn ReportStore>) -> Self {
        Self { reports }
    }

    /// Compare the reports `id1` and `id2`.
    ///
    /// Each deviation field is `|report2 - report1|`. Read-only.
    pub async fn compare(&self, id1: &str, id2: &str) -> Result<ComparisonResult> {
        let report1 = self
            .reports
            .find_by_id(id1)
            .await
            .map_err(ReportError::FirstReportUnavailable)?;
        let report2 = self
            .reports
            .find_by_id(id2)
            .await
            .map_err(ReportError::SecondReportUnavailable)?;

        debug!(%id1, %id2, "Comparing reports");
        let deviation = report1.reading.deviation(&report2.reading);

        Ok(ComparisonResult {
            report1,
            report2,
            deviation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;
    use weather_store::MemoryStore;
    use weather_types::{Deviation, WeatherReading, WeatherReport};

    async fn seeded() -> (Arc<MemoryStore>, String, String) {
        let store = Arc::new(MemoryStore::new());
        let t = datetime!(2023-01-01 12:00:00 UTC);
        let a = store
            .insert(&WeatherReport::new(
                t,
                WeatherReading::new(25.5, 1013.2, 60.0, 30.0),
                t,
            ))
            .await
            .unwrap();
        let b = store
            .insert(&WeatherReport::new(
                t,
                WeatherReading::new(26.5, 1014.2, 65.0, 35.0),
                t,
            ))
            .await
            .unwrap();
        (store, a, b)
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!((actual - expected).abs() < 1e-9, "{actual} != {expected}");
    }

    #[tokio::test]
    async fn test_compare_computes_absolute_deviation() {
        let (store, a, b) = seeded().await;
        let comparator = ReportComparator::new(store);

        let result = comparator.compare(&a, &b).await.unwrap();

        assert_eq!(result.report1.id, a);
        assert_eq!(result.report2.id, b);
        assert_close(result.deviation.temperature, 1.0);
        assert_close(result.deviation.pressure, 1.0);
        assert_close(result.deviation.humidity, 5.0);
        assert_close(result.deviation.cloud_cover, 5.0);
    }

    #[tokio::test]
    async fn test_compare_is_symmetric() {
        let (store, a, b) = seeded().await;
        let comparator = ReportComparator::new(store);

        let ab = comparator.compare(&a, &b).await.unwrap();
        let ba = comparator.compare(&b, &a).await.unwrap();

        assert_eq!(ab.deviation, ba.deviation);
        assert_eq!(ab.report1, ba.report2);
    }

    #[tokio::test]
    async fn test_compare_report_with_itself() {
        let (store, a, _) = seeded().await;
        let comparator = ReportComparator::new(store);

        let result = comparator.compare(&a, &a).await.unwrap();
        assert_eq!(result.deviation, Deviation::default());
    }

    #[tokio::test]
    async fn test_missing_reports_are_attributed() {
        let (store, a, _) = seeded().await;
        let comparator = ReportComparator::new(store);

        let err = comparator.compare("missing", &a).await.unwrap_err();
        assert!(matches!(err, ReportError::FirstReportUnavailable(_)));
        assert!(err.is_not_found());

        let err = comparator.compare(&a, "missing").await.unwrap_err();
        assert!(matches!(err, ReportError::SecondReportUnavailable(_)));
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_read_failure_is_not_not_found() {
        let (store, a, b) = seeded().await;
        store.set_fail_reads(true);
        let comparator = ReportComparator::new(store);

        let err = comparator.compare(&a, &b).await.unwrap_err();
        assert!(matches!(err, ReportError::FirstReportUnavailable(_)));
        assert!(!err.is_not_found());
    }
}
