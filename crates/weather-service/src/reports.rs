//! The report operations exposed over HTTP.

use std::sync::Arc;

use time::OffsetDateTime;

use weather_core::WeatherSource;
use weather_store::{ReportPage, ReportQuery, ReportStore, WeatherCacheStore};
use weather_types::{ComparisonResult, WeatherReport};

use crate::comparator::ReportComparator;
use crate::error::Result;
use crate::generator::ReportGenerator;

/// Generator, comparator and report store behind one handle.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use weather_core::MockWeatherSource;
/// use weather_service::ReportService;
/// use weather_store::MemoryStore;
///
/// #[tokio::main]
/// async fn main() {
///     let store = Arc::new(MemoryStore::new());
///     let service = ReportService::new(
///         Arc::new(MockWeatherSource::new()),
///         store.clone(),
///         store,
///     );
///
///     let report = service.generate_report(None).await.unwrap();
///     let found = service.get_report_by_id(&report.id).await.unwrap();
///     assert_eq!(found, report);
/// }
/// ```
pub struct ReportService {
    generator: ReportGenerator,
    comparator: ReportComparator,
    reports: Arc<dyn ReportStore>,
}

impl ReportService {
    /// Wire a service from a weather source and the two stores.
    pub fn new(
        source: Arc<dyn WeatherSource>,
        reports: Arc<dyn ReportStore>,
        cache: Arc<dyn WeatherCacheStore>,
    ) -> Self {
        Self::from_parts(
            ReportGenerator::new(source, Arc::clone(&reports), cache),
            reports,
        )
    }

    /// Build from an already configured generator.
    pub fn from_parts(generator: ReportGenerator, reports: Arc<dyn ReportStore>) -> Self {
        Self {
            generator,
            comparator: ReportComparator::new(Arc::clone(&reports)),
            reports,
        }
    }

    /// The generator used by [`generate_report`](Self::generate_report).
    pub fn generator(&self) -> &ReportGenerator {
        &self.generator
    }

    pub async fn generate_report(&self, timestamp: Option<OffsetDateTime>) -> Result<WeatherReport> {
        self.generator.generate(timestamp).await
    }

    pub async fn get_all_reports(&self) -> Result<Vec<WeatherReport>> {
        Ok(self.reports.find_all().await?)
    }

    pub async fn get_paginated_reports(&self, query: &ReportQuery) -> Result<ReportPage> {
        Ok(self.reports.find_paginated(query).await?)
    }

    pub async fn get_report_by_id(&self, id: &str) -> Result<WeatherReport> {
        Ok(self.reports.find_by_id(id).await?)
    }

    pub async fn compare_reports(&self, id1: &str, id2: &str) -> Result<ComparisonResult> {
        self.comparator.compare(id1, id2).await
    }
}
