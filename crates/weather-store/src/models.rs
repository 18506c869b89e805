//! Result types returned by store queries.

use weather_types::WeatherReport;

/// One page of reports plus the numbers a pager needs.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReportPage {
    /// Reports in the requested order, at most `limit` of them.
    pub reports: Vec<WeatherReport>,
    /// Reports matching the filter, ignoring limit and offset.
    pub total_count: u64,
    /// Whether at least one matching report follows this page.
    pub has_more: bool,
    /// 1-based page number (`offset / limit + 1`).
    pub current_page: u64,
    /// 1-based position of the first report, or 0 for an empty page.
    pub from_number: u64,
    /// 1-based position of the last report (`offset + len`).
    pub to_number: u64,
}

impl ReportPage {
    /// Assemble a page from already-trimmed rows.
    pub fn new(
        reports: Vec<WeatherReport>,
        total_count: u64,
        has_more: bool,
        limit: u32,
        offset: u32,
    ) -> Self {
        let offset = u64::from(offset);
        let len = reports.len() as u64;
        let limit = u64::from(limit.max(1));

        Self {
            total_count,
            has_more,
            current_page: offset / limit + 1,
            from_number: if len == 0 { 0 } else { offset + 1 },
            to_number: offset + len,
            reports,
        }
    }

    /// Whether the page holds no reports.
    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;
    use weather_types::WeatherReading;

    fn reports(n: usize) -> Vec<WeatherReport> {
        (0..n)
            .map(|i| {
                WeatherReport::new(
                    datetime!(2023-01-01 12:00:00 UTC),
                    WeatherReading::default(),
                    datetime!(2023-01-01 12:00:00 UTC),
                )
                .with_id(format!("r{i}"))
            })
            .collect()
    }

    #[test]
    fn test_second_page_numbers() {
        let page = ReportPage::new(reports(10), 20, false, 10, 10);
        assert_eq!(page.current_page, 2);
        assert_eq!(page.from_number, 11);
        assert_eq!(page.to_number, 20);
        assert!(!page.has_more);
    }

    #[test]
    fn test_empty_page_numbers() {
        let page = ReportPage::new(Vec::new(), 5, false, 10, 30);
        assert!(page.is_empty());
        assert_eq!(page.current_page, 4);
        assert_eq!(page.from_number, 0);
        assert_eq!(page.to_number, 30);
    }

    #[test]
    fn test_partial_page_numbers() {
        let page = ReportPage::new(reports(3), 13, false, 10, 10);
        assert_eq!(page.from_number, 11);
        assert_eq!(page.to_number, 13);
    }
}
