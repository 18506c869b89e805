//! Query builder for paginated report listings.
//!
//! [`ReportQuery`] describes one page of reports: an optional inclusive time
//! range, a sort column and direction, and a limit/offset window. The SQLite
//! store turns it into SQL; the in-memory store applies the same filter and
//! ordering through [`ReportQuery::matches`] and [`ReportQuery::compare`], so
//! both return identical pages for identical data.
//!
//! # Example
//!
//! ```
//! use weather_store::{ReportQuery, Store};
//! use weather_types::SortField;
//! use time::{Duration, OffsetDateTime};
//!
//! let store = Store::open_in_memory()?;
//! let yesterday = OffsetDateTime::now_utc() - Duration::hours(24);
//!
//! let query = ReportQuery::new()
//!     .from(yesterday)
//!     .sort_by(SortField::Temperature)
//!     .ascending()
//!     .limit(20);
//!
//! let page = store.query_reports(&query)?;
//! assert_eq!(page.total_count, 0);
//! assert!(!page.has_more);
//! # Ok::<(), weather_store::Error>(())
//! ```

use std::cmp::Ordering;

use time::OffsetDateTime;
use weather_types::{SortField, SortOrder, WeatherReport};

/// Page size used when none (or zero) is requested.
pub const DEFAULT_PAGE_LIMIT: u32 = 10;

/// Fluent query builder for report pages.
///
/// Defaults: no time bounds, [`DEFAULT_PAGE_LIMIT`] rows from offset 0,
/// ordered by `timestamp` descending.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportQuery {
    /// Include only reports with `timestamp >= from`.
    pub from: Option<OffsetDateTime>,
    /// Include only reports with `timestamp <= to`.
    pub to: Option<OffsetDateTime>,
    /// Maximum rows in the page. Zero means [`DEFAULT_PAGE_LIMIT`].
    pub limit: u32,
    /// Rows to skip before the page starts.
    pub offset: u32,
    /// Column to order by.
    pub sort_by: SortField,
    /// Direction for both the sort column and the id tie-break.
    pub sort_order: SortOrder,
}

impl Default for ReportQuery {
    fn default() -> Self {
        Self {
            from: None,
            to: None,
            limit: DEFAULT_PAGE_LIMIT,
            offset: 0,
            sort_by: SortField::default(),
            sort_order: SortOrder::default(),
        }
    }
}

impl ReportQuery {
    /// Create a query with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Lower bound (inclusive) on the report timestamp.
    pub fn from(mut self, time: OffsetDateTime) -> Self {
        self.from = Some(time);
        self
    }

    /// Upper bound (inclusive) on the report timestamp.
    pub fn to(mut self, time: OffsetDateTime) -> Self {
        self.to = Some(time);
        self
    }

    /// Maximum number of reports in the page.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    /// Skip the first N matching reports.
    ///
    /// Page 3 with 25 per page is `.limit(25).offset(50)`.
    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }

    /// Order by the given column.
    pub fn sort_by(mut self, field: SortField) -> Self {
        self.sort_by = field;
        self
    }

    /// Set the sort direction.
    pub fn sort_order(mut self, order: SortOrder) -> Self {
        self.sort_order = order;
        self
    }

    /// Smallest values first.
    pub fn ascending(self) -> Self {
        self.sort_order(SortOrder::Asc)
    }

    /// Largest (newest) values first.
    pub fn descending(self) -> Self {
        self.sort_order(SortOrder::Desc)
    }

    /// Whether any time bound is set.
    pub fn is_filtered(&self) -> bool {
        self.from.is_some() || self.to.is_some()
    }

    /// The page size actually applied.
    pub fn effective_limit(&self) -> u32 {
        if self.limit == 0 {
            DEFAULT_PAGE_LIMIT
        } else {
            self.limit
        }
    }

    /// Whether a report falls inside the time bounds.
    pub fn matches(&self, report: &WeatherReport) -> bool {
        self.from.is_none_or(|from| report.timestamp >= from)
            && self.to.is_none_or(|to| report.timestamp <= to)
    }

    /// Ordering of two reports under this query's sort, ties broken by id.
    pub fn compare(&self, a: &WeatherReport, b: &WeatherReport) -> Ordering {
        let primary = match self.sort_by {
            SortField::Timestamp => a.timestamp.cmp(&b.timestamp),
            SortField::CreatedAt => a.created_at.cmp(&b.created_at),
            SortField::Temperature => a.reading.temperature.total_cmp(&b.reading.temperature),
            SortField::Pressure => a.reading.pressure.total_cmp(&b.reading.pressure),
            SortField::Humidity => a.reading.humidity.total_cmp(&b.reading.humidity),
            SortField::CloudCover => a.reading.cloud_cover.total_cmp(&b.reading.cloud_cover),
        };
        let ordering = primary.then_with(|| a.id.cmp(&b.id));
        match self.sort_order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    }

    /// Build the SQL WHERE clause and parameters.
    pub(crate) fn build_where(&self) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(from) = self.from {
            conditions.push("timestamp >= ?");
            params.push(Box::new(saturating_nanos(from)));
        }

        if let Some(to) = self.to {
            conditions.push("timestamp <= ?");
            params.push(Box::new(saturating_nanos(to)));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    /// Build the page query.
    ///
    /// Fetches one row past the page so the caller can tell whether more
    /// rows follow without a second query.
    pub(crate) fn build_page_sql(&self) -> String {
        let (where_clause, _) = self.build_where();
        let order = sql_direction(self.sort_order);

        format!(
            "SELECT id, timestamp, temperature, pressure, humidity, cloud_cover, created_at \
             FROM reports {} ORDER BY {} {}, id {} LIMIT {} OFFSET {}",
            where_clause,
            sort_column(self.sort_by),
            order,
            order,
            u64::from(self.effective_limit()) + 1,
            self.offset
        )
    }

    /// Build the count query for the same filter.
    pub(crate) fn build_count_sql(&self) -> String {
        let (where_clause, _) = self.build_where();
        format!("SELECT COUNT(*) FROM reports {}", where_clause)
    }
}

/// Column backing a sort field.
fn sort_column(field: SortField) -> &'static str {
    match field {
        SortField::Timestamp => "timestamp",
        SortField::CreatedAt => "created_at",
        SortField::Temperature => "temperature",
        SortField::Pressure => "pressure",
        SortField::Humidity => "humidity",
        SortField::CloudCover => "cloud_cover",
    }
}

fn sql_direction(order: SortOrder) -> &'static str {
    match order {
        SortOrder::Asc => "ASC",
        SortOrder::Desc => "DESC",
    }
}

/// Unix nanoseconds, clamped to the i64 range.
///
/// A bound beyond the representable range still excludes or includes
/// everything stored, so clamping keeps the filter exact.
fn saturating_nanos(time: OffsetDateTime) -> i64 {
    let nanos = time.unix_timestamp_nanos();
    i64::try_from(nanos).unwrap_or(if nanos < 0 { i64::MIN } else { i64::MAX })
}
