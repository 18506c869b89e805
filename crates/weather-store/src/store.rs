//! Main store implementation.

use std::path::Path;

use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row};
use time::{Duration, OffsetDateTime};
use tracing::{debug, info};
use uuid::Uuid;

use weather_types::{WeatherCacheEntry, WeatherReading, WeatherReport};

use crate::error::{Error, Result};
use crate::models::ReportPage;
use crate::queries::ReportQuery;
use crate::schema;

const REPORTS: &str = "reports";
const WEATHER_CACHE: &str = "weather_cache";

/// SQLite-based store for weather reports and cached readings.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        info!("Opening database at {}", path.display());
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        schema::initialize(&conn)?;

        Ok(Self { conn })
    }

    /// Open the default database location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_db_path())
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    // === Report operations ===

    /// Persist a report and return its newly assigned id.
    ///
    /// Any id already set on `report` is ignored.
    pub fn insert_report(&self, report: &WeatherReport) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let timestamp = to_nanos(report.timestamp)?;
        let created_at = to_nanos(report.created_at)?;

        self.conn
            .execute(
                "INSERT INTO reports (id, timestamp, temperature, pressure, humidity, cloud_cover, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    id,
                    timestamp,
                    report.reading.temperature,
                    report.reading.pressure,
                    report.reading.humidity,
                    report.reading.cloud_cover,
                    created_at
                ],
            )
            .map_err(|e| Error::write(REPORTS, e))?;

        debug!(id = %id, "Inserted report");
        Ok(id)
    }

    /// All reports, newest timestamp first.
    pub fn list_reports(&self) -> Result<Vec<WeatherReport>> {
        let read = |e: rusqlite::Error| Error::read(REPORTS, e);

        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, timestamp, temperature, pressure, humidity, cloud_cover, created_at
                 FROM reports ORDER BY timestamp DESC, id DESC",
            )
            .map_err(read)?;

        let reports = stmt
            .query_map([], row_to_report)
            .map_err(read)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(read)?;

        Ok(reports)
    }

    /// Look up one report.
    ///
    /// Ids that parse as a UUID are matched in canonical hyphenated form,
    /// anything else by exact string equality.
    pub fn get_report(&self, id: &str) -> Result<WeatherReport> {
        let key = canonical_id(id);

        self.conn
            .query_row(
                "SELECT id, timestamp, temperature, pressure, humidity, cloud_cover, created_at
                 FROM reports WHERE id = ?",
                [&key],
                row_to_report,
            )
            .optional()
            .map_err(|e| Error::read(REPORTS, e))?
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// One filtered, sorted page of reports with the filtered total.
    pub fn query_reports(&self, query: &ReportQuery) -> Result<ReportPage> {
        let read = |e: rusqlite::Error| Error::read(REPORTS, e);
        let limit = query.effective_limit();
        let (_, params) = query.build_where();
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let sql = query.build_page_sql();
        debug!(%sql, "Querying reports");

        let mut stmt = self.conn.prepare(&sql).map_err(read)?;
        let mut reports = stmt
            .query_map(param_refs.as_slice(), row_to_report)
            .map_err(read)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(read)?;

        let has_more = reports.len() > limit as usize;
        if has_more {
            reports.pop();
        }

        let total_count: i64 = self
            .conn
            .query_row(&query.build_count_sql(), param_refs.as_slice(), |row| {
                row.get(0)
            })
            .map_err(read)?;

        Ok(ReportPage::new(
            reports,
            total_count.max(0) as u64,
            has_more,
            limit,
            query.offset,
        ))
    }

    /// Total number of stored reports.
    pub fn count_reports(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM reports", [], |row| row.get(0))
            .map_err(|e| Error::read(REPORTS, e))?;
        Ok(count.max(0) as u64)
    }

    // === Weather cache operations ===

    /// Persist a cache entry and return its newly assigned id.
    pub fn save_cache_entry(&self, entry: &WeatherCacheEntry) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let timestamp = to_nanos(entry.timestamp)?;
        let created_at = to_nanos(entry.created_at)?;
        let expires_at = to_nanos(entry.expires_at)?;

        self.conn
            .execute(
                "INSERT INTO weather_cache
                    (id, timestamp, temperature, pressure, humidity, cloud_cover, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    id,
                    timestamp,
                    entry.reading.temperature,
                    entry.reading.pressure,
                    entry.reading.humidity,
                    entry.reading.cloud_cover,
                    created_at,
                    expires_at
                ],
            )
            .map_err(|e| Error::write(WEATHER_CACHE, e))?;

        debug!(id = %id, "Cached weather reading");
        Ok(id)
    }

    /// The newest entry (by timestamp) that has not expired at `now`.
    pub fn latest_valid_cache(&self, now: OffsetDateTime) -> Result<Option<WeatherCacheEntry>> {
        let now = to_nanos(now)?;

        self.conn
            .query_row(
                "SELECT id, timestamp, temperature, pressure, humidity, cloud_cover, created_at, expires_at
                 FROM weather_cache WHERE expires_at > ?
                 ORDER BY timestamp DESC, created_at DESC LIMIT 1",
                [now],
                row_to_cache_entry,
            )
            .optional()
            .map_err(|e| Error::read(WEATHER_CACHE, e))
    }

    /// The entry closest to `timestamp` within `window` on either side.
    ///
    /// Expiry is not considered. Among entries equally close, the most
    /// recently created wins, then the highest id.
    pub fn cache_in_window(
        &self,
        timestamp: OffsetDateTime,
        window: Duration,
    ) -> Result<Option<WeatherCacheEntry>> {
        let center = to_nanos(timestamp)?;
        let span = window.whole_nanoseconds().abs();
        let low = clamp_nanos(i128::from(center) - span);
        let high = clamp_nanos(i128::from(center) + span);

        self.conn
            .query_row(
                "SELECT id, timestamp, temperature, pressure, humidity, cloud_cover, created_at, expires_at
                 FROM weather_cache WHERE timestamp BETWEEN ?1 AND ?2
                 ORDER BY ABS(timestamp - ?3) ASC, created_at DESC, id DESC LIMIT 1",
                [low, high, center],
                row_to_cache_entry,
            )
            .optional()
            .map_err(|e| Error::read(WEATHER_CACHE, e))
    }

    /// Delete entries whose expiry is at or before `now`.
    ///
    /// Returns the number of rows removed.
    pub fn delete_expired_cache(&self, now: OffsetDateTime) -> Result<usize> {
        let now = to_nanos(now)?;
        let deleted = self
            .conn
            .execute("DELETE FROM weather_cache WHERE expires_at <= ?", [now])
            .map_err(|e| Error::write(WEATHER_CACHE, e))?;

        if deleted > 0 {
            info!("Deleted {} expired cache entries", deleted);
        }
        Ok(deleted)
    }
}

/// Key used to look up a caller-supplied id.
pub(crate) fn canonical_id(id: &str) -> String {
    match Uuid::parse_str(id) {
        Ok(uuid) => uuid.hyphenated().to_string(),
        Err(_) => id.to_string(),
    }
}

/// Whether `time` falls within the range the store can persist
/// (roughly 1677 to 2262).
pub fn is_storable_timestamp(time: OffsetDateTime) -> bool {
    to_nanos(time).is_ok()
}

fn to_nanos(time: OffsetDateTime) -> Result<i64> {
    i64::try_from(time.unix_timestamp_nanos()).map_err(|_| Error::InvalidTimestamp(time.to_string()))
}

fn clamp_nanos(nanos: i128) -> i64 {
    nanos.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
}

fn from_nanos(row: &Row<'_>, idx: usize) -> rusqlite::Result<OffsetDateTime> {
    let nanos: i64 = row.get(idx)?;
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(nanos))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(e)))
}

fn row_to_reading(row: &Row<'_>, first: usize) -> rusqlite::Result<WeatherReading> {
    Ok(WeatherReading {
        temperature: row.get(first)?,
        pressure: row.get(first + 1)?,
        humidity: row.get(first + 2)?,
        cloud_cover: row.get(first + 3)?,
    })
}

fn row_to_report(row: &Row<'_>) -> rusqlite::Result<WeatherReport> {
    Ok(WeatherReport {
        id: row.get(0)?,
        timestamp: from_nanos(row, 1)?,
        reading: row_to_reading(row, 2)?,
        created_at: from_nanos(row, 6)?,
    })
}

fn row_to_cache_entry(row: &Row<'_>) -> rusqlite::Result<WeatherCacheEntry> {
    Ok(WeatherCacheEntry {
        id: row.get(0)?,
        timestamp: from_nanos(row, 1)?,
        reading: row_to_reading(row, 2)?,
        created_at: from_nanos(row, 6)?,
        expires_at: from_nanos(row, 7)?,
    })
}
