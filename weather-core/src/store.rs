//! Persistence for generated weather reports.
//!
//! Reports are append-only: every save inserts a new row and nothing is ever
//! updated or deleted. `SqliteReportStore` serializes access through a mutex
//! around a single connection, and every query runs on tokio's blocking pool
//! so a slow disk never stalls the runtime's worker threads.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, params};
use rust_decimal::Decimal;
use std::{fmt::Debug, path::Path, str::FromStr, sync::Arc};

use crate::{
    error::StoreError,
    model::{StoredReport, WeatherReport},
};

/// System of record for weather reports.
#[async_trait]
pub trait ReportStore: Send + Sync + Debug {
    /// Durably record `report`, returning its row id.
    async fn save(&self, report: &WeatherReport) -> Result<i64, StoreError>;

    /// All reports for `zip`, newest first.
    async fn reports_for_zip(&self, zip: &str) -> Result<Vec<StoredReport>, StoreError>;

    async fn count(&self) -> Result<usize, StoreError>;
}

#[derive(Debug)]
pub struct SqliteReportStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteReportStore {
    /// Open (or create) the store at `path`. `:memory:` opens a private in-memory database.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS weather_reports (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                zip_code TEXT NOT NULL,
                created_on TEXT NOT NULL,
                average_high_f TEXT,
                average_low_f TEXT,
                rain_fall_total_inches TEXT NOT NULL,
                snow_total_inches TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_weather_reports_zip_created
                ON weather_reports(zip_code, created_on);
            "#,
        )?;

        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&Connection) -> Result<R, StoreError> + Send + 'static,
        R: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || f(&conn.lock())).await?
    }

    fn row_to_report(row: &rusqlite::Row) -> rusqlite::Result<RawReportRow> {
        Ok(RawReportRow {
            id: row.get(0)?,
            zip_code: row.get(1)?,
            created_on: row.get(2)?,
            average_high_f: row.get(3)?,
            average_low_f: row.get(4)?,
            rain_fall_total_inches: row.get(5)?,
            snow_total_inches: row.get(6)?,
        })
    }
}

#[async_trait]
impl ReportStore for SqliteReportStore {
    async fn save(&self, report: &WeatherReport) -> Result<i64, StoreError> {
        let report = report.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO weather_reports
                    (zip_code, created_on, average_high_f, average_low_f, rain_fall_total_inches, snow_total_inches)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    report.zip_code,
                    format_timestamp(&report.created_on),
                    report.average_high_f.map(|v| v.to_string()),
                    report.average_low_f.map(|v| v.to_string()),
                    report.rain_fall_total_inches.to_string(),
                    report.snow_total_inches.to_string(),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    async fn reports_for_zip(&self, zip: &str) -> Result<Vec<StoredReport>, StoreError> {
        let zip = zip.to_string();
        let raw = self
            .with_conn(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, zip_code, created_on, average_high_f, average_low_f,
                            rain_fall_total_inches, snow_total_inches
                     FROM weather_reports
                     WHERE zip_code = ?1
                     ORDER BY created_on DESC, id DESC",
                )?;
                let rows = stmt.query_map(params![zip], Self::row_to_report)?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await?;

        raw.into_iter().map(RawReportRow::into_stored).collect()
    }

    async fn count(&self) -> Result<usize, StoreError> {
        let count: i64 = self
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM weather_reports", [], |row| row.get(0))?)
            })
            .await?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

struct RawReportRow {
    id: i64,
    zip_code: String,
    created_on: String,
    average_high_f: Option<String>,
    average_low_f: Option<String>,
    rain_fall_total_inches: String,
    snow_total_inches: String,
}

impl RawReportRow {
    fn into_stored(self) -> Result<StoredReport, StoreError> {
        Ok(StoredReport {
            id: self.id,
            report: WeatherReport {
                zip_code: self.zip_code,
                created_on: parse_timestamp(&self.created_on)?,
                average_high_f: self.average_high_f.as_deref().map(parse_decimal).transpose()?,
                average_low_f: self.average_low_f.as_deref().map(parse_decimal).transpose()?,
                rain_fall_total_inches: parse_decimal(&self.rain_fall_total_inches)?,
                snow_total_inches: parse_decimal(&self.snow_total_inches)?,
            },
        })
    }
}

/// Fixed-width RFC 3339 so that text ordering matches time ordering.
pub(crate) fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp '{raw}': {e}")))
}

pub(crate) fn parse_decimal(raw: &str) -> Result<Decimal, StoreError> {
    Decimal::from_str(raw).map_err(|e| StoreError::Corrupt(format!("bad decimal '{raw}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn report(zip: &str, created_on: DateTime<Utc>) -> WeatherReport {
        WeatherReport {
            zip_code: zip.into(),
            created_on,
            average_high_f: Some(dec!(75.0)),
            average_low_f: None,
            rain_fall_total_inches: dec!(1.5),
            snow_total_inches: dec!(0),
        }
    }

    #[tokio::test]
    async fn save_then_read_back() {
        let store = SqliteReportStore::in_memory().unwrap();
        let when = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();

        let id = store.save(&report("12345", when)).await.unwrap();
        let stored = store.reports_for_zip("12345").await.unwrap();

        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, id);
        assert_eq!(stored[0].report, report("12345", when));
    }

    #[tokio::test]
    async fn reports_are_append_only_and_newest_first() {
        let store = SqliteReportStore::in_memory().unwrap();
        let first = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let second = first + Duration::hours(1);

        let a = store.save(&report("12345", first)).await.unwrap();
        let b = store.save(&report("12345", second)).await.unwrap();
        store.save(&report("99999", second)).await.unwrap();

        assert_ne!(a, b);
        assert_eq!(store.count().await.unwrap(), 3);

        let stored = store.reports_for_zip("12345").await.unwrap();
        let ids: Vec<i64> = stored.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![b, a]);
    }

    #[tokio::test]
    async fn unknown_zip_has_no_reports() {
        let store = SqliteReportStore::in_memory().unwrap();
        assert!(store.reports_for_zip("00000").await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_saves_all_land() {
        let store = Arc::new(SqliteReportStore::in_memory().unwrap());
        let when = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                let report = report("12345", when + Duration::minutes(i));
                tokio::spawn(async move { store.save(&report).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(store.count().await.unwrap(), 8);
        assert_eq!(store.reports_for_zip("12345").await.unwrap().len(), 8);
    }

    #[test]
    fn timestamps_sort_as_text() {
        let early = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let late = early + Duration::nanoseconds(1);
        assert!(format_timestamp(&early) < format_timestamp(&late));
    }

    #[test]
    fn corrupt_values_are_reported() {
        assert!(matches!(parse_decimal("abc"), Err(StoreError::Corrupt(_))));
        assert!(matches!(parse_timestamp("2024-13-01"), Err(StoreError::Corrupt(_))));
    }
}
