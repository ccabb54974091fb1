//! Raw precipitation observations, as kept by the precipitation service.
//!
//! This is the store behind `POST /observation/` and
//! `GET /observation/{zip}?days={n}`; the report aggregator only ever sees it
//! through the HTTP provider.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, params};
use std::path::Path;
use tracing::debug;

use crate::{
    error::{RecordError, StoreError, ValidationError},
    model::{PrecipitationObservation, WeatherType},
    store::{format_timestamp, parse_decimal, parse_timestamp},
};

#[derive(Debug)]
pub struct ObservationStore {
    conn: Mutex<Connection>,
}

impl ObservationStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS precipitation (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                zip_code TEXT NOT NULL,
                weather_type TEXT NOT NULL,
                amount_inches TEXT NOT NULL,
                created_on TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_precipitation_zip_created
                ON precipitation(zip_code, created_on);
            "#,
        )?;

        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Insert one observation. Its timestamp is already UTC by construction.
    pub fn record(&self, observation: &PrecipitationObservation) -> Result<i64, RecordError> {
        observation.validate().map_err(ValidationError::from)?;

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO precipitation (zip_code, weather_type, amount_inches, created_on)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                observation.zip_code,
                observation.weather_type.as_str(),
                observation.amount_inches.to_string(),
                format_timestamp(&observation.observed_at),
            ],
        )
        .map_err(StoreError::from)?;

        debug!(zip = %observation.zip_code, kind = %observation.weather_type, "recorded precipitation");
        Ok(conn.last_insert_rowid())
    }

    /// Observations for `zip` strictly after `start`, oldest first.
    pub fn since(
        &self,
        zip: &str,
        start: DateTime<Utc>,
    ) -> Result<Vec<PrecipitationObservation>, StoreError> {
        let raw: Vec<(String, String, String, String)> = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare(
                "SELECT zip_code, weather_type, amount_inches, created_on
                 FROM precipitation
                 WHERE zip_code = ?1 AND created_on > ?2
                 ORDER BY created_on ASC, id ASC",
            )?;
            let rows = stmt.query_map(params![zip, format_timestamp(&start)], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        raw.into_iter()
            .map(|(zip_code, kind, amount, created_on)| {
                Ok(PrecipitationObservation {
                    zip_code,
                    weather_type: WeatherType::from(kind),
                    amount_inches: parse_decimal(&amount)?,
                    observed_at: parse_timestamp(&created_on)?,
                })
            })
            .collect()
    }
}
