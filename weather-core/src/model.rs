use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ObservationError;

/// Kind of precipitation carried by an observation.
///
/// Wire values are matched case-insensitively; anything other than rain or
/// snow is kept verbatim so it survives a round trip through the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum WeatherType {
    Rain,
    Snow,
    Other(String),
}

impl WeatherType {
    pub fn as_str(&self) -> &str {
        match self {
            WeatherType::Rain => "rain",
            WeatherType::Snow => "snow",
            WeatherType::Other(kind) => kind.as_str(),
        }
    }
}

impl From<&str> for WeatherType {
    fn from(value: &str) -> Self {
        let trimmed = value.trim();
        if trimmed.eq_ignore_ascii_case("rain") {
            WeatherType::Rain
        } else if trimmed.eq_ignore_ascii_case("snow") {
            WeatherType::Snow
        } else {
            WeatherType::Other(trimmed.to_string())
        }
    }
}

impl From<String> for WeatherType {
    fn from(value: String) -> Self {
        WeatherType::from(value.as_str())
    }
}

impl From<WeatherType> for String {
    fn from(value: WeatherType) -> Self {
        match value {
            WeatherType::Other(kind) => kind,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for WeatherType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One measured precipitation event, as stored by the precipitation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrecipitationObservation {
    pub zip_code: String,
    pub weather_type: WeatherType,
    pub amount_inches: Decimal,
    #[serde(rename = "createdOn", with = "utc_timestamp")]
    pub observed_at: DateTime<Utc>,
}

impl PrecipitationObservation {
    pub fn new(
        zip_code: impl Into<String>,
        weather_type: WeatherType,
        amount_inches: Decimal,
        observed_at: DateTime<Utc>,
    ) -> Result<Self, ObservationError> {
        let observation = Self {
            zip_code: zip_code.into(),
            weather_type,
            amount_inches,
            observed_at,
        };
        observation.validate()?;
        Ok(observation)
    }

    /// Checks the invariants that deserialization alone cannot enforce.
    pub fn validate(&self) -> Result<(), ObservationError> {
        if self.zip_code.trim().is_empty() {
            return Err(ObservationError::EmptyZip);
        }
        if self.amount_inches.is_sign_negative() && !self.amount_inches.is_zero() {
            return Err(ObservationError::NegativeAmount(self.amount_inches));
        }
        Ok(())
    }
}

/// One temperature sample, as served by the temperature service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemperatureObservation {
    pub zip_code: String,
    pub temp_high_f: Decimal,
    pub temp_low_f: Decimal,
    #[serde(rename = "createdOn", with = "utc_timestamp")]
    pub observed_at: DateTime<Utc>,
}

/// Aggregate weather summary for one zip code over a trailing window of days.
///
/// Averages are `None` when the window held no temperature observations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherReport {
    pub zip_code: String,
    #[serde(with = "utc_timestamp")]
    pub created_on: DateTime<Utc>,
    pub average_high_f: Option<Decimal>,
    pub average_low_f: Option<Decimal>,
    pub rain_fall_total_inches: Decimal,
    pub snow_total_inches: Decimal,
}

/// A report as recorded by the report store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredReport {
    pub id: i64,
    #[serde(flatten)]
    pub report: WeatherReport,
}

/// Parse a wire timestamp into UTC.
///
/// Offsets are honoured and converted; timestamps without an offset are taken
/// to already be UTC.
pub fn parse_utc(raw: &str) -> Result<DateTime<Utc>, ObservationError> {
    let raw = raw.trim();

    if let Ok(with_offset) = DateTime::parse_from_rfc3339(raw) {
        return Ok(with_offset.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|_| ObservationError::Timestamp(raw.to_string()))
}

pub(crate) mod utc_timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_utc(&raw).map_err(D::Error::custom)
    }
}
