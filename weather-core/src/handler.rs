//! Request boundary for the report and precipitation services.
//!
//! Handlers validate input, delegate, and turn the outcome into a
//! [`HandlerResponse`]; the HTTP layer only has to copy status and body.

use chrono::Utc;
use reqwest::StatusCode;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, warn};

use crate::{
    aggregator::{ReportBuilder, window_start},
    error::{RecordError, StoreError, ValidationError},
    model::PrecipitationObservation,
    observations::ObservationStore,
    provider::decode_record,
};

pub const MIN_DAYS: i64 = 1;
pub const MAX_DAYS: i64 = 30;

/// Accept `days` only when present and within `MIN_DAYS..=MAX_DAYS`.
pub fn validate_days(days: Option<i64>) -> Result<u32, ValidationError> {
    match days {
        Some(d) if (MIN_DAYS..=MAX_DAYS).contains(&d) => {
            u32::try_from(d).map_err(|_| ValidationError::Days { min: MIN_DAYS, max: MAX_DAYS })
        }
        _ => Err(ValidationError::Days { min: MIN_DAYS, max: MAX_DAYS }),
    }
}

/// Accept a zip with surrounding whitespace trimmed, rejecting a blank one.
pub fn validate_zip(zip: &str) -> Result<&str, ValidationError> {
    let zip = zip.trim();
    if zip.is_empty() { Err(ValidationError::EmptyZip) } else { Ok(zip) }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Empty,
    Text(String),
    Json(serde_json::Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct HandlerResponse {
    pub status: StatusCode,
    pub body: ResponseBody,
}

impl HandlerResponse {
    pub fn ok_json<T: Serialize>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(json) => Self { status: StatusCode::OK, body: ResponseBody::Json(json) },
            Err(e) => {
                error!(error = %e, "failed to serialize response");
                Self::server_error("Failed to serialize response")
            }
        }
    }

    pub fn ok_empty() -> Self {
        Self { status: StatusCode::OK, body: ResponseBody::Empty }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self { status: StatusCode::BAD_REQUEST, body: ResponseBody::Text(message.into()) }
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self { status: StatusCode::INTERNAL_SERVER_ERROR, body: ResponseBody::Text(message.into()) }
    }
}

impl From<ValidationError> for HandlerResponse {
    fn from(value: ValidationError) -> Self {
        HandlerResponse::bad_request(value.to_string())
    }
}

/// `GET /weather-report/{zip}?days={n}`
#[derive(Debug, Clone)]
pub struct ReportHandler {
    builder: Arc<dyn ReportBuilder>,
}

impl ReportHandler {
    pub fn new(builder: Arc<dyn ReportBuilder>) -> Self {
        Self { builder }
    }

    pub async fn weather_report(&self, zip: &str, days: Option<i64>) -> HandlerResponse {
        let (zip, days) = match validate_zip(zip).and_then(|zip| Ok((zip, validate_days(days)?))) {
            Ok(valid) => valid,
            Err(e) => return e.into(),
        };

        match self.builder.build_weekly_report(zip, days).await {
            Ok(report) => HandlerResponse::ok_json(&report),
            Err(e) => {
                error!(zip, days, error = %e, "report request failed");
                HandlerResponse::server_error(e.to_string())
            }
        }
    }
}

/// `GET /observation/{zip}?days={n}` and `POST /observation/`
#[derive(Debug, Clone)]
pub struct PrecipitationHandler {
    store: Arc<ObservationStore>,
}

impl PrecipitationHandler {
    pub fn new(store: Arc<ObservationStore>) -> Self {
        Self { store }
    }

    pub async fn query(&self, zip: &str, days: Option<i64>) -> HandlerResponse {
        let (zip, days) = match validate_zip(zip).and_then(|zip| Ok((zip, validate_days(days)?))) {
            Ok(valid) => valid,
            Err(e) => return e.into(),
        };

        let store = Arc::clone(&self.store);
        let (owned_zip, start) = (zip.to_string(), window_start(Utc::now(), days));
        let found = tokio::task::spawn_blocking(move || store.since(&owned_zip, start))
            .await
            .unwrap_or_else(|e| Err(StoreError::from(e)));

        match found {
            Ok(observations) => HandlerResponse::ok_json(&observations),
            Err(e) => {
                error!(zip, error = %e, "precipitation query failed");
                HandlerResponse::server_error(e.to_string())
            }
        }
    }

    /// Record one observation from a JSON body. Field names match in any
    /// case, as on the provider side. The timestamp may carry any offset; it
    /// is stored as UTC.
    pub async fn ingest(&self, body: &str) -> HandlerResponse {
        let observation = match serde_json::from_str(body).and_then(decode_record::<PrecipitationObservation>) {
            Ok(observation) => observation,
            Err(e) => {
                warn!(error = %e, "rejected malformed observation");
                return ValidationError::InvalidObservation(e.to_string()).into();
            }
        };

        let store = Arc::clone(&self.store);
        let recorded = tokio::task::spawn_blocking(move || store.record(&observation))
            .await
            .unwrap_or_else(|e| Err(StoreError::from(e).into()));

        match recorded {
            Ok(_) => HandlerResponse::ok_empty(),
            Err(RecordError::Invalid(e)) => e.into(),
            Err(RecordError::Store(e)) => {
                error!(error = %e, "failed to record observation");
                HandlerResponse::server_error(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::AggregateError, model::WeatherReport};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct CountingBuilder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ReportBuilder for CountingBuilder {
        async fn build_weekly_report(&self, zip: &str, _days: u32) -> Result<WeatherReport, AggregateError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(WeatherReport {
                zip_code: zip.to_string(),
                created_on: Utc::now(),
                average_high_f: Some(dec!(75.0)),
                average_low_f: Some(dec!(55.0)),
                rain_fall_total_inches: dec!(1.5),
                snow_total_inches: dec!(2.0),
            })
        }
    }

    fn report_handler() -> (ReportHandler, Arc<CountingBuilder>) {
        let builder = Arc::new(CountingBuilder::default());
        (ReportHandler::new(builder.clone()), builder)
    }

    #[test]
    fn days_bounds() {
        assert_eq!(validate_days(Some(1)), Ok(1));
        assert_eq!(validate_days(Some(30)), Ok(30));
        for bad in [None, Some(0), Some(31), Some(-3), Some(i64::MAX)] {
            assert!(validate_days(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[tokio::test]
    async fn invalid_days_never_reach_the_aggregator() {
        let (handler, builder) = report_handler();

        for bad in [None, Some(0), Some(31), Some(-1)] {
            let response = handler.weather_report("12345", bad).await;
            assert_eq!(response.status, StatusCode::BAD_REQUEST);
            assert!(matches!(response.body, ResponseBody::Text(ref msg) if msg.contains("between 1 and 30")));
        }

        assert_eq!(builder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn blank_zip_is_a_client_error() {
        let (handler, builder) = report_handler();
        let response = handler.weather_report("  ", Some(7)).await;

        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(builder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn valid_request_returns_the_report() {
        let (handler, builder) = report_handler();
        let response = handler.weather_report("12345", Some(7)).await;

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(builder.calls.load(Ordering::SeqCst), 1);

        let ResponseBody::Json(json) = response.body else {
            panic!("expected a JSON body");
        };
        assert_eq!(json["zipCode"], "12345");
        assert_eq!(json["averageHighF"], 75.0);
        assert_eq!(json["rainFallTotalInches"], 1.5);
    }

    fn precipitation_handler() -> PrecipitationHandler {
        PrecipitationHandler::new(Arc::new(ObservationStore::in_memory().unwrap()))
    }

    #[tokio::test]
    async fn ingest_then_query() {
        let handler = precipitation_handler();
        let when = (Utc::now() - chrono::Duration::hours(1))
            .with_timezone(&chrono::FixedOffset::west_opt(5 * 3600).unwrap())
            .to_rfc3339();
        let body = format!(
            r#"{{"zipCode":"12345","weatherType":"rain","amountInches":0.75,"createdOn":"{when}"}}"#
        );

        let response = handler.ingest(&body).await;
        assert_eq!(response, HandlerResponse::ok_empty());

        let response = handler.query("12345", Some(1)).await;
        assert_eq!(response.status, StatusCode::OK);
        let ResponseBody::Json(json) = response.body else {
            panic!("expected a JSON body");
        };
        let rows = json.as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["amountInches"], 0.75);
        assert!(rows[0]["createdOn"].as_str().unwrap().ends_with('Z'));
    }

    #[tokio::test]
    async fn ingest_rejects_bad_bodies() {
        let handler = precipitation_handler();

        let response = handler.ingest("{not json").await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);

        let negative = r#"{"zipCode":"12345","weatherType":"rain","amountInches":-1,"createdOn":"2024-01-01T00:00:00Z"}"#;
        let response = handler.ingest(negative).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn ingest_accepts_any_field_case() {
        let handler = precipitation_handler();
        let when = (Utc::now() - chrono::Duration::hours(2)).to_rfc3339();
        let body = format!(
            r#"{{"ZipCode":"12345","WeatherType":"Snow","AmountInches":0.5,"CreatedOn":"{when}"}}"#
        );

        let response = handler.ingest(&body).await;
        assert_eq!(response, HandlerResponse::ok_empty());

        let ResponseBody::Json(json) = handler.query("12345", Some(1)).await.body else {
            panic!("expected a JSON body");
        };
        assert_eq!(json[0]["weatherType"], "snow");
        assert_eq!(json[0]["amountInches"], 0.5);
    }

    #[test]
    fn zip_is_trimmed_and_required() {
        assert_eq!(validate_zip(" 12345 "), Ok("12345"));
        assert_eq!(validate_zip(""), Err(ValidationError::EmptyZip));
        assert_eq!(validate_zip("\t"), Err(ValidationError::EmptyZip));
    }

    #[tokio::test]
    async fn query_requires_days() {
        let handler = precipitation_handler();
        let response = handler.query("12345", None).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
    }
}
