use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Map, Value};
use std::{fmt, marker::PhantomData, time::Duration};
use tracing::{debug, warn};
use url::Url;

use crate::{
    config::{ProviderEndpoint, observation_url},
    error::ProviderError,
};

use super::{ObservationProvider, ProviderId, WireRecord, decode_record};

/// Client for a provider's `GET /observation/{zip}?days={n}` endpoint.
pub struct HttpProvider<T> {
    base: Url,
    http: Client,
    _record: PhantomData<fn() -> T>,
}

impl<T: WireRecord> HttpProvider<T> {
    pub fn new(endpoint: &ProviderEndpoint, timeout: Duration) -> anyhow::Result<Self> {
        let base = endpoint
            .base_url()
            .with_context(|| format!("Invalid endpoint for provider '{}'", T::PROVIDER))?;

        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { base, http, _record: PhantomData })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }
}

impl<T: WireRecord> fmt::Debug for HttpProvider<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpProvider")
            .field("provider", &T::PROVIDER)
            .field("base", &self.base.as_str())
            .finish()
    }
}

#[async_trait]
impl<T: WireRecord> ObservationProvider<T> for HttpProvider<T> {
    fn id(&self) -> ProviderId {
        T::PROVIDER
    }

    async fn observations(&self, zip: &str, days: u32) -> Result<Vec<T>, ProviderError> {
        let provider = T::PROVIDER;
        let url = observation_url(&self.base, zip, days).ok_or_else(|| {
            ProviderError::InvalidEndpoint { provider, url: self.base.to_string() }
        })?;

        debug!(%provider, %url, "fetching observations");

        let res = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(provider, e))?;

        let status = res.status();
        let body = res.text().await.map_err(|e| ProviderError::from_reqwest(provider, e))?;

        if !status.is_success() {
            warn!(%provider, %status, "provider request failed");
            return Err(ProviderError::Status { provider, status, body: truncate_body(&body) });
        }

        let records = decode_records::<T>(&body)
            .map_err(|source| ProviderError::Decode { provider, source })?;

        debug!(%provider, count = records.len(), "decoded observations");
        Ok(records)
    }
}

/// Decode a JSON array of records, matching field names case-insensitively.
///
/// A literal `null` payload is an empty set; anything else that is not an
/// array of well-formed, valid records is an error.
pub fn decode_records<T: WireRecord>(body: &str) -> Result<Vec<T>, serde_json::Error> {
    let rows: Option<Vec<Map<String, Value>>> = serde_json::from_str(body)?;

    rows.unwrap_or_default().into_iter().map(decode_record::<T>).collect()
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.chars().count() > MAX {
        format!("{}...", body.chars().take(MAX).collect::<String>())
    } else {
        body.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PrecipitationObservation, TemperatureObservation, WeatherType};
    use rust_decimal_macros::dec;

    #[test]
    fn decodes_field_names_in_any_case() {
        let body = r#"[
            {"ZipCode":"12345","WEATHERTYPE":"Snow","amountinches":2.0,"CreatedOn":"2024-01-02T03:04:05Z","id":"abc"}
        ]"#;

        let records = decode_records::<PrecipitationObservation>(body).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].zip_code, "12345");
        assert_eq!(records[0].weather_type, WeatherType::Snow);
        assert_eq!(records[0].amount_inches, dec!(2.0));
    }

    #[test]
    fn null_payload_is_an_empty_set() {
        let records = decode_records::<TemperatureObservation>("null").unwrap();
        assert!(records.is_empty());

        let records = decode_records::<TemperatureObservation>("[]").unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn malformed_payload_is_an_error() {
        assert!(decode_records::<TemperatureObservation>("{\"oops\":true}").is_err());
        assert!(decode_records::<TemperatureObservation>("not json").is_err());
        assert!(decode_records::<TemperatureObservation>(r#"[{"zipCode":"1"}]"#).is_err());
    }

    #[test]
    fn negative_amounts_fail_the_whole_payload() {
        let body = r#"[
            {"zipCode":"12345","weatherType":"rain","amountInches":0.5,"createdOn":"2024-01-02T03:04:05Z"},
            {"zipCode":"12345","weatherType":"rain","amountInches":-2,"createdOn":"2024-01-02T04:04:05Z"}
        ]"#;

        let err = decode_records::<PrecipitationObservation>(body).unwrap_err();
        assert!(err.to_string().contains("must not be negative"));
    }

    #[test]
    fn truncates_long_bodies_on_char_boundaries() {
        let body = "é".repeat(300);
        let truncated = truncate_body(&body);
        assert!(truncated.ends_with("..."));
        assert_eq!(truncated.chars().count(), 203);
        assert_eq!(truncate_body("short"), "short");
    }

    #[test]
    fn new_rejects_bad_protocol() {
        let endpoint = ProviderEndpoint::new("gopher", "localhost", 70);
        let err = HttpProvider::<TemperatureObservation>::new(&endpoint, Duration::from_secs(1))
            .unwrap_err();
        assert!(format!("{err:#}").contains("Invalid endpoint for provider 'temperature'"));
    }
}
