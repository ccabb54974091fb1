use crate::{
    Config, PrecipitationObservation, TemperatureObservation,
    error::{ObservationError, ProviderError},
    provider::http::HttpProvider,
};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::{fmt::Debug, sync::Arc};

pub mod http;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderId {
    Precipitation,
    Temperature,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Precipitation => "precipitation",
            ProviderId::Temperature => "temperature",
        }
    }

    pub const fn all() -> &'static [ProviderId] {
        &[ProviderId::Precipitation, ProviderId::Temperature]
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ProviderId {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.to_lowercase();

        match lower.as_str() {
            "precipitation" => Ok(ProviderId::Precipitation),
            "temperature" => Ok(ProviderId::Temperature),
            _ => Err(anyhow::anyhow!(
                "Unknown provider '{value}'. Supported providers: precipitation, temperature."
            )),
        }
    }
}

/// A record type served by a provider's `/observation/{zip}` endpoint.
///
/// `FIELDS` lists the canonical wire names; incoming keys are matched against
/// them without regard to case.
pub trait WireRecord: serde::de::DeserializeOwned + Send + Sync + Debug + 'static {
    const PROVIDER: ProviderId;
    const FIELDS: &'static [&'static str];

    /// Invariants a decoded record must hold beyond its shape.
    fn check(&self) -> Result<(), ObservationError> {
        Ok(())
    }
}

impl WireRecord for PrecipitationObservation {
    const PROVIDER: ProviderId = ProviderId::Precipitation;
    const FIELDS: &'static [&'static str] = &["zipCode", "weatherType", "amountInches", "createdOn"];

    fn check(&self) -> Result<(), ObservationError> {
        self.validate()
    }
}

impl WireRecord for TemperatureObservation {
    const PROVIDER: ProviderId = ProviderId::Temperature;
    const FIELDS: &'static [&'static str] = &["zipCode", "tempHighF", "tempLowF", "createdOn"];
}

/// Decode one JSON object into `T`, matching field names case-insensitively,
/// and reject records that break `T`'s invariants.
pub fn decode_record<T: WireRecord>(row: Map<String, Value>) -> Result<T, serde_json::Error> {
    let record: T = serde_json::from_value(Value::Object(canonicalize_keys(row, T::FIELDS)))?;
    record.check().map_err(<serde_json::Error as serde::de::Error>::custom)?;
    Ok(record)
}

fn canonicalize_keys(row: Map<String, Value>, fields: &[&str]) -> Map<String, Value> {
    row.into_iter()
        .map(|(key, value)| {
            let key = fields
                .iter()
                .find(|field| field.eq_ignore_ascii_case(&key))
                .map_or(key, |field| (*field).to_string());
            (key, value)
        })
        .collect()
}

/// Source of raw observations of one kind for a zip over the last `days` days.
#[async_trait]
pub trait ObservationProvider<T: Send + 'static>: Send + Sync + Debug {
    fn id(&self) -> ProviderId;

    async fn observations(&self, zip: &str, days: u32) -> Result<Vec<T>, ProviderError>;
}

pub type PrecipitationSource = Arc<dyn ObservationProvider<PrecipitationObservation>>;
pub type TemperatureSource = Arc<dyn ObservationProvider<TemperatureObservation>>;

/// Construct one HTTP provider from its configured endpoint.
pub fn provider_from_config<T: WireRecord>(
    config: &Config,
) -> anyhow::Result<Arc<dyn ObservationProvider<T>>> {
    let endpoint = config.require_provider(T::PROVIDER)?;
    let provider: Arc<dyn ObservationProvider<T>> =
        Arc::new(HttpProvider::<T>::new(endpoint, config.request_timeout())?);
    Ok(provider)
}

/// Construct both providers the aggregator needs.
pub fn providers_from_config(
    config: &Config,
) -> anyhow::Result<(PrecipitationSource, TemperatureSource)> {
    let precipitation = provider_from_config::<PrecipitationObservation>(config)?;
    let temperature = provider_from_config::<TemperatureObservation>(config)?;
    Ok((precipitation, temperature))
}
