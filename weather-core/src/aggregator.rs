//! Builds weather reports from the two observation providers.
//!
//! Callers must pass a non-empty zip and `days` within `1..=30`; the request
//! handler enforces both before delegating here, so they are not checked again.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::{fmt::Debug, sync::Arc};
use tracing::{debug, info, warn};

use crate::{
    Config,
    error::AggregateError,
    model::WeatherReport,
    provider::{PrecipitationSource, TemperatureSource, providers_from_config},
    reduce::summarize,
    store::ReportStore,
};

/// Something that can produce a report for a zip code and day window.
#[async_trait]
pub trait ReportBuilder: Send + Sync + Debug {
    async fn build_weekly_report(&self, zip: &str, days: u32) -> Result<WeatherReport, AggregateError>;
}

#[derive(Debug, Clone)]
pub struct ReportAggregator {
    precipitation: PrecipitationSource,
    temperature: TemperatureSource,
    store: Arc<dyn ReportStore>,
}

impl ReportAggregator {
    pub fn new(
        precipitation: PrecipitationSource,
        temperature: TemperatureSource,
        store: Arc<dyn ReportStore>,
    ) -> Self {
        Self { precipitation, temperature, store }
    }

    /// Wire HTTP providers from `config` to `store`.
    pub fn from_config(config: &Config, store: Arc<dyn ReportStore>) -> anyhow::Result<Self> {
        let (precipitation, temperature) = providers_from_config(config)?;
        Ok(Self::new(precipitation, temperature, store))
    }
}

/// Start of the observation window `(now - days, now]`.
pub fn window_start(now: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    now - Duration::days(i64::from(days))
}

#[async_trait]
impl ReportBuilder for ReportAggregator {
    async fn build_weekly_report(&self, zip: &str, days: u32) -> Result<WeatherReport, AggregateError> {
        let start = window_start(Utc::now(), days);

        let (precipitation, temperature) = tokio::join!(
            self.precipitation.observations(zip, days),
            self.temperature.observations(zip, days),
        );

        let mut precipitation =
            precipitation.inspect_err(|e| warn!(zip, error = %e, "precipitation fetch failed"))?;
        let mut temperature =
            temperature.inspect_err(|e| warn!(zip, error = %e, "temperature fetch failed"))?;

        let fetched = (precipitation.len(), temperature.len());
        precipitation.retain(|obs| obs.observed_at > start);
        temperature.retain(|obs| obs.observed_at > start);
        if fetched != (precipitation.len(), temperature.len()) {
            debug!(zip, %start, "dropped observations outside the window");
        }

        let summary = summarize(&precipitation, &temperature)
            .inspect_err(|e| warn!(zip, error = %e, "observations could not be summarized"))?;

        info!(
            zip,
            days,
            rain = %summary.rain_fall_total_inches,
            snow = %summary.snow_total_inches,
            "precipitation totals"
        );
        info!(
            zip,
            days,
            high = ?summary.average_high_f,
            low = ?summary.average_low_f,
            "temperature averages"
        );

        let report = WeatherReport {
            zip_code: zip.to_string(),
            created_on: Utc::now(),
            average_high_f: summary.average_high_f,
            average_low_f: summary.average_low_f,
            rain_fall_total_inches: summary.rain_fall_total_inches,
            snow_total_inches: summary.snow_total_inches,
        };

        let id = self
            .store
            .save(&report)
            .await
            .inspect_err(|e| warn!(zip, error = %e, "failed to store report"))?;

        debug!(zip, id, "stored report");
        Ok(report)
    }
}
