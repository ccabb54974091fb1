//! Core library for the weather report service.
//!
//! This crate defines:
//! - Configuration of the precipitation and temperature providers
//! - HTTP clients for those providers
//! - Reduction of raw observations into a `WeatherReport`
//! - SQLite persistence for reports and raw precipitation observations
//! - Transport-agnostic request handlers
//!
//! It is used by `weather-report-cli`, which adds argument parsing and the HTTP front end.

pub mod aggregator;
pub mod config;
pub mod error;
pub mod handler;
pub mod model;
pub mod observations;
pub mod provider;
pub mod reduce;
pub mod store;

pub use aggregator::{ReportAggregator, ReportBuilder};
pub use config::{Config, ProviderEndpoint};
pub use error::{AggregateError, OverflowError, ProviderError, StoreError, ValidationError};
pub use handler::{HandlerResponse, PrecipitationHandler, ReportHandler, ResponseBody};
pub use model::{PrecipitationObservation, StoredReport, TemperatureObservation, WeatherReport, WeatherType};
pub use observations::ObservationStore;
pub use provider::{ObservationProvider, ProviderId, WireRecord, decode_record};
pub use store::{ReportStore, SqliteReportStore};
