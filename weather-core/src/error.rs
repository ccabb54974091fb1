//! Error types shared across the report pipeline.
//!
//! Each stage of a report request has its own failure type so that the
//! request boundary can tell a client mistake from a server-side failure.

use reqwest::StatusCode;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::provider::ProviderId;

/// Failure while talking to one of the observation providers.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} provider has an unusable endpoint: {url}")]
    InvalidEndpoint { provider: ProviderId, url: String },

    #[error("request to {provider} provider failed")]
    Transport {
        provider: ProviderId,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {provider} provider timed out")]
    Timeout { provider: ProviderId },

    #[error("{provider} provider answered with status {status}: {body}")]
    Status {
        provider: ProviderId,
        status: StatusCode,
        body: String,
    },

    #[error("{provider} provider returned a payload that could not be decoded")]
    Decode {
        provider: ProviderId,
        #[source]
        source: serde_json::Error,
    },
}

impl ProviderError {
    pub fn provider(&self) -> ProviderId {
        match self {
            ProviderError::InvalidEndpoint { provider, .. }
            | ProviderError::Transport { provider, .. }
            | ProviderError::Timeout { provider }
            | ProviderError::Status { provider, .. }
            | ProviderError::Decode { provider, .. } => *provider,
        }
    }

    pub(crate) fn from_reqwest(provider: ProviderId, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            ProviderError::Timeout { provider }
        } else {
            ProviderError::Transport { provider, source }
        }
    }
}

/// Failure reading from or writing to one of the SQLite stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("stored row is corrupt: {0}")]
    Corrupt(String),

    #[error("database task did not complete: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Failure while building a report. No report is persisted when this is returned.
#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("failed to fetch observations: {0}")]
    Fetch(#[from] ProviderError),

    #[error("failed to summarize observations: {0}")]
    Summary(#[from] OverflowError),

    #[error("failed to store report: {0}")]
    Store(#[from] StoreError),
}

impl AggregateError {
    pub fn is_decode(&self) -> bool {
        matches!(self, AggregateError::Fetch(ProviderError::Decode { .. }))
    }
}

/// A report figure that does not fit in a `Decimal`.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("{field} is out of range")]
pub struct OverflowError {
    pub field: &'static str,
}

/// Why an observation could not be recorded.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Rejected request input. Always a client error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please provide a days parameter with a value between {min} and {max}")]
    Days { min: i64, max: i64 },

    #[error("A zip code is required")]
    EmptyZip,

    #[error("Invalid observation: {0}")]
    InvalidObservation(String),
}

/// Observation data that breaks a model invariant.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ObservationError {
    #[error("observation has no zip code")]
    EmptyZip,

    #[error("precipitation amount must not be negative, got {0}")]
    NegativeAmount(Decimal),

    #[error("unrecognised timestamp '{0}'")]
    Timestamp(String),
}

impl From<ObservationError> for ValidationError {
    fn from(value: ObservationError) -> Self {
        ValidationError::InvalidObservation(value.to_string())
    }
}
