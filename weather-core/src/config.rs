use anyhow::{Context, Result, anyhow, bail};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use url::Url;

use crate::provider::ProviderId;

pub const DEFAULT_CONNECTION_STRING: &str = "weather-reports.db";
pub const DEFAULT_LISTEN: &str = "127.0.0.1:8080";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Where a provider lives: `{protocol}://{host}:{port}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEndpoint {
    pub protocol: String,
    pub host: String,
    pub port: u16,
}

impl ProviderEndpoint {
    pub fn new(protocol: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self { protocol: protocol.into(), host: host.into(), port }
    }

    /// Root URL of the provider. Only `http` and `https` are accepted.
    pub fn base_url(&self) -> Result<Url> {
        let protocol = self.protocol.to_ascii_lowercase();
        if protocol != "http" && protocol != "https" {
            bail!("Unsupported protocol '{}'; expected http or https", self.protocol);
        }

        let raw = format!("{protocol}://{}:{}/", self.host, self.port);
        Url::parse(&raw).with_context(|| format!("Invalid provider endpoint: {raw}"))
    }

    /// `GET` target for a zip and day window, e.g. `http://host:5001/observation/12345?days=7`.
    pub fn observation_url(&self, zip: &str, days: u32) -> Result<Url> {
        let base = self.base_url()?;
        observation_url(&base, zip, days)
            .ok_or_else(|| anyhow!("Provider endpoint cannot carry a path: {base}"))
    }
}

pub(crate) fn observation_url(base: &Url, zip: &str, days: u32) -> Option<Url> {
    let mut url = base.clone();
    url.path_segments_mut().ok()?.pop_if_empty().extend(["observation", zip]);
    url.query_pairs_mut().append_pair("days", &days.to_string());
    Some(url)
}

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// SQLite database path, or `:memory:`.
    #[serde(default = "default_connection_string")]
    pub connection_string: String,

    /// Socket address the HTTP services bind to.
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Upper bound on each provider request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Example TOML:
    /// [providers.precipitation]
    /// protocol = "http"
    /// host = "localhost"
    /// port = 5001
    #[serde(default)]
    pub providers: HashMap<String, ProviderEndpoint>,
}

fn default_connection_string() -> String {
    DEFAULT_CONNECTION_STRING.to_string()
}

fn default_listen() -> String {
    DEFAULT_LISTEN.to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            connection_string: default_connection_string(),
            listen: default_listen(),
            request_timeout_secs: default_request_timeout_secs(),
            providers: HashMap::new(),
        }
    }
}

impl Config {
    pub fn provider_endpoint(&self, id: ProviderId) -> Option<&ProviderEndpoint> {
        self.providers.get(id.as_str())
    }

    /// Endpoint for `id`, or an error telling the user which table to add.
    pub fn require_provider(&self, id: ProviderId) -> Result<&ProviderEndpoint> {
        self.provider_endpoint(id).ok_or_else(|| {
            anyhow!(
                "No endpoint configured for provider '{id}'.\n\
                 Hint: add a [providers.{id}] table with protocol, host and port to the config file."
            )
        })
    }

    pub fn upsert_provider(&mut self, id: ProviderId, endpoint: ProviderEndpoint) {
        self.providers.insert(id.as_str().to_string(), endpoint);
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Load config from the default location, or return defaults if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        Self::load_from(&path)
    }

    /// Load config from `path`, or return defaults if the file doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let cfg: Config = toml::from_str(contents)?;

        for id in ProviderId::all() {
            if let Some(endpoint) = cfg.provider_endpoint(*id) {
                endpoint
                    .base_url()
                    .with_context(|| format!("Invalid endpoint for provider '{id}'"))?;
            }
        }

        Ok(cfg)
    }

    /// Save config to `path`, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "weather-report", "weather-report")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }
}
