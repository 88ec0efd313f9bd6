//! Adapter configuration.
//!
//! Loaded from a JSON file and/or assembled by the CLI. Every field has a
//! default, so `BridgeConfig::default()` is a working runtime-delegated setup.

use crate::error::{BridgeError, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_CREDENTIAL_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_API_VERSION_FIELD: &str = "api_version";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeConfig {
    #[serde(default)]
    pub credential_source: CredentialSource,
    #[serde(default = "default_timeout_ms")]
    pub credential_timeout_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            credential_source: CredentialSource::default(),
            credential_timeout_ms: DEFAULT_CREDENTIAL_TIMEOUT_MS,
        }
    }
}

impl BridgeConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&raw).map_err(|e| {
            BridgeError::Config(format!("{}: {e}", path.as_ref().display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_endpoint(endpoint: CredentialEndpoint) -> Self {
        Self {
            credential_source: CredentialSource::Http(endpoint),
            ..Self::default()
        }
    }

    pub fn credential_timeout(&self) -> Duration {
        Duration::from_millis(self.credential_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.credential_timeout_ms == 0 {
            return Err(BridgeError::Config(
                "credentialTimeoutMs must be greater than zero".to_string(),
            ));
        }
        if let CredentialSource::Http(endpoint) = &self.credential_source {
            endpoint.validate()?;
        }
        Ok(())
    }
}

fn default_timeout_ms() -> u64 {
    DEFAULT_CREDENTIAL_TIMEOUT_MS
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CredentialSource {
    /// Ask the embedding runtime through `onCreateEphemeralKey`.
    #[default]
    Runtime,
    /// Call the application's credential-issuing endpoint directly.
    Http(CredentialEndpoint),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    #[default]
    Post,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => f.write_str("GET"),
            Self::Post => f.write_str("POST"),
        }
    }
}

impl FromStr for HttpMethod {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            other => Err(BridgeError::Config(format!(
                "unsupported credential method `{other}`"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialEndpoint {
    pub url: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Extra fields sent alongside the API version.
    #[serde(default)]
    pub payload: Map<String, Value>,
    #[serde(default = "default_api_version_field")]
    pub api_version_field: String,
}

impl CredentialEndpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: HttpMethod::default(),
            headers: BTreeMap::new(),
            payload: Map::new(),
            api_version_field: default_api_version_field(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        reqwest::Url::parse(&self.url)
            .map_err(|e| BridgeError::Config(format!("invalid credential url `{}`: {e}", self.url)))?;
        if self.api_version_field.is_empty() {
            return Err(BridgeError::Config(
                "apiVersionField must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_api_version_field() -> String {
    DEFAULT_API_VERSION_FIELD.to_string()
}
