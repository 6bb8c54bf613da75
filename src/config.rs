//! Connection Configuration
//!
//! Connection settings supplied by the host, plus the resolver that turns
//! them into validated parameters before any network call is made.

use crate::error::{Error, Result};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default timeout for every HTTP request
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default page size for marker-paginated listings (Cloud Files)
pub const DEFAULT_PAGE_SIZE: u32 = 1000;

/// Connection configuration as supplied by the host
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConnectionConfig {
    /// Identity service URL, e.g. `https://identity.api.rackspacecloud.com/v2.0/`
    #[serde(default)]
    pub identity_endpoint: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub token_id: Option<String>,
    /// Region code, e.g. `hkg`, `iad`, `dfw`
    #[serde(default)]
    pub region: Option<String>,
    /// Base URL that replaces the public per-service hostnames for direct REST calls
    #[serde(default)]
    pub endpoint_override: Option<String>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default)]
    pub page_size: Option<u32>,
}

/// Validated parameters for catalog-routed (authenticated) calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub identity_endpoint: String,
    pub tenant_id: String,
    pub token_id: String,
    pub region: String,
}

/// Validated parameters for a direct REST call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestCredentials {
    pub token_id: String,
    pub tenant_id: Option<String>,
    pub region: Option<String>,
}

fn required(value: &Option<String>, field: &'static str) -> Result<String> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(Error::MissingConfig(field)),
    }
}

impl ConnectionConfig {
    /// Validate all four settings needed to authenticate.
    ///
    /// Fields are checked in a fixed order and the first missing one is named
    /// in the error. No I/O happens here.
    pub fn resolve(&self) -> Result<ConnectionParams> {
        Ok(ConnectionParams {
            identity_endpoint: required(&self.identity_endpoint, "identity_endpoint")?,
            tenant_id: required(&self.tenant_id, "tenant_id")?,
            token_id: required(&self.token_id, "token_id")?,
            region: required(&self.region, "region")?,
        })
    }

    /// Validate only what a direct REST service needs.
    pub fn rest_credentials(&self, needs_tenant: bool, needs_region: bool) -> Result<RestCredentials> {
        let tenant_id = if needs_tenant {
            Some(required(&self.tenant_id, "tenant_id")?)
        } else {
            None
        };
        let token_id = required(&self.token_id, "token_id")?;
        let region = if needs_region {
            Some(required(&self.region, "region")?)
        } else {
            None
        };

        Ok(RestCredentials {
            token_id,
            tenant_id,
            region,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout_secs
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn page_size(&self) -> u32 {
        self.page_size.filter(|p| *p > 0).unwrap_or(DEFAULT_PAGE_SIZE)
    }

    /// Default config file path
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("rackscan").join("config.json"))
    }

    /// Load configuration from a file (explicit path, else the default one if it
    /// exists), then overlay `RACKSPACE_*` environment variables.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => Self::read_file(path)?,
            None => match Self::default_path() {
                Some(default) if default.exists() => Self::read_file(&default)?,
                _ => Self::default(),
            },
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn read_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Overlay environment values; env wins over file values.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let overlay = |slot: &mut Option<String>, key: &str| {
            if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
                *slot = Some(value);
            }
        };

        overlay(&mut self.identity_endpoint, "RACKSPACE_IDENTITY_ENDPOINT");
        overlay(&mut self.tenant_id, "RACKSPACE_TENANT_ID");
        overlay(&mut self.token_id, "RACKSPACE_TOKEN_ID");
        overlay(&mut self.region, "RACKSPACE_REGION");
        overlay(&mut self.endpoint_override, "RACKSPACE_ENDPOINT_OVERRIDE");
    }
}
