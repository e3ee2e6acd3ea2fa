//! Client configuration.
//!
//! ```toml
//! protocol_version = 1
//! discharge_disabled = false
//! request_timeout_secs = 30
//!
//! [services]
//! charmstore = "https://api.jujucharms.com/charmstore"
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BakeryError, Result};

/// Protocol version sent when none is configured.
pub const DEFAULT_PROTOCOL_VERSION: u32 = 1;

/// Default transport timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Bakery client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BakeryConfig {
    /// Value of the `Bakery-Protocol-Version` header.
    pub protocol_version: u32,

    /// Service name to base URL. Every URL under a base URL shares the
    /// service's stored credentials.
    pub services: BTreeMap<String, String>,

    /// Start with discharging switched off.
    pub discharge_disabled: bool,

    /// Timeout for the default transport.
    pub request_timeout_secs: u64,
}

impl Default for BakeryConfig {
    fn default() -> Self {
        Self {
            protocol_version: DEFAULT_PROTOCOL_VERSION,
            services: BTreeMap::new(),
            discharge_disabled: false,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl BakeryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| BakeryError::ReadConfig {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Map a service name to its base URL.
    pub fn with_service(mut self, name: impl Into<String>, base_url: impl Into<String>) -> Self {
        self.services.insert(name.into(), base_url.into());
        self
    }

    pub fn with_protocol_version(mut self, version: u32) -> Self {
        self.protocol_version = version;
        self
    }

    pub fn with_discharge_disabled(mut self, disabled: bool) -> Self {
        self.discharge_disabled = disabled;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
