//! Credential store: macaroon blobs keyed by normalized URL.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::macaroon;
use crate::storage::Storage;

/// Reserved key whose writes are mirrored into a cookie.
pub const CHARMSTORE_KEY: &str = "charmstore";

/// Reserved key holding the identity discharge token.
pub const IDENTITY_KEY: &str = "identity";

/// Suffix conventionally appended to third-party locations.
const DISCHARGE_SUFFIX: &str = "/discharge";

/// Installs a macaroon as a cookie for an integration that reads cookies
/// instead of the `Macaroons` header.
#[async_trait]
pub trait CookieSetter: Send + Sync {
    async fn set_cookie(&self, macaroons: &Value) -> Result<()>;
}

// ─────────────────────────────────────────────────────────────────────────────
// KeyNormalizer
// ─────────────────────────────────────────────────────────────────────────────

/// Maps request URLs onto canonical storage keys.
#[derive(Debug, Clone, Default)]
pub struct KeyNormalizer {
    services: Vec<(String, String)>,
}

impl KeyNormalizer {
    /// Build from a service name to base URL map. Empty base URLs are ignored.
    pub fn new(services: &BTreeMap<String, String>) -> Self {
        let services = services
            .iter()
            .filter(|(_, base)| !base.is_empty())
            .map(|(name, base)| (name.clone(), base.clone()))
            .collect();
        Self { services }
    }

    /// Canonical key for `key`.
    ///
    /// A key under a configured base URL becomes the service name; otherwise
    /// every trailing `/discharge` is stripped.
    pub fn normalize(&self, key: &str) -> String {
        if let Some((name, _)) = self
            .services
            .iter()
            .find(|(_, base)| key.starts_with(base.as_str()))
        {
            return name.clone();
        }
        let mut key = key;
        while let Some(stripped) = key.strip_suffix(DISCHARGE_SUFFIX) {
            key = stripped;
        }
        key.to_string()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CredentialStore
// ─────────────────────────────────────────────────────────────────────────────

/// Persists serialized macaroon blobs under canonical keys.
#[derive(Clone)]
pub struct CredentialStore {
    storage: Arc<dyn Storage>,
    normalizer: KeyNormalizer,
    cookie_setter: Option<Arc<dyn CookieSetter>>,
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("storage", &self.storage)
            .field("normalizer", &self.normalizer)
            .field("cookie_setter", &self.cookie_setter.is_some())
            .finish()
    }
}

impl CredentialStore {
    pub fn new(storage: Arc<dyn Storage>, normalizer: KeyNormalizer) -> Self {
        Self {
            storage,
            normalizer,
            cookie_setter: None,
        }
    }

    /// Mirror writes to [`CHARMSTORE_KEY`] through `setter`.
    pub fn with_cookie_setter(mut self, setter: Arc<dyn CookieSetter>) -> Self {
        self.cookie_setter = Some(setter);
        self
    }

    pub fn normalizer(&self) -> &KeyNormalizer {
        &self.normalizer
    }

    /// The blob stored for `key`, if any.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        self.storage.get_item(&self.normalizer.normalize(key))
    }

    /// Store `value` under the canonical form of `key`.
    ///
    /// Writes to [`CHARMSTORE_KEY`] are also handed to the cookie setter.
    /// Cookie failures are logged and do not fail the write.
    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        let key = self.normalizer.normalize(key);
        self.storage.set_item(&key, value)?;

        if key != CHARMSTORE_KEY {
            return Ok(());
        }
        if let Some(setter) = &self.cookie_setter {
            let outcome = match macaroon::deserialize(value) {
                Ok(macaroons) => setter.set_cookie(&macaroons).await,
                Err(e) => Err(e),
            };
            if let Err(e) = outcome {
                tracing::warn!(key = %key, error = %e, "Failed to set macaroon cookie");
            }
        }
        Ok(())
    }

    /// Remove every stored credential.
    pub fn clear(&self) -> Result<()> {
        self.storage.clear()
    }
}
