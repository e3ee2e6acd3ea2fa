//! Macaroon collaborator seam and blob encoding.
//!
//! Cryptography lives behind [`MacaroonLibrary`]. This crate only moves
//! macaroons around in their exported JSON form and stores them as
//! base64-encoded JSON blobs.

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// A macaroon in the macaroon library's exported JSON form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Macaroon(Value);

impl Macaroon {
    /// Wrap an exported macaroon.
    pub fn from_exported(exported: Value) -> Self {
        Self(exported)
    }

    /// The exported JSON form.
    pub fn export(&self) -> Value {
        self.0.clone()
    }

    pub fn as_json(&self) -> &Value {
        &self.0
    }
}

/// A third-party caveat found while walking a macaroon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThirdPartyCaveat {
    /// Location of the macaroon holding the caveat, if it has one.
    pub location: Option<String>,
    /// Base URL of the third party that can discharge the caveat.
    pub third_party_location: String,
    /// Caveat id, as raw bytes.
    pub condition: Vec<u8>,
}

impl ThirdPartyCaveat {
    /// The caveat id as text, one char per byte.
    pub fn condition_text(&self) -> String {
        self.condition.iter().map(|&b| b as char).collect()
    }
}

/// Obtains a discharge macaroon for one third-party caveat.
#[async_trait]
pub trait DischargeAcquirer: Send + Sync {
    async fn acquire(&self, caveat: &ThirdPartyCaveat) -> Result<Macaroon>;
}

/// The macaroon operations the bakery relies on.
#[async_trait]
pub trait MacaroonLibrary: Send + Sync {
    /// Decode an exported macaroon, rejecting malformed input.
    fn import(&self, exported: &Value) -> Result<Macaroon>;

    /// Walk every third-party caveat of `macaroon` (and of the discharges it
    /// obtains), asking `acquirer` for each discharge, then bind the
    /// discharges to the primary macaroon.
    ///
    /// Returns the primary macaroon followed by its bound discharges.
    /// Failures from `acquirer` must be returned unchanged.
    async fn discharge_all(
        &self,
        macaroon: Macaroon,
        acquirer: &dyn DischargeAcquirer,
    ) -> Result<Vec<Macaroon>>;
}

/// Encode a value as a storable macaroon blob (base64 of its JSON).
pub fn serialize<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let json = serde_json::to_vec(value)?;
    Ok(STANDARD.encode(json))
}

/// Decode a macaroon blob back into JSON.
pub fn deserialize(blob: &str) -> Result<Value> {
    let json = STANDARD.decode(blob.trim())?;
    Ok(serde_json::from_slice(&json)?)
}
