//! Resolution of third-party caveats.
//!
//! Discharge requests are sent through the owning [`Bakery`], so a third
//! party that itself demands a discharge or an interaction is handled the
//! same way as the original request.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::Value;

use crate::bakery::Bakery;
use crate::error::{BakeryError, Result};
use crate::macaroon::{DischargeAcquirer, Macaroon, MacaroonLibrary, ThirdPartyCaveat};
use crate::protocol::FORM_CONTENT_TYPE;

/// Acquires and binds all discharges for a macaroon.
#[derive(Clone)]
pub struct DischargeResolver {
    bakery: Bakery,
    library: Arc<dyn MacaroonLibrary>,
}

impl DischargeResolver {
    pub fn new(bakery: Bakery, library: Arc<dyn MacaroonLibrary>) -> Self {
        Self { bakery, library }
    }

    /// Discharge `exported` and return the bound macaroon set in exported
    /// form.
    ///
    /// Decode and caveat-walk failures become [`BakeryError::DischargeFailed`];
    /// failures of individual discharge requests are passed through.
    pub async fn discharge(&self, exported: Option<&Value>) -> Result<Vec<Value>> {
        let macaroon = exported
            .ok_or_else(|| BakeryError::Macaroon("no macaroon to discharge".to_string()))
            .and_then(|value| self.library.import(value))
            .map_err(|e| BakeryError::DischargeFailed(e.to_string()))?;

        let discharged = self
            .library
            .discharge_all(macaroon, self)
            .await
            .map_err(|e| match e {
                BakeryError::Macaroon(message) => BakeryError::DischargeFailed(message),
                other => other,
            })?;

        Ok(discharged.iter().map(Macaroon::export).collect())
    }
}

/// Form body for a discharge request.
fn discharge_form(caveat: &ThirdPartyCaveat) -> String {
    format!(
        "id={}&location={}",
        urlencoding::encode(&caveat.condition_text()),
        urlencoding::encode(caveat.location.as_deref().unwrap_or_default())
    )
}

#[async_trait]
impl DischargeAcquirer for DischargeResolver {
    async fn acquire(&self, caveat: &ThirdPartyCaveat) -> Result<Macaroon> {
        let url = format!("{}/discharge", caveat.third_party_location);
        tracing::debug!(url = %url, "Requesting third-party discharge");

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(FORM_CONTENT_TYPE));
        let response = self
            .bakery
            .post(&url, headers, discharge_form(caveat))
            .await?;

        let body: Value =
            serde_json::from_str(&response.body).map_err(|_| BakeryError::UnparseableMacaroon)?;
        let exported = body
            .get("Macaroon")
            .filter(|m| !m.is_null())
            .ok_or(BakeryError::UnparseableMacaroon)?;
        self.library.import(exported)
    }
}
