//! Bakery wire protocol: headers, error bodies and their classification.
//!
//! A protocol error is only recognised on a 401 or 407 response whose
//! content type is exactly `application/json`. Anything else is an ordinary
//! response and is handed straight back to the caller.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::transport::HttpResponse;

/// Header carrying the protocol version on every request (lower-case, as
/// `HeaderName::from_static` requires).
pub const PROTOCOL_VERSION_HEADER: &str = "bakery-protocol-version";

/// Header carrying the stored macaroon blob.
pub const MACAROONS_HEADER: &str = "macaroons";

pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

pub const CODE_INTERACTION_REQUIRED: &str = "interaction required";
pub const CODE_DISCHARGE_REQUIRED: &str = "discharge required";
pub const CODE_MACAROON_DISCHARGE_REQUIRED: &str = "macaroon discharge required";

/// Message used when a protocol error body is not valid JSON.
pub const UNPARSEABLE_ERROR: &str = "cannot parse error response";

/// The `Info` object of a protocol error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    #[serde(rename = "WaitURL", default, skip_serializing_if = "Option::is_none")]
    pub wait_url: Option<String>,
    #[serde(rename = "VisitURL", default, skip_serializing_if = "Option::is_none")]
    pub visit_url: Option<String>,
    #[serde(rename = "Macaroon", default, skip_serializing_if = "Option::is_none")]
    pub macaroon: Option<Value>,
    #[serde(
        rename = "DischargeToken",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub discharge_token: Option<Value>,
}

/// A protocol error body: `{Code, Message, Info}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(rename = "Code", default)]
    pub code: String,
    #[serde(rename = "Message", default)]
    pub message: String,
    #[serde(rename = "Info", default)]
    pub info: ErrorInfo,
}

/// A 401/407 JSON error body, classified by its code.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolError {
    /// A human has to log in at `Info.VisitURL`; completion is awaited on
    /// `Info.WaitURL`.
    InteractionRequired(ErrorResponse),
    /// `Info.Macaroon` has third-party caveats that must be discharged.
    DischargeRequired(ErrorResponse),
    /// Any other JSON payload.
    Unrecognized(Value),
    /// The body was not JSON at all.
    Unparseable,
}

impl ProtocolError {
    /// Classify a parsed error body.
    pub fn classify(raw: Value) -> Self {
        let code = raw.get("Code").and_then(Value::as_str).unwrap_or_default();
        let is_interaction = code == CODE_INTERACTION_REQUIRED;
        let is_discharge =
            code == CODE_DISCHARGE_REQUIRED || code == CODE_MACAROON_DISCHARGE_REQUIRED;
        if !is_interaction && !is_discharge {
            return ProtocolError::Unrecognized(raw);
        }

        match serde_json::from_value::<ErrorResponse>(raw.clone()) {
            Ok(body) if is_interaction => ProtocolError::InteractionRequired(body),
            Ok(body) => ProtocolError::DischargeRequired(body),
            Err(_) => ProtocolError::Unrecognized(raw),
        }
    }

    /// Human readable message for a terminal failure.
    pub fn message(&self) -> String {
        match self {
            ProtocolError::InteractionRequired(body) | ProtocolError::DischargeRequired(body) => {
                body.message.clone()
            }
            ProtocolError::Unrecognized(raw) => get_error_message(raw),
            ProtocolError::Unparseable => UNPARSEABLE_ERROR.to_string(),
        }
    }
}

/// Extract a protocol error from a response.
///
/// Returns `None` unless the status is 401 or 407 and the content type is
/// exactly `application/json`.
pub fn get_error(response: &HttpResponse) -> Option<ProtocolError> {
    if response.status != 401 && response.status != 407 {
        return None;
    }
    if response.content_type() != Some(JSON_CONTENT_TYPE) {
        return None;
    }
    match serde_json::from_str::<Value>(&response.body) {
        Ok(raw) => Some(ProtocolError::classify(raw)),
        Err(_) => Some(ProtocolError::Unparseable),
    }
}

/// Pick a message out of a loosely shaped error object.
///
/// Tries `Message`, `message`, `Error`, `error` in that order. A bare JSON
/// string yields an empty message.
pub fn get_error_message(raw: &Value) -> String {
    if raw.is_string() {
        return String::new();
    }
    for field in ["Message", "message", "Error", "error"] {
        if let Some(value) = raw.get(field) {
            return match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
        }
    }
    format!("unexpected error: {}", raw)
}
