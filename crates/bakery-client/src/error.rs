//! Error types for the bakery client.

use crate::transport::HttpResponse;

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, BakeryError>;

/// Errors surfaced to callers of [`Bakery`](crate::Bakery).
///
/// Discharge-required and interaction-required responses are not errors in
/// themselves; they only show up here when resolving them fails.
#[derive(Debug, thiserror::Error)]
pub enum BakeryError {
    /// The transport failed to deliver the request.
    #[error("{0}")]
    Transport(String),

    /// A 401/407 JSON error body could not be parsed.
    #[error("cannot parse error response")]
    UnparseableErrorResponse,

    /// A discharge or wait response carried no usable macaroon.
    #[error("unable to parse macaroon.")]
    UnparseableMacaroon,

    /// Discharge was required but is switched off on this client.
    ///
    /// This is the only failure that hands back the response that caused it.
    #[error("discharge required but disabled")]
    DischargeDisabled {
        /// The discharge-required response.
        response: HttpResponse,
    },

    /// The server returned a protocol error with an unknown code.
    #[error("{0}")]
    Protocol(String),

    /// Decoding the macaroon or walking its caveats failed.
    #[error("discharge failed: {0}")]
    DischargeFailed(String),

    /// The identity provider wait request returned an error.
    #[error("cannot interact: {0}")]
    InteractionFailed(String),

    /// The macaroon library rejected a macaroon.
    #[error("{0}")]
    Macaroon(String),

    /// The backing key/value storage failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored blob was not valid base64.
    #[error("invalid macaroon blob: {0}")]
    Encoding(#[from] base64::DecodeError),

    /// A header name or value could not be encoded.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// Invalid client configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Failed to read a config file.
    #[error("failed to read config file '{path}': {source}")]
    ReadConfig {
        path: String,
        source: std::io::Error,
    },

    /// Failed to parse TOML.
    #[error("failed to parse config: {0}")]
    ParseConfig(#[from] toml::de::Error),
}

impl BakeryError {
    /// The response attached to this error, if any.
    pub fn response(&self) -> Option<&HttpResponse> {
        match self {
            BakeryError::DischargeDisabled { response } => Some(response),
            _ => None,
        }
    }

    /// Check if this error came from the transport layer.
    pub fn is_transport_error(&self) -> bool {
        matches!(self, BakeryError::Transport(_))
    }
}

impl From<reqwest::Error> for BakeryError {
    fn from(e: reqwest::Error) -> Self {
        BakeryError::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_match_wire_strings() {
        assert_eq!(
            BakeryError::UnparseableErrorResponse.to_string(),
            "cannot parse error response"
        );
        assert_eq!(
            BakeryError::UnparseableMacaroon.to_string(),
            "unable to parse macaroon."
        );
        assert_eq!(
            BakeryError::DischargeFailed("boom".into()).to_string(),
            "discharge failed: boom"
        );
        assert_eq!(
            BakeryError::InteractionFailed("denied".into()).to_string(),
            "cannot interact: denied"
        );
    }

    #[test]
    fn test_only_discharge_disabled_carries_response() {
        let err = BakeryError::DischargeDisabled {
            response: HttpResponse::new(401, "{}"),
        };
        assert_eq!(err.to_string(), "discharge required but disabled");
        assert_eq!(err.response().map(|r| r.status), Some(401));

        assert!(BakeryError::Protocol("nope".into()).response().is_none());
    }
}
