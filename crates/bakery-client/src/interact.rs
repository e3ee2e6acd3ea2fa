//! Visit/wait handshake with an identity provider.

use std::sync::Arc;

use reqwest::header::{CONTENT_TYPE, HeaderValue};

use crate::error::{BakeryError, Result};
use crate::protocol::{ErrorResponse, JSON_CONTENT_TYPE, get_error};
use crate::transport::{HttpRequest, HttpResponse, Method, Transport};

/// Wait requests reissued after a long-poll timeout before giving up.
pub const MAX_WAIT_RETRIES: u32 = 5;

/// Shows the user where to log in.
///
/// Called with the full interaction-required error; implementations usually
/// open or print `error.info.visit_url`.
pub trait Visitor: Send + Sync {
    fn visit(&self, error: &ErrorResponse);
}

/// [`Visitor`] that only logs the visit URL.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogVisitor;

impl Visitor for LogVisitor {
    fn visit(&self, error: &ErrorResponse) {
        match &error.info.visit_url {
            Some(url) => tracing::info!(visit_url = %url, "Interaction required, visit to log in"),
            None => tracing::warn!(message = %error.message, "Interaction required without a visit URL"),
        }
    }
}

/// Drives one interaction: visit, then long-poll the wait URL.
#[derive(Clone)]
pub struct InteractionController {
    transport: Arc<dyn Transport>,
    visitor: Arc<dyn Visitor>,
}

impl InteractionController {
    pub fn new(transport: Arc<dyn Transport>, visitor: Arc<dyn Visitor>) -> Self {
        Self { transport, visitor }
    }

    /// Run the handshake and return the wait response.
    ///
    /// A wait response with the timeout signature is retried up to
    /// [`MAX_WAIT_RETRIES`] times; after that it is evaluated like any
    /// other response.
    pub async fn interact(&self, error: &ErrorResponse) -> Result<HttpResponse> {
        self.visitor.visit(error);

        let wait_url = error
            .info
            .wait_url
            .as_deref()
            .ok_or_else(|| BakeryError::InteractionFailed("no wait URL provided".to_string()))?;

        let mut request = HttpRequest::new(Method::Get, wait_url);
        request
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));

        let mut retries = 0;
        let response = loop {
            let response = self.transport.send(&request).await?;
            if response.is_timeout_signature() && retries < MAX_WAIT_RETRIES {
                retries += 1;
                tracing::warn!(wait_url = %wait_url, retry = retries, "Wait request timed out, retrying");
                continue;
            }
            break response;
        };

        match get_error(&response) {
            Some(error) => Err(BakeryError::InteractionFailed(error.message())),
            None => Ok(response),
        }
    }
}
