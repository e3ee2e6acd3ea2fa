//! HTTP request/response values and the transport seam.
//!
//! The bakery never talks to the network directly. Everything goes through a
//! [`Transport`], which makes the protocol logic testable with scripted
//! responses and lets embedders bring their own HTTP stack.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};

use crate::error::{BakeryError, Result};

/// Default timeout for requests sent by [`ReqwestTransport`].
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

// ─────────────────────────────────────────────────────────────────────────────
// Method
// ─────────────────────────────────────────────────────────────────────────────

/// HTTP method of a bakery request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    /// Lower-case method name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "get",
            Method::Post => "post",
            Method::Put => "put",
            Method::Patch => "patch",
            Method::Delete => "delete",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = BakeryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "get" => Ok(Method::Get),
            "post" => Ok(Method::Post),
            "put" => Ok(Method::Put),
            "patch" => Ok(Method::Patch),
            "delete" => Ok(Method::Delete),
            other => Err(BakeryError::Config(format!(
                "unsupported HTTP method: {}",
                other
            ))),
        }
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Request / Response
// ─────────────────────────────────────────────────────────────────────────────

/// An outgoing request.
///
/// The same value doubles as the pending original request that is replayed
/// once after a discharge completes.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: String,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<String>,
    /// Whether the transport should attach ambient credentials (cookies).
    pub with_credentials: bool,
}

impl HttpRequest {
    /// Create a request with no headers and no body.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            headers: HeaderMap::new(),
            body: None,
            with_credentials: false,
        }
    }

    /// Add a header.
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| BakeryError::InvalidHeader(format!("{}: {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| BakeryError::InvalidHeader(format!("{}: {}", name, e)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Replace all headers.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Set the request body.
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Look up a header value as a string.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// A response handed back by a [`Transport`].
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    /// HTTP status; `0` when the connection was dropped without a response.
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
}

impl HttpResponse {
    /// Create a response with no headers.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// The response a transport reports when the server closed the
    /// connection on a long-poll timeout.
    pub fn timed_out() -> Self {
        Self::new(0, "")
    }

    /// Add a header, ignoring names or values that are not valid HTTP.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Shorthand for a response with a JSON content type.
    pub fn json(status: u16, body: impl Into<String>) -> Self {
        Self::new(status, body).with_header("content-type", "application/json")
    }

    /// Look up a header value as a string.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The `Content-Type` header, if present.
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }

    /// True for status 0 with an empty body.
    pub fn is_timeout_signature(&self) -> bool {
        self.status == 0 && self.body.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Transport
// ─────────────────────────────────────────────────────────────────────────────

/// Sends a request and returns whatever the server answered.
///
/// Implementations must not interpret status codes; a 401 is a successful
/// send. Only failures to exchange a request at all are errors.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

/// [`Transport`] backed by `reqwest`.
///
/// A request that times out, or whose connection the peer closes before a
/// full response arrives, is reported as [`HttpResponse::timed_out`] rather
/// than as an error.
/// `with_credentials` has no per-request meaning for reqwest and is ignored.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl ReqwestTransport {
    /// Create a transport with its own HTTP client.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!("bakery-client/{}", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, timeout })
    }

    /// Create a transport around an existing HTTP client.
    pub fn with_client(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Timed out, or the peer hung up after the connection was established.
    /// A failed connect is a real transport error.
    fn is_dropped(e: &reqwest::Error) -> bool {
        e.is_timeout() || e.is_body() || (e.is_request() && !e.is_connect())
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let mut builder = self
            .client
            .request(request.method.into(), &request.url)
            .headers(request.headers.clone())
            .timeout(self.timeout);
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) if Self::is_dropped(&e) => return Ok(HttpResponse::timed_out()),
            Err(e) => return Err(e.into()),
        };

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) if Self::is_dropped(&e) => return Ok(HttpResponse::timed_out()),
            Err(e) => return Err(e.into()),
        };

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parse_is_case_insensitive() {
        assert_eq!("GET".parse::<Method>().unwrap(), Method::Get);
        assert_eq!("Patch".parse::<Method>().unwrap(), Method::Patch);
        assert_eq!(Method::Delete.as_str(), "delete");
        assert!("TRACE".parse::<Method>().is_err());
    }

    #[test]
    fn test_timeout_signature() {
        assert!(HttpResponse::timed_out().is_timeout_signature());
        assert!(!HttpResponse::new(0, "partial").is_timeout_signature());
        assert!(!HttpResponse::new(200, "").is_timeout_signature());
    }

    #[test]
    fn test_content_type_lookup() {
        let response = HttpResponse::json(401, "{}");
        assert_eq!(response.content_type(), Some("application/json"));
        assert_eq!(HttpResponse::new(200, "").content_type(), None);
    }

    #[test]
    fn test_request_rejects_invalid_header() {
        let result = HttpRequest::new(Method::Get, "http://x").with_header("bad header", "v");
        assert!(matches!(result, Err(BakeryError::InvalidHeader(_))));
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let request = HttpRequest::new(Method::Get, "http://x")
            .with_header("X-Trace", "abc")
            .unwrap();
        let response = HttpResponse::new(200, "").with_header("X-Trace", "abc");

        assert_eq!(request.header("x-trace"), Some("abc"));
        assert_eq!(response.header("X-TRACE"), Some("abc"));
        assert_eq!(request.header("missing"), None);
    }
}
