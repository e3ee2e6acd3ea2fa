//! The request orchestrator.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::FutureExt;
use futures::future::BoxFuture;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;

use crate::config::BakeryConfig;
use crate::discharge::DischargeResolver;
use crate::error::{BakeryError, Result};
use crate::interact::{InteractionController, LogVisitor, Visitor};
use crate::macaroon::{self, MacaroonLibrary};
use crate::protocol::{
    ErrorResponse, MACAROONS_HEADER, PROTOCOL_VERSION_HEADER, ProtocolError, get_error,
    get_error_message,
};
use crate::storage::{InMemoryStorage, Storage};
use crate::store::{CookieSetter, CredentialStore, IDENTITY_KEY, KeyNormalizer};
use crate::transport::{HttpRequest, HttpResponse, Method, ReqwestTransport, Transport};

/// Path of the one endpoint that is sent with credentials (on PUT).
const SET_AUTH_COOKIE_PATH: &str = "/set-auth-cookie";

/// Called with every response delivered successfully to a caller.
pub type SuccessHook = Arc<dyn Fn(&HttpResponse) + Send + Sync>;

/// HTTP client that resolves macaroon discharges and identity-provider
/// interactions transparently.
///
/// A request answered with "discharge required" has its caveats discharged,
/// the result stored, and is then sent again once. A request answered with
/// "interaction required" runs the visit/wait handshake and returns the
/// wait response.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use bakery_client::{Bakery, BakeryConfig, MacaroonLibrary};
/// use reqwest::header::HeaderMap;
///
/// # async fn example(library: Arc<dyn MacaroonLibrary>) -> bakery_client::Result<()> {
/// let bakery = Bakery::builder()
///     .config(BakeryConfig::new().with_service("charmstore", "https://api.example.com/charmstore"))
///     .macaroon_library(library)
///     .build()?;
///
/// let response = bakery
///     .get("https://api.example.com/charmstore/v5/whoami", HeaderMap::new())
///     .await?;
/// println!("{}", response.body);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Bakery {
    inner: Arc<BakeryInner>,
}

/// Shared state (shared across clones).
struct BakeryInner {
    transport: Arc<dyn Transport>,
    store: CredentialStore,
    library: Arc<dyn MacaroonLibrary>,
    interaction: InteractionController,
    protocol_version: u32,
    discharge_disabled: AtomicBool,
    on_success: Option<SuccessHook>,
}

impl std::fmt::Debug for Bakery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bakery")
            .field("protocol_version", &self.inner.protocol_version)
            .field("discharge_disabled", &self.is_discharge_disabled())
            .field("store", &self.inner.store)
            .finish()
    }
}

impl Bakery {
    /// Create a new builder.
    pub fn builder() -> BakeryBuilder {
        BakeryBuilder::new()
    }

    /// The credential store backing this client.
    pub fn storage(&self) -> &CredentialStore {
        &self.inner.store
    }

    /// Forget every stored macaroon.
    pub fn clear_credentials(&self) -> Result<()> {
        self.inner.store.clear()
    }

    /// Switch discharging off (or back on). While off, a discharge-required
    /// response fails with [`BakeryError::DischargeDisabled`].
    pub fn set_discharge_disabled(&self, disabled: bool) {
        self.inner
            .discharge_disabled
            .store(disabled, Ordering::SeqCst);
    }

    pub fn is_discharge_disabled(&self) -> bool {
        self.inner.discharge_disabled.load(Ordering::SeqCst)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Requests
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn get(&self, url: &str, headers: HeaderMap) -> Result<HttpResponse> {
        self.send_request(HttpRequest::new(Method::Get, url).headers(headers))
            .await
    }

    pub async fn delete(&self, url: &str, headers: HeaderMap) -> Result<HttpResponse> {
        self.send_request(HttpRequest::new(Method::Delete, url).headers(headers))
            .await
    }

    pub async fn post(
        &self,
        url: &str,
        headers: HeaderMap,
        body: impl Into<String>,
    ) -> Result<HttpResponse> {
        self.send_request(HttpRequest::new(Method::Post, url).headers(headers).body(body))
            .await
    }

    pub async fn put(
        &self,
        url: &str,
        headers: HeaderMap,
        body: impl Into<String>,
    ) -> Result<HttpResponse> {
        self.send_request(HttpRequest::new(Method::Put, url).headers(headers).body(body))
            .await
    }

    pub async fn patch(
        &self,
        url: &str,
        headers: HeaderMap,
        body: impl Into<String>,
    ) -> Result<HttpResponse> {
        self.send_request(HttpRequest::new(Method::Patch, url).headers(headers).body(body))
            .await
    }

    /// Send `request`, resolving any discharge or interaction it triggers.
    pub fn send_request(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse>> {
        async move {
            let outgoing = self.prepare(&request)?;
            tracing::debug!(method = %outgoing.method, url = %outgoing.url, "Sending request");
            let response = self.inner.transport.send(&outgoing).await?;
            self.handle_response(request, response).await
        }
        .boxed()
    }

    /// Build the request actually handed to the transport.
    ///
    /// The protocol version and stored macaroons take precedence over
    /// caller headers of the same name.
    fn prepare(&self, request: &HttpRequest) -> Result<HttpRequest> {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static(PROTOCOL_VERSION_HEADER),
            HeaderValue::from(self.inner.protocol_version),
        );
        if let Some(blob) = self.inner.store.get(&request.url)? {
            let value = HeaderValue::from_str(&blob).map_err(|e| {
                BakeryError::InvalidHeader(format!("{}: {}", MACAROONS_HEADER, e))
            })?;
            headers.insert(HeaderName::from_static(MACAROONS_HEADER), value);
        }
        for name in request.headers.keys() {
            if headers.contains_key(name) {
                continue;
            }
            for value in request.headers.get_all(name) {
                headers.append(name.clone(), value.clone());
            }
        }

        Ok(HttpRequest {
            url: request.url.clone(),
            method: request.method,
            headers,
            body: request.body.clone(),
            with_credentials: request.method == Method::Put
                && request.url.contains(SET_AUTH_COOKIE_PATH),
        })
    }

    async fn handle_response(
        &self,
        request: HttpRequest,
        response: HttpResponse,
    ) -> Result<HttpResponse> {
        let Some(error) = get_error(&response) else {
            return Ok(self.succeed(response));
        };

        match error {
            ProtocolError::Unparseable => Err(BakeryError::UnparseableErrorResponse),
            ProtocolError::InteractionRequired(body) => {
                self.handle_interaction(&request.url, &body).await
            }
            ProtocolError::DischargeRequired(body) => {
                if self.is_discharge_disabled() {
                    return Err(BakeryError::DischargeDisabled { response });
                }
                self.handle_discharge(request, &body).await
            }
            ProtocolError::Unrecognized(Value::String(message)) => {
                Err(BakeryError::Protocol(message))
            }
            ProtocolError::Unrecognized(raw) => Err(BakeryError::Protocol(get_error_message(&raw))),
        }
    }

    /// Run the visit/wait handshake and store what the wait response holds.
    async fn handle_interaction(&self, url: &str, error: &ErrorResponse) -> Result<HttpResponse> {
        tracing::info!(url = %url, "Interaction required");
        let response = self.inner.interaction.interact(error).await?;

        let wait: Value =
            serde_json::from_str(&response.body).map_err(|_| BakeryError::UnparseableMacaroon)?;
        let macaroon = present(&wait, "Macaroon").ok_or(BakeryError::UnparseableMacaroon)?;
        self.inner
            .store
            .set(url, &macaroon::serialize(macaroon)?)
            .await?;

        if let Some(token) = present(&wait, "DischargeToken") {
            let blob = macaroon::serialize(token)?;
            self.inner.store.set(url, &blob).await?;
            self.inner.store.set(IDENTITY_KEY, &blob).await?;
        }

        tracing::info!(url = %url, "Interaction complete");
        Ok(self.succeed(response))
    }

    /// Discharge the macaroon, store the result, and send `request` again.
    async fn handle_discharge(
        &self,
        request: HttpRequest,
        error: &ErrorResponse,
    ) -> Result<HttpResponse> {
        tracing::info!(url = %request.url, "Discharge required");
        let resolver = DischargeResolver::new(self.clone(), self.inner.library.clone());
        let macaroons = resolver.discharge(error.info.macaroon.as_ref()).await?;

        self.inner
            .store
            .set(&request.url, &macaroon::serialize(&macaroons)?)
            .await?;

        tracing::info!(url = %request.url, discharges = macaroons.len(), "Discharge complete, retrying request");
        self.send_request(request).await
    }

    fn succeed(&self, response: HttpResponse) -> HttpResponse {
        if let Some(hook) = &self.inner.on_success {
            hook(&response);
        }
        response
    }
}

/// A non-null field of a JSON object.
fn present<'a>(value: &'a Value, field: &str) -> Option<&'a Value> {
    value.get(field).filter(|v| !v.is_null())
}

// ─────────────────────────────────────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for creating a [`Bakery`].
///
/// Only the macaroon library is required. The transport defaults to
/// [`ReqwestTransport`], storage to a fresh [`InMemoryStorage`], and the
/// visitor to [`LogVisitor`].
#[derive(Default)]
pub struct BakeryBuilder {
    config: BakeryConfig,
    transport: Option<Arc<dyn Transport>>,
    storage: Option<Arc<dyn Storage>>,
    library: Option<Arc<dyn MacaroonLibrary>>,
    visitor: Option<Arc<dyn Visitor>>,
    cookie_setter: Option<Arc<dyn CookieSetter>>,
    on_success: Option<SuccessHook>,
}

impl BakeryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: BakeryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn macaroon_library(mut self, library: Arc<dyn MacaroonLibrary>) -> Self {
        self.library = Some(library);
        self
    }

    pub fn visitor(mut self, visitor: Arc<dyn Visitor>) -> Self {
        self.visitor = Some(visitor);
        self
    }

    /// Mirror credentials stored under `charmstore` into a cookie.
    pub fn cookie_setter(mut self, setter: Arc<dyn CookieSetter>) -> Self {
        self.cookie_setter = Some(setter);
        self
    }

    pub fn on_success(mut self, hook: impl Fn(&HttpResponse) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(hook));
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<Bakery> {
        let library = self
            .library
            .ok_or_else(|| BakeryError::Config("macaroon library is required".to_string()))?;

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(self.config.request_timeout())?),
        };
        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(InMemoryStorage::new()));
        let visitor = self.visitor.unwrap_or_else(|| Arc::new(LogVisitor));

        let mut store = CredentialStore::new(storage, KeyNormalizer::new(&self.config.services));
        if let Some(setter) = self.cookie_setter {
            store = store.with_cookie_setter(setter);
        }

        Ok(Bakery {
            inner: Arc::new(BakeryInner {
                interaction: InteractionController::new(transport.clone(), visitor),
                transport,
                store,
                library,
                protocol_version: self.config.protocol_version,
                discharge_disabled: AtomicBool::new(self.config.discharge_disabled),
                on_success: self.on_success,
            }),
        })
    }
}
