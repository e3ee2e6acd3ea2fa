//! Macaroon bakery client.
//!
//! Sends HTTP requests and transparently handles the two bakery protocol
//! signals a server can answer with:
//!
//! - **discharge required**: the third-party caveats of the returned
//!   macaroon are discharged, the bound macaroon set is stored, and the
//!   original request is sent again once.
//! - **interaction required**: the user is sent to the identity provider
//!   and the client waits for the login to complete, storing the macaroon
//!   (and discharge token) it receives.
//!
//! # Components
//!
//! - [`bakery`] — the request orchestrator and its builder
//! - [`discharge`] — third-party caveat resolution
//! - [`interact`] — visit/wait handshake with bounded timeout retries
//! - [`store`] — credential store and key normalization
//! - [`storage`] — in-memory and file backed key/value storage
//! - [`protocol`] — wire constants and error classification
//! - [`macaroon`] — macaroon library seam and blob encoding
//! - [`transport`] — HTTP seam and the reqwest implementation
//!
//! Macaroon cryptography is not implemented here; callers supply a
//! [`MacaroonLibrary`].

pub mod bakery;
pub mod config;
pub mod discharge;
pub mod error;
pub mod interact;
pub mod macaroon;
pub mod protocol;
pub mod storage;
pub mod store;
pub mod transport;

pub use bakery::{Bakery, BakeryBuilder, SuccessHook};
pub use config::BakeryConfig;
pub use discharge::DischargeResolver;
pub use error::{BakeryError, Result};
pub use interact::{InteractionController, LogVisitor, MAX_WAIT_RETRIES, Visitor};
pub use macaroon::{DischargeAcquirer, Macaroon, MacaroonLibrary, ThirdPartyCaveat};
pub use protocol::{ErrorInfo, ErrorResponse, ProtocolError, get_error, get_error_message};
pub use storage::{FileStorage, InMemoryStorage, Storage};
pub use store::{CHARMSTORE_KEY, CookieSetter, CredentialStore, IDENTITY_KEY, KeyNormalizer};
pub use transport::{HttpRequest, HttpResponse, Method, ReqwestTransport, Transport};
