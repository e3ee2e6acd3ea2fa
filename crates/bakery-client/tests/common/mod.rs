//! Scripted collaborators shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};

use bakery_client::{
    Bakery, BakeryConfig, BakeryError, CookieSetter, DischargeAcquirer, ErrorResponse,
    HttpRequest, HttpResponse, InMemoryStorage, Macaroon, MacaroonLibrary, Method, Result,
    Storage, ThirdPartyCaveat, Transport, Visitor,
};

pub const RESOURCE: &str = "https://api.test/resource";
pub const IDM: &str = "https://idm.test";

// ─────────────────────────────────────────────────────────────────────────────
// Transport
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Reply {
    Respond(HttpResponse),
    Fail(String),
}

/// Answers by (method, url). Each route plays its replies in order and
/// then keeps repeating the last one. Unknown routes get a 404.
#[derive(Default)]
pub struct RouteTransport {
    routes: Mutex<HashMap<(Method, String), VecDeque<Reply>>>,
    sent: Mutex<Vec<HttpRequest>>,
}

impl RouteTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on(&self, method: Method, url: &str, response: HttpResponse) {
        self.push(method, url, Reply::Respond(response));
    }

    pub fn fail(&self, method: Method, url: &str, message: &str) {
        self.push(method, url, Reply::Fail(message.to_string()));
    }

    fn push(&self, method: Method, url: &str, reply: Reply) {
        self.routes
            .lock()
            .entry((method, url.to_string()))
            .or_default()
            .push_back(reply);
    }

    pub fn sent(&self) -> Vec<HttpRequest> {
        self.sent.lock().clone()
    }

    pub fn sent_to(&self, url: &str) -> Vec<HttpRequest> {
        self.sent().into_iter().filter(|r| r.url == url).collect()
    }

    /// `(method, url)` of every request, in order.
    pub fn trace(&self) -> Vec<(Method, String)> {
        self.sent().into_iter().map(|r| (r.method, r.url)).collect()
    }
}

#[async_trait]
impl Transport for RouteTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        self.sent.lock().push(request.clone());

        let reply = {
            let mut routes = self.routes.lock();
            match routes.get_mut(&(request.method, request.url.clone())) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        match reply {
            Some(Reply::Respond(response)) => Ok(response),
            Some(Reply::Fail(message)) => Err(BakeryError::Transport(message)),
            None => Ok(HttpResponse::new(404, "not found")),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Macaroon library
// ─────────────────────────────────────────────────────────────────────────────

/// Macaroons are plain JSON:
/// `{"identifier": .., "location": .., "caveats": [{"location": .., "id": ..}]}`.
///
/// Discharging walks caveats breadth first, including those of acquired
/// discharges. `"fail_walk": true` makes the walk fail.
#[derive(Default)]
pub struct FakeLibrary {
    pub acquired: Mutex<Vec<ThirdPartyCaveat>>,
}

impl FakeLibrary {
    fn caveats(macaroon: &Macaroon) -> Vec<ThirdPartyCaveat> {
        let json = macaroon.as_json();
        let location = json
            .get("location")
            .and_then(Value::as_str)
            .map(str::to_string);
        json.get("caveats")
            .and_then(Value::as_array)
            .map(|caveats| {
                caveats
                    .iter()
                    .map(|c| ThirdPartyCaveat {
                        location: location.clone(),
                        third_party_location: c["location"].as_str().unwrap_or_default().to_string(),
                        condition: c["id"].as_str().unwrap_or_default().as_bytes().to_vec(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl MacaroonLibrary for FakeLibrary {
    fn import(&self, exported: &Value) -> Result<Macaroon> {
        if exported.get("identifier").and_then(Value::as_str).is_none() {
            return Err(BakeryError::Macaroon("macaroon has no identifier".to_string()));
        }
        Ok(Macaroon::from_exported(exported.clone()))
    }

    async fn discharge_all(
        &self,
        macaroon: Macaroon,
        acquirer: &dyn DischargeAcquirer,
    ) -> Result<Vec<Macaroon>> {
        if macaroon.as_json().get("fail_walk") == Some(&Value::Bool(true)) {
            return Err(BakeryError::Macaroon("walk exploded".to_string()));
        }

        let mut bound = vec![macaroon.clone()];
        let mut queue = VecDeque::from([macaroon]);
        while let Some(next) = queue.pop_front() {
            for caveat in Self::caveats(&next) {
                self.acquired.lock().push(caveat.clone());
                let discharge = acquirer.acquire(&caveat).await?;
                bound.push(discharge.clone());
                queue.push_back(discharge);
            }
        }
        Ok(bound)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Visitor / cookies / storage
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingVisitor {
    pub visits: Mutex<Vec<ErrorResponse>>,
}

impl Visitor for RecordingVisitor {
    fn visit(&self, error: &ErrorResponse) {
        self.visits.lock().push(error.clone());
    }
}

#[derive(Default)]
pub struct RecordingCookieSetter {
    pub cookies: Mutex<Vec<Value>>,
}

#[async_trait]
impl CookieSetter for RecordingCookieSetter {
    async fn set_cookie(&self, macaroons: &Value) -> Result<()> {
        self.cookies.lock().push(macaroons.clone());
        Ok(())
    }
}

/// In-memory storage that also records every write.
#[derive(Debug, Default)]
pub struct RecordingStorage {
    items: InMemoryStorage,
    pub writes: Mutex<Vec<(String, String)>>,
}

impl Storage for RecordingStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        self.items.get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.writes.lock().push((key.to_string(), value.to_string()));
        self.items.set_item(key, value)
    }

    fn clear(&self) -> Result<()> {
        self.items.clear()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Fixtures
// ─────────────────────────────────────────────────────────────────────────────

pub struct Harness {
    pub bakery: Bakery,
    pub transport: Arc<RouteTransport>,
    pub library: Arc<FakeLibrary>,
    pub visitor: Arc<RecordingVisitor>,
    pub storage: Arc<RecordingStorage>,
    pub cookies: Arc<RecordingCookieSetter>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(BakeryConfig::default())
    }

    pub fn with_config(config: BakeryConfig) -> Self {
        let transport = RouteTransport::new();
        let library = Arc::new(FakeLibrary::default());
        let visitor = Arc::new(RecordingVisitor::default());
        let storage = Arc::new(RecordingStorage::default());
        let cookies = Arc::new(RecordingCookieSetter::default());

        let bakery = Bakery::builder()
            .config(config)
            .transport(transport.clone())
            .macaroon_library(library.clone())
            .visitor(visitor.clone())
            .storage(storage.clone())
            .cookie_setter(cookies.clone())
            .build()
            .expect("failed to build bakery");

        Self {
            bakery,
            transport,
            library,
            visitor,
            storage,
            cookies,
        }
    }
}

/// A macaroon with one third-party caveat addressed to `third_party`.
pub fn caveated_macaroon(id: &str, third_party: &str) -> Value {
    json!({
        "identifier": id,
        "location": "https://api.test",
        "caveats": [{"location": third_party, "id": "is-authenticated-user"}]
    })
}

pub fn discharge_required(macaroon: Value) -> HttpResponse {
    HttpResponse::json(
        401,
        json!({
            "Code": "macaroon discharge required",
            "Message": "verification failed",
            "Info": {"Macaroon": macaroon}
        })
        .to_string(),
    )
}

pub fn interaction_required(visit_url: &str, wait_url: &str) -> HttpResponse {
    HttpResponse::json(
        401,
        json!({
            "Code": "interaction required",
            "Message": "please log in",
            "Info": {"VisitURL": visit_url, "WaitURL": wait_url}
        })
        .to_string(),
    )
}

pub fn discharge_response(id: &str) -> HttpResponse {
    HttpResponse::json(200, json!({"Macaroon": {"identifier": id}}).to_string())
}
