// Test support for forgeline behavior tests: a scripted ERP double that
// serves the token endpoint and canned collection responses.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

pub use std::sync::Arc;

use forgeline_core::{
    AuthenticatedTransport, CredentialManager, HttpClient, HttpError, HttpRequest, HttpResponse,
    HttpTokenProvider, Record, ServiceCredentials,
};
use serde_json::{json, Value};

pub fn record(pairs: &[(&str, Value)]) -> Record {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

/// Collection-query envelope body for a set of records.
pub fn envelope_body(records: &[Record]) -> String {
    let items: Vec<Vec<Value>> = records
        .iter()
        .map(|record| {
            record
                .iter()
                .map(|(name, value)| json!({"name": name, "value": value}))
                .collect()
        })
        .collect();
    json!({"success": true, "items": items}).to_string()
}

pub const TOKEN_URL: &str = "https://erp.test/token";
pub const BASE_URL: &str = "https://erp.test/api";
pub const BULK_URL: &str = "https://erp.test/bulk";

/// Scripted ERP double. The token endpoint always answers with a fresh
/// numbered token; every other URL is matched by substring against the
/// scripted routes and consumes the next canned response.
pub struct ScriptedErp {
    routes: Mutex<BTreeMap<String, Vec<Result<HttpResponse, HttpError>>>>,
    token_calls: AtomicU32,
    pub seen: Mutex<Vec<HttpRequest>>,
}

impl ScriptedErp {
    pub fn new() -> Self {
        Self {
            routes: Mutex::new(BTreeMap::new()),
            token_calls: AtomicU32::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn script(self, key: &str, responses: Vec<Result<HttpResponse, HttpError>>) -> Self {
        self.routes
            .lock()
            .unwrap()
            .insert(key.to_string(), responses);
        self
    }

    pub fn token_calls(&self) -> u32 {
        self.token_calls.load(Ordering::SeqCst)
    }

    /// Number of non-token requests whose URL contains `key`.
    pub fn requests_to(&self, key: &str) -> usize {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter(|request| request.url.contains(key))
            .count()
    }
}

impl Default for ScriptedErp {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient for ScriptedErp {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        Box::pin(async move {
            if request.url == TOKEN_URL {
                let call = self.token_calls.fetch_add(1, Ordering::SeqCst) + 1;
                return Ok(HttpResponse::ok_json(
                    json!({"token": format!("token-{call}"), "expires_in": 3600}).to_string(),
                ));
            }

            self.seen.lock().unwrap().push(request.clone());
            let mut routes = self.routes.lock().unwrap();
            let Some(responses) = routes
                .iter_mut()
                .find(|(key, _)| request.url.contains(key.as_str()))
                .map(|(_, responses)| responses)
            else {
                return Err(HttpError::new(format!("no script for {}", request.url)));
            };
            if responses.is_empty() {
                return Err(HttpError::new(format!("script exhausted for {}", request.url)));
            }
            responses.remove(0)
        })
    }
}

/// Authenticated transport wired to the scripted double, acquiring real
/// tokens through its token endpoint.
pub fn scripted_transport(client: Arc<ScriptedErp>) -> AuthenticatedTransport {
    let provider = HttpTokenProvider::new(
        client.clone() as Arc<dyn HttpClient>,
        TOKEN_URL,
        ServiceCredentials {
            client_id: String::from("test-client"),
            client_secret: String::from("test-client-secret"),
            account_key: String::from("test-account"),
            account_secret: String::from("test-account-secret"),
        },
    );
    let credentials = Arc::new(CredentialManager::new(Arc::new(provider)));
    AuthenticatedTransport::new(client, credentials)
}
