//! Bearer credential acquisition and caching.
//!
//! The ERP token endpoint issues short-lived bearer tokens
//! (conventionally 60 minutes). The [`CredentialManager`] caches at most
//! one credential and refreshes it before expiry; concurrent callers
//! share a single in-flight refresh rather than stampeding the endpoint.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Deserialize;
use time::{Duration, OffsetDateTime};

use crate::error::CoreError;
use crate::http_client::{HttpClient, HttpRequest};

/// Kind of credential issued by the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Bearer,
}

/// An issued credential with its expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
    pub kind: TokenKind,
    pub expires_at: OffsetDateTime,
}

impl Credential {
    pub fn bearer(token: impl Into<String>, expires_at: OffsetDateTime) -> Self {
        Self {
            token: token.into(),
            kind: TokenKind::Bearer,
            expires_at,
        }
    }

    /// Whether the credential expires within `buffer` from now. A token
    /// inside the buffer is never presented to the remote service.
    fn expires_within(&self, buffer: Duration) -> bool {
        OffsetDateTime::now_utc() + buffer >= self.expires_at
    }
}

/// Service-account secrets presented to the token endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub account_key: String,
    pub account_secret: String,
}

/// Acquires a fresh credential from wherever tokens come from.
pub trait TokenProvider: Send + Sync {
    fn acquire<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<Credential, CoreError>> + Send + 'a>>;
}

/// Token-endpoint response shape.
#[derive(Debug, Deserialize)]
struct TokenEnvelope {
    token: String,
    /// Seconds-to-live hint; the endpoint conventionally issues 3600.
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

const fn default_expires_in() -> i64 {
    3600
}

/// Production token provider: POSTs service credentials to the ERP token
/// endpoint.
pub struct HttpTokenProvider {
    http: Arc<dyn HttpClient>,
    token_url: String,
    credentials: ServiceCredentials,
    timeout_ms: u64,
}

impl HttpTokenProvider {
    pub fn new(
        http: Arc<dyn HttpClient>,
        token_url: impl Into<String>,
        credentials: ServiceCredentials,
    ) -> Self {
        Self {
            http,
            token_url: token_url.into(),
            credentials,
            timeout_ms: 30_000,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

impl TokenProvider for HttpTokenProvider {
    fn acquire<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<Credential, CoreError>> + Send + 'a>> {
        Box::pin(async move {
            let body = serde_json::json!({
                "client_id": self.credentials.client_id,
                "client_secret": self.credentials.client_secret,
                "account_key": self.credentials.account_key,
                "account_secret": self.credentials.account_secret,
            });
            let request = HttpRequest::post(&self.token_url)
                .with_json_body(body.to_string())
                .with_timeout_ms(self.timeout_ms);

            let response = self
                .http
                .execute(request)
                .await
                .map_err(|e| CoreError::Authentication(e.message().to_string()))?;

            if !response.is_success() {
                return Err(CoreError::Authentication(format!(
                    "token endpoint returned status {}",
                    response.status
                )));
            }

            let envelope: TokenEnvelope = serde_json::from_str(&response.body)
                .map_err(|e| CoreError::Authentication(format!("malformed token response: {e}")))?;

            Ok(Credential::bearer(
                envelope.token,
                OffsetDateTime::now_utc() + Duration::seconds(envelope.expires_in.max(0)),
            ))
        })
    }
}

/// Caches at most one credential and coordinates refreshes.
///
/// The cache mutex is held across the refresh call itself, so concurrent
/// callers with a cold or stale cache queue behind one provider call and
/// all observe the token it produced.
pub struct CredentialManager {
    provider: Arc<dyn TokenProvider>,
    refresh_buffer: Duration,
    cached: tokio::sync::Mutex<Option<Credential>>,
}

impl CredentialManager {
    pub fn new(provider: Arc<dyn TokenProvider>) -> Self {
        Self {
            provider,
            refresh_buffer: Duration::minutes(5),
            cached: tokio::sync::Mutex::new(None),
        }
    }

    pub fn with_refresh_buffer(mut self, buffer: Duration) -> Self {
        self.refresh_buffer = buffer;
        self
    }

    /// Current token, refreshing first when the cache is empty or the
    /// cached credential is within the refresh buffer of expiry.
    ///
    /// # Errors
    /// [`CoreError::Authentication`] when acquisition fails; never
    /// silently retried here.
    pub async fn token(&self) -> Result<String, CoreError> {
        let mut cached = self.cached.lock().await;

        if let Some(credential) = cached.as_ref() {
            if !credential.expires_within(self.refresh_buffer) {
                return Ok(credential.token.clone());
            }
        }

        tracing::debug!("acquiring fresh ERP credential");
        let fresh = self.provider.acquire().await?;
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }

    /// Drop the cached credential; the next [`token`](Self::token) call
    /// re-authenticates.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }
}
