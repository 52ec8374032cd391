//! Authenticated transport: token attachment and the single 401 retry.

use std::sync::Arc;

use crate::credentials::CredentialManager;
use crate::error::CoreError;
use crate::http_client::{HttpAuth, HttpClient, HttpRequest, HttpResponse};

/// Wraps an [`HttpClient`], injecting the current bearer token into every
/// call.
///
/// On a 401 the cached credential is invalidated and the call retried
/// exactly once with a fresh token; a second consecutive 401 surfaces as
/// [`CoreError::Authentication`]. There is no retry loop here; backoff
/// for rate limits lives in the fetch engine.
pub struct AuthenticatedTransport {
    http: Arc<dyn HttpClient>,
    credentials: Arc<CredentialManager>,
}

impl AuthenticatedTransport {
    pub fn new(http: Arc<dyn HttpClient>, credentials: Arc<CredentialManager>) -> Self {
        Self { http, credentials }
    }

    pub fn credentials(&self) -> &Arc<CredentialManager> {
        &self.credentials
    }

    /// Execute a request with the current token.
    ///
    /// # Errors
    /// - [`CoreError::Authentication`] when token acquisition fails or
    ///   the service rejects two consecutive tokens.
    /// - [`CoreError::Transport`] for timeouts and connection failures.
    pub async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, CoreError> {
        let token = self.credentials.token().await?;
        let authed = request
            .clone()
            .with_auth(&HttpAuth::BearerToken(token));
        let response = self
            .http
            .execute(authed)
            .await
            .map_err(|e| CoreError::Transport(e.message().to_string()))?;

        if !response.is_unauthorized() {
            return Ok(response);
        }

        // Stale token: re-authenticate once and replay the request.
        tracing::debug!(url = %request.url, "401 response, refreshing credential and retrying");
        self.credentials.invalidate().await;
        let token = self.credentials.token().await?;
        let retried = self
            .http
            .execute(request.clone().with_auth(&HttpAuth::BearerToken(token)))
            .await
            .map_err(|e| CoreError::Transport(e.message().to_string()))?;

        if retried.is_unauthorized() {
            return Err(CoreError::Authentication(format!(
                "authorization rejected twice for {}",
                request.url
            )));
        }

        Ok(retried)
    }
}
