//! Environment-driven ERP configuration.
//!
//! Service credentials never appear on the command line; they are read
//! from the environment at startup and never logged.

use std::sync::Arc;

use forgeline_core::{
    AuthenticatedTransport, CredentialManager, FetchConfig, FetchEngine, HttpBulkBackend,
    HttpTokenProvider, QueryEngine, ReqwestHttpClient, ServiceCredentials,
};

use crate::error::CliError;

/// ERP endpoints and service credentials, resolved from the environment.
pub struct ErpConfig {
    pub base_url: String,
    pub token_url: String,
    pub bulk_url: Option<String>,
    credentials: ServiceCredentials,
}

impl ErpConfig {
    pub fn from_env() -> Result<Self, CliError> {
        Ok(Self {
            base_url: require_env("FORGELINE_BASE_URL")?,
            token_url: require_env("FORGELINE_TOKEN_URL")?,
            bulk_url: std::env::var("FORGELINE_BULK_URL").ok(),
            credentials: ServiceCredentials {
                client_id: require_env("FORGELINE_CLIENT_ID")?,
                client_secret: require_env("FORGELINE_CLIENT_SECRET")?,
                account_key: require_env("FORGELINE_ACCOUNT_KEY")?,
                account_secret: require_env("FORGELINE_ACCOUNT_SECRET")?,
            },
        })
    }

    fn transport(&self) -> AuthenticatedTransport {
        let http = Arc::new(ReqwestHttpClient::new());
        let provider = HttpTokenProvider::new(
            http.clone() as Arc<dyn forgeline_core::HttpClient>,
            &self.token_url,
            self.credentials.clone(),
        );
        let credentials = Arc::new(CredentialManager::new(Arc::new(provider)));
        AuthenticatedTransport::new(http, credentials)
    }

    pub fn fetch_engine(&self) -> FetchEngine {
        FetchEngine::new(self.transport(), &self.base_url, FetchConfig::default())
    }

    /// Full query engine; the bulk backend is wired only when
    /// `FORGELINE_BULK_URL` is set.
    pub fn query_engine(&self) -> QueryEngine {
        let mut engine = QueryEngine::new(Arc::new(self.fetch_engine()));
        if let Some(bulk_url) = &self.bulk_url {
            engine = engine
                .with_bulk_backend(Arc::new(HttpBulkBackend::new(self.transport(), bulk_url)));
        }
        engine
    }
}

fn require_env(name: &'static str) -> Result<String, CliError> {
    std::env::var(name).map_err(|_| CliError::MissingEnv(name))
}
