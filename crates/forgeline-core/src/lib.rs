//! # Forgeline Core
//!
//! Data-access engine for the Forgeline fabrication toolkit: credentialed
//! access to an ERP's collection-query API, parallel fetching, and routed
//! staged queries over an in-memory join store.
//!
//! ## Overview
//!
//! This crate provides the foundational components for Forgeline:
//!
//! - **Credential manager** caching short-lived bearer tokens with
//!   single-flight refresh
//! - **Authenticated transport** that injects tokens and retries a stale
//!   one exactly once
//! - **Fetch engine** running bounded-concurrency collection queries with
//!   rate-limit backoff and partial-result semantics
//! - **Source router** choosing between the live interactive API and the
//!   warehouse replica from volume and freshness
//! - **Staged-query pipeline** joining fetched collections through
//!   [`forgeline_staging`]
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`collection`] | Collection requests, results, and the wire envelope |
//! | [`credentials`] | Token acquisition and the credential cache |
//! | [`error`] | Core error types |
//! | [`fetch`] | Parallel fetch engine |
//! | [`http_client`] | HTTP client abstraction |
//! | [`pipeline`] | Staged-query execution |
//! | [`retry`] | Backoff policy for rate-limited fetches |
//! | [`routing`] | Volume/freshness source routing |
//! | [`transport`] | Authenticated transport |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use forgeline_core::{
//!     AuthenticatedTransport, CollectionRequest, CredentialManager, FetchConfig, FetchEngine,
//!     Freshness, HttpTokenProvider, JoinPlan, QueryEngine, ReqwestHttpClient, ServiceCredentials,
//!     StagedQuery, TableBinding, VolumeEstimate,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let http = Arc::new(ReqwestHttpClient::new());
//!     let provider = HttpTokenProvider::new(
//!         http.clone(),
//!         "https://erp.example.com/token",
//!         ServiceCredentials {
//!             client_id: std::env::var("FORGELINE_CLIENT_ID")?,
//!             client_secret: std::env::var("FORGELINE_CLIENT_SECRET")?,
//!             account_key: std::env::var("FORGELINE_ACCOUNT_KEY")?,
//!             account_secret: std::env::var("FORGELINE_ACCOUNT_SECRET")?,
//!         },
//!     );
//!     let credentials = Arc::new(CredentialManager::new(Arc::new(provider)));
//!     let transport = AuthenticatedTransport::new(http, credentials);
//!     let engine =
//!         FetchEngine::new(transport, "https://erp.example.com/api", FetchConfig::default());
//!
//!     let query = StagedQuery::new(
//!         vec![CollectionRequest::new("SLItems", ["item", "qty_on_hand"])?],
//!         JoinPlan::new("SELECT item, qty_on_hand FROM SLItems ORDER BY item")?
//!             .with_table(TableBinding::new("SLItems", "SLItems")),
//!         VolumeEstimate::new(500)?,
//!         Freshness::Immediate,
//!     )?;
//!     let outcome = QueryEngine::new(Arc::new(engine)).execute(query).await?;
//!     println!("{} rows via {}", outcome.row_count(), outcome.backend.as_str());
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! All operations return `Result` with a structured [`CoreError`]; fetch
//! failures inside a batch are absorbed into per-collection results
//! rather than failing the batch, with the single exception of
//! authentication failures, which always fail the whole request.
//!
//! ## Security
//!
//! - Service credentials are supplied by the caller (conventionally from
//!   environment variables) and never logged
//! - Join-plan parameters travel as `?` placeholders end to end; values
//!   are never interpolated into SQL

pub mod collection;
pub mod credentials;
pub mod error;
pub mod fetch;
pub mod http_client;
pub mod pipeline;
pub mod retry;
pub mod routing;
pub mod transport;

// Re-export commonly used types at crate root for convenience

// Collection queries
pub use collection::{
    decode_envelope, CollectionRequest, FetchFailure, FetchResult, DEFAULT_MAX_ROWS,
};

// Credentials
pub use credentials::{
    Credential, CredentialManager, HttpTokenProvider, ServiceCredentials, TokenKind, TokenProvider,
};

// Error types
pub use error::CoreError;

// Fetch engine
pub use fetch::{FetchConfig, FetchEngine, Fetcher};

// HTTP client types
pub use http_client::{
    HttpAuth, HttpClient, HttpError, HttpMethod, HttpRequest, HttpResponse, NoopHttpClient,
    ReqwestHttpClient,
};

// Pipeline
pub use pipeline::{BulkBackend, HttpBulkBackend, QueryEngine, QueryOutcome, StagedQuery};

// Retry logic
pub use retry::{Backoff, RetryConfig};

// Routing
pub use routing::{Backend, Freshness, RouterConfig, VolumeEstimate};

// Staging (re-exported from forgeline-staging)
pub use forgeline_staging::{JoinPlan, Record, StagingError, StagingStore, TableBinding};

// Transport
pub use transport::AuthenticatedTransport;
