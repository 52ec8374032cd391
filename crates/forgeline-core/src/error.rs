//! Core error taxonomy.
//!
//! Per-collection failures (rate-limit exhaustion, fetch errors) are
//! absorbed at the fetch-engine boundary and reported through
//! [`FetchResult`](crate::collection::FetchResult); only whole-request
//! failures reach callers as `Err`. "No rows" is an empty vector, never
//! an error.

use thiserror::Error;

/// Whole-request error categories surfaced by the core.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Credential acquisition or refresh failed. Fatal for the current
    /// request; the transport's single retry is the only retry.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Retry budget exhausted for one collection. Absorbed into partial
    /// results by the fetch engine; surfaces here only when a caller
    /// inspects a single fetch directly.
    #[error("rate limit budget exhausted for collection '{collection}' after {attempts} attempts")]
    RateLimited { collection: String, attempts: u32 },

    /// The router determined no backend can serve the estimated volume.
    #[error("estimated {estimated} rows exceeds the {limit}-row limit; {hint}")]
    VolumeExceeded {
        estimated: u64,
        limit: u64,
        hint: &'static str,
    },

    /// Any other per-collection fetch failure.
    #[error("fetch failed for collection '{collection}': {message}")]
    Fetch { collection: String, message: String },

    /// Staging-store failure (join plan syntax or execution error).
    #[error(transparent)]
    Staging(#[from] forgeline_staging::StagingError),

    /// Transport-level failure outside any HTTP status semantics.
    #[error("transport error: {0}")]
    Transport(String),

    /// Bulk analytical backend failure, propagated as-is.
    #[error("bulk backend error: {0}")]
    Bulk(String),

    /// Request construction rejected before any network activity.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}
