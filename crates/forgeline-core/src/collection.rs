//! Collection-query requests, results, and the wire envelope.
//!
//! The ERP exposes business entities as named collections queried one at
//! a time: a field list, an opaque filter expression, an optional
//! ordering hint, and a row cap. Responses come back as a JSON envelope
//! holding a success flag and an array of records, each record an array
//! of `{name, value}` pairs. Fields with the internal `_` prefix are
//! excluded by convention during decode.

use std::time::Duration;

use forgeline_staging::Record;
use serde::Deserialize;
use serde_json::Value;

use crate::error::CoreError;

/// Default row cap when a request does not set one.
pub const DEFAULT_MAX_ROWS: usize = 1_000;

/// One immutable query against one named collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionRequest {
    collection: String,
    fields: Vec<String>,
    filter: Option<String>,
    order_by: Option<String>,
    max_rows: usize,
}

impl CollectionRequest {
    /// # Errors
    /// Rejects an empty collection name, an empty field list, or blank
    /// field names.
    pub fn new<I, S>(collection: impl Into<String>, fields: I) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let collection = collection.into();
        if collection.trim().is_empty() {
            return Err(CoreError::InvalidRequest(String::from(
                "collection name must not be empty",
            )));
        }

        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        if fields.is_empty() {
            return Err(CoreError::InvalidRequest(format!(
                "collection request for '{collection}' must select at least one field"
            )));
        }
        if fields.iter().any(|field| field.trim().is_empty()) {
            return Err(CoreError::InvalidRequest(format!(
                "collection request for '{collection}' contains a blank field name"
            )));
        }

        Ok(Self {
            collection,
            fields,
            filter: None,
            order_by: None,
            max_rows: DEFAULT_MAX_ROWS,
        })
    }

    /// Opaque filter expression, passed through to the service unparsed.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = max_rows.max(1);
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn max_rows(&self) -> usize {
        self.max_rows
    }

    /// Build the collection-query URL against a base endpoint.
    ///
    /// Filter and ordering expressions are URL-encoded; they are opaque
    /// strings and never participate in any SQL this system builds.
    pub fn query_url(&self, base_url: &str) -> String {
        let mut url = format!(
            "{}/collections/{}?fields={}&max_rows={}",
            base_url.trim_end_matches('/'),
            urlencoding::encode(&self.collection),
            urlencoding::encode(&self.fields.join(",")),
            self.max_rows
        );
        if let Some(filter) = &self.filter {
            url.push_str("&filter=");
            url.push_str(&urlencoding::encode(filter));
        }
        if let Some(order_by) = &self.order_by {
            url.push_str("&order_by=");
            url.push_str(&urlencoding::encode(order_by));
        }
        url
    }
}

/// Why a collection fetch failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    /// Credential acquisition/refresh failed; fatal for the request
    /// once the pipeline sees it.
    Authentication(String),
    /// Retry budget exhausted against 429 responses.
    RateLimited { attempts: u32 },
    /// Anything else: 5xx, timeout, malformed envelope.
    Other(String),
}

impl FetchFailure {
    pub fn message(&self) -> String {
        match self {
            Self::Authentication(message) => message.clone(),
            Self::RateLimited { attempts } => {
                format!("rate limit budget exhausted after {attempts} attempts")
            }
            Self::Other(message) => message.clone(),
        }
    }
}

/// Outcome of one collection fetch. A failed fetch carries an empty
/// record list and a failure reason; it never panics or escapes the
/// fetch engine as `Err`.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResult {
    pub collection: String,
    pub records: Vec<Record>,
    pub success: bool,
    pub elapsed: Duration,
    pub error: Option<FetchFailure>,
}

impl FetchResult {
    pub fn ok(collection: impl Into<String>, records: Vec<Record>, elapsed: Duration) -> Self {
        Self {
            collection: collection.into(),
            records,
            success: true,
            elapsed,
            error: None,
        }
    }

    pub fn failed(collection: impl Into<String>, elapsed: Duration, failure: FetchFailure) -> Self {
        Self {
            collection: collection.into(),
            records: Vec::new(),
            success: false,
            elapsed,
            error: Some(failure),
        }
    }
}

#[derive(Debug, Deserialize)]
struct QueryEnvelope {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    items: Vec<Vec<FieldPair>>,
}

#[derive(Debug, Deserialize)]
struct FieldPair {
    name: String,
    #[serde(default)]
    value: Value,
}

/// Decode a collection-query response body into records.
///
/// # Errors
/// [`CoreError::Fetch`] for a JSON parse failure or an envelope with
/// `success=false`.
pub fn decode_envelope(collection: &str, body: &str) -> Result<Vec<Record>, CoreError> {
    let envelope: QueryEnvelope =
        serde_json::from_str(body).map_err(|e| CoreError::Fetch {
            collection: collection.to_string(),
            message: format!("malformed response envelope: {e}"),
        })?;

    if !envelope.success {
        return Err(CoreError::Fetch {
            collection: collection.to_string(),
            message: envelope
                .message
                .unwrap_or_else(|| String::from("service reported failure")),
        });
    }

    let records = envelope
        .items
        .into_iter()
        .map(|pairs| {
            pairs
                .into_iter()
                .filter(|pair| !pair.name.starts_with('_'))
                .map(|pair| (pair.name, pair.value))
                .collect::<Record>()
        })
        .collect();

    Ok(records)
}
