//! Staged-query pipeline: route, fetch, stage, join.
//!
//! A staged query names the collections it needs, a join plan over them,
//! and a volume/freshness pair for routing. The interactive path fetches
//! collections live and joins them in an in-memory staging store; the
//! bulk path ships the plan's SQL to the warehouse replica and returns
//! its rows directly.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use forgeline_staging::{JoinPlan, Record, StagingStore};
use serde::Deserialize;
use serde_json::Value;

use crate::collection::{CollectionRequest, FetchFailure};
use crate::error::CoreError;
use crate::fetch::Fetcher;
use crate::http_client::HttpRequest;
use crate::routing::{Backend, Freshness, RouterConfig, VolumeEstimate};
use crate::transport::AuthenticatedTransport;

/// One routed query: collections to stage, the join over them, and the
/// routing inputs.
#[derive(Debug)]
pub struct StagedQuery {
    requests: Vec<CollectionRequest>,
    plan: JoinPlan,
    estimate: VolumeEstimate,
    freshness: Freshness,
}

impl StagedQuery {
    /// # Errors
    /// Rejects an empty request list and plans whose table bindings
    /// reference collections the query does not fetch.
    pub fn new(
        requests: Vec<CollectionRequest>,
        plan: JoinPlan,
        estimate: VolumeEstimate,
        freshness: Freshness,
    ) -> Result<Self, CoreError> {
        if requests.is_empty() {
            return Err(CoreError::InvalidRequest(String::from(
                "staged query must fetch at least one collection",
            )));
        }
        for binding in plan.tables() {
            if !requests
                .iter()
                .any(|request| request.collection() == binding.collection)
            {
                return Err(CoreError::InvalidRequest(format!(
                    "join plan binds collection '{}' which the query does not fetch",
                    binding.collection
                )));
            }
        }
        Ok(Self {
            requests,
            plan,
            estimate,
            freshness,
        })
    }

    pub fn requests(&self) -> &[CollectionRequest] {
        &self.requests
    }

    pub fn plan(&self) -> &JoinPlan {
        &self.plan
    }
}

/// Result of a staged query, with enough telemetry to explain how it was
/// served.
#[derive(Debug)]
pub struct QueryOutcome {
    pub rows: Vec<Record>,
    pub backend: Backend,
    pub elapsed_ms: u64,
    /// Collections whose fetch failed non-fatally; they joined as empty
    /// tables.
    pub failed_collections: Vec<String>,
}

impl QueryOutcome {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Warehouse-replica query interface.
///
/// The SQL and its `?` parameters travel separately; parameter values are
/// never interpolated into the statement on either side.
pub trait BulkBackend: Send + Sync {
    fn query<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [Value],
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Record>, CoreError>> + Send + 'a>>;
}

#[derive(Debug, Deserialize)]
struct BulkEnvelope {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    rows: Vec<Record>,
}

/// Production bulk backend: POSTs `{sql, params}` to the warehouse query
/// endpoint over the authenticated transport.
pub struct HttpBulkBackend {
    transport: AuthenticatedTransport,
    query_url: String,
}

impl HttpBulkBackend {
    pub fn new(transport: AuthenticatedTransport, query_url: impl Into<String>) -> Self {
        Self {
            transport,
            query_url: query_url.into(),
        }
    }
}

impl BulkBackend for HttpBulkBackend {
    fn query<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [Value],
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Record>, CoreError>> + Send + 'a>> {
        Box::pin(async move {
            let body = serde_json::json!({ "sql": sql, "params": params });
            let request = HttpRequest::post(&self.query_url).with_json_body(body.to_string());
            let response = self.transport.execute(request).await?;

            if !response.is_success() {
                return Err(CoreError::Bulk(format!(
                    "warehouse query endpoint returned status {}",
                    response.status
                )));
            }

            let envelope: BulkEnvelope = serde_json::from_str(&response.body)
                .map_err(|e| CoreError::Bulk(format!("malformed warehouse response: {e}")))?;
            if !envelope.success {
                return Err(CoreError::Bulk(
                    envelope
                        .message
                        .unwrap_or_else(|| String::from("warehouse reported failure")),
                ));
            }
            Ok(envelope.rows)
        })
    }
}

/// Executes staged queries end to end.
pub struct QueryEngine {
    fetcher: Arc<dyn Fetcher>,
    bulk: Option<Arc<dyn BulkBackend>>,
    router: RouterConfig,
}

impl QueryEngine {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            bulk: None,
            router: RouterConfig::default(),
        }
    }

    pub fn with_bulk_backend(mut self, bulk: Arc<dyn BulkBackend>) -> Self {
        self.bulk = Some(bulk);
        self
    }

    pub fn with_router(mut self, router: RouterConfig) -> Self {
        self.router = router;
        self
    }

    /// Route and execute one staged query.
    ///
    /// # Errors
    /// - [`CoreError::VolumeExceeded`] when routing finds no viable
    ///   backend.
    /// - [`CoreError::Authentication`] when any collection fetch fails to
    ///   authenticate; the whole request fails rather than returning
    ///   silently partial data.
    /// - [`CoreError::Bulk`] / [`CoreError::Staging`] from the serving
    ///   backend.
    pub async fn execute(&self, query: StagedQuery) -> Result<QueryOutcome, CoreError> {
        let request_id = uuid::Uuid::new_v4();
        let started = Instant::now();

        let mut router = self.router.clone();
        router.bulk_available = self.bulk.is_some();
        let backend = router.select_backend(query.estimate, query.freshness)?;

        tracing::info!(
            %request_id,
            backend = backend.as_str(),
            collections = query.requests.len(),
            rows_estimated = query.estimate.rows(),
            "executing staged query"
        );

        let outcome = match backend {
            Backend::Interactive => self.execute_interactive(&query, started).await?,
            Backend::Bulk => {
                // Routing never picks bulk unless a backend is wired up.
                let bulk = self
                    .bulk
                    .as_ref()
                    .ok_or_else(|| CoreError::Bulk(String::from("no bulk backend configured")))?;
                let rows = bulk.query(query.plan.sql(), query.plan.params()).await?;
                QueryOutcome {
                    rows,
                    backend: Backend::Bulk,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                    failed_collections: Vec::new(),
                }
            }
        };

        tracing::info!(
            %request_id,
            rows = outcome.row_count(),
            elapsed_ms = outcome.elapsed_ms,
            failed = outcome.failed_collections.len(),
            "staged query complete"
        );
        Ok(outcome)
    }

    async fn execute_interactive(
        &self,
        query: &StagedQuery,
        started: Instant,
    ) -> Result<QueryOutcome, CoreError> {
        let results = self.fetcher.fetch_many(query.requests.to_vec()).await;

        let mut tables: BTreeMap<String, Vec<Record>> = BTreeMap::new();
        let mut failed_collections = Vec::new();
        for (collection, result) in &results {
            if let Some(FetchFailure::Authentication(message)) = &result.error {
                return Err(CoreError::Authentication(message.clone()));
            }
            if !result.success {
                tracing::warn!(
                    collection = %collection,
                    error = %result.error.as_ref().map(FetchFailure::message).unwrap_or_default(),
                    "collection fetch failed, staging as empty table"
                );
                failed_collections.push(collection.clone());
            }
            tables.insert(collection.clone(), result.records.clone());
        }

        // Declared columns keep empty or failed collections joinable.
        let mut plan = query.plan.clone();
        for request in &query.requests {
            plan.declare_columns_for(request.collection(), request.fields());
        }

        let store = StagingStore::new()?;
        let rows = store.join(&tables, &plan)?;

        Ok(QueryOutcome {
            rows,
            backend: Backend::Interactive,
            elapsed_ms: started.elapsed().as_millis() as u64,
            failed_collections,
        })
    }
}
