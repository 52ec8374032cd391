//! Parallel fetch engine: bounded-concurrency collection queries with
//! rate-limit backoff and partial-result semantics.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::collection::{decode_envelope, CollectionRequest, FetchFailure, FetchResult};
use crate::error::CoreError;
use crate::http_client::HttpRequest;
use crate::retry::RetryConfig;
use crate::transport::AuthenticatedTransport;

/// Tuning for the fetch engine.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Simultaneous in-flight collection queries; excess requests queue.
    pub concurrency: usize,
    /// Per-collection retry budget against 429 responses.
    pub retry: RetryConfig,
    /// Per-call timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            concurrency: 6,
            retry: RetryConfig::default(),
            timeout_ms: 30_000,
        }
    }
}

/// Capability interface for anything that can fetch collections.
///
/// The pipeline depends on this seam rather than the concrete engine so
/// tests can script fetch outcomes without a transport.
pub trait Fetcher: Send + Sync {
    fn fetch_many<'a>(
        &'a self,
        requests: Vec<CollectionRequest>,
    ) -> Pin<Box<dyn Future<Output = BTreeMap<String, FetchResult>> + Send + 'a>>;
}

struct FetchInner {
    transport: AuthenticatedTransport,
    base_url: String,
    config: FetchConfig,
}

/// Issues collection queries concurrently over the authenticated
/// transport.
///
/// One bad collection never fails the batch: its result is marked failed
/// with an empty record list, and siblings complete normally. No
/// completion-order guarantee exists; the result map is keyed (and
/// therefore iterated) by collection name.
pub struct FetchEngine {
    inner: Arc<FetchInner>,
}

impl FetchEngine {
    pub fn new(
        transport: AuthenticatedTransport,
        base_url: impl Into<String>,
        config: FetchConfig,
    ) -> Self {
        Self {
            inner: Arc::new(FetchInner {
                transport,
                base_url: base_url.into(),
                config,
            }),
        }
    }

    /// Fetch every requested collection, bounded by the concurrency cap.
    ///
    /// Never fails outright: per-collection failures are absorbed into
    /// their [`FetchResult`]s.
    pub async fn fetch_many(
        &self,
        requests: Vec<CollectionRequest>,
    ) -> BTreeMap<String, FetchResult> {
        let semaphore = Arc::new(Semaphore::new(self.inner.config.concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for request in requests {
            let inner = Arc::clone(&self.inner);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return FetchResult::failed(
                            request.collection(),
                            Duration::ZERO,
                            FetchFailure::Other(String::from("fetch pool closed")),
                        )
                    }
                };
                inner.fetch_one(&request).await
            });
        }

        let mut results = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => {
                    results.insert(result.collection.clone(), result);
                }
                Err(error) => {
                    tracing::error!(%error, "collection fetch task failed to join");
                }
            }
        }
        results
    }
}

impl Fetcher for FetchEngine {
    fn fetch_many<'a>(
        &'a self,
        requests: Vec<CollectionRequest>,
    ) -> Pin<Box<dyn Future<Output = BTreeMap<String, FetchResult>> + Send + 'a>> {
        Box::pin(self.fetch_many(requests))
    }
}

impl FetchInner {
    async fn fetch_one(&self, request: &CollectionRequest) -> FetchResult {
        let started = Instant::now();
        let collection = request.collection().to_string();
        let url = request.query_url(&self.base_url);
        let max_attempts = self.config.retry.max_attempts.max(1);

        for attempt in 0..max_attempts {
            let call = HttpRequest::get(url.clone()).with_timeout_ms(self.config.timeout_ms);
            let response = match self.transport.execute(call).await {
                Ok(response) => response,
                Err(CoreError::Authentication(message)) => {
                    return FetchResult::failed(
                        collection,
                        started.elapsed(),
                        FetchFailure::Authentication(message),
                    );
                }
                Err(error) => {
                    return FetchResult::failed(
                        collection,
                        started.elapsed(),
                        FetchFailure::Other(error.to_string()),
                    );
                }
            };

            if response.is_rate_limited() {
                if attempt + 1 >= max_attempts {
                    tracing::warn!(
                        collection = %collection,
                        attempts = max_attempts,
                        "rate limit budget exhausted"
                    );
                    return FetchResult::failed(
                        collection,
                        started.elapsed(),
                        FetchFailure::RateLimited {
                            attempts: max_attempts,
                        },
                    );
                }
                let delay = self
                    .config
                    .retry
                    .delay_for_attempt(attempt, response.retry_after_secs);
                tracing::debug!(
                    collection = %collection,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "rate limited, backing off"
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            if !response.is_success() {
                return FetchResult::failed(
                    collection,
                    started.elapsed(),
                    FetchFailure::Other(format!("service returned status {}", response.status)),
                );
            }

            return match decode_envelope(&collection, &response.body) {
                Ok(records) => {
                    tracing::debug!(
                        collection = %collection,
                        rows = records.len(),
                        attempt,
                        "collection fetched"
                    );
                    FetchResult::ok(collection, records, started.elapsed())
                }
                Err(error) => FetchResult::failed(
                    collection,
                    started.elapsed(),
                    FetchFailure::Other(error.to_string()),
                ),
            };
        }

        FetchResult::failed(
            collection,
            started.elapsed(),
            FetchFailure::RateLimited {
                attempts: max_attempts,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{Credential, CredentialManager, TokenProvider};
    use crate::http_client::{HttpClient, HttpError, HttpResponse};
    use crate::retry::Backoff;
    use std::sync::Mutex;
    use time::OffsetDateTime;

    struct StaticProvider;

    impl TokenProvider for StaticProvider {
        fn acquire<'a>(
            &'a self,
        ) -> Pin<Box<dyn Future<Output = Result<Credential, CoreError>> + Send + 'a>> {
            Box::pin(async move {
                Ok(Credential::bearer(
                    "token-static",
                    OffsetDateTime::now_utc() + time::Duration::hours(1),
                ))
            })
        }
    }

    /// Scripted responses per collection, matched by URL substring, with
    /// call timestamps recorded for backoff assertions.
    struct CollectionScript {
        scripts: Mutex<BTreeMap<String, Vec<Result<HttpResponse, HttpError>>>>,
        call_times: Mutex<Vec<(String, Instant)>>,
    }

    impl CollectionScript {
        fn new() -> Self {
            Self {
                scripts: Mutex::new(BTreeMap::new()),
                call_times: Mutex::new(Vec::new()),
            }
        }

        fn script(
            self,
            collection: &str,
            responses: Vec<Result<HttpResponse, HttpError>>,
        ) -> Self {
            self.scripts
                .lock()
                .unwrap()
                .insert(collection.to_string(), responses);
            self
        }

        fn times_for(&self, collection: &str) -> Vec<Instant> {
            self.call_times
                .lock()
                .unwrap()
                .iter()
                .filter(|(name, _)| name == collection)
                .map(|(_, at)| *at)
                .collect()
        }
    }

    impl HttpClient for CollectionScript {
        fn execute<'a>(
            &'a self,
            request: HttpRequest,
        ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
            Box::pin(async move {
                let mut scripts = self.scripts.lock().unwrap();
                let Some((collection, responses)) = scripts
                    .iter_mut()
                    .find(|(name, _)| request.url.contains(name.as_str()))
                    .map(|(name, responses)| (name.clone(), responses))
                else {
                    return Err(HttpError::new("no script for url"));
                };
                self.call_times
                    .lock()
                    .unwrap()
                    .push((collection, Instant::now()));
                if responses.is_empty() {
                    return Err(HttpError::new("script exhausted"));
                }
                responses.remove(0)
            })
        }
    }

    fn ok_body(item: &str) -> HttpResponse {
        HttpResponse::ok_json(
            serde_json::json!({
                "success": true,
                "items": [[{"name": "item", "value": item}]]
            })
            .to_string(),
        )
    }

    fn engine(client: Arc<CollectionScript>, retry: RetryConfig) -> FetchEngine {
        let manager = Arc::new(CredentialManager::new(Arc::new(StaticProvider)));
        let transport = AuthenticatedTransport::new(client, manager);
        FetchEngine::new(
            transport,
            "https://erp.example.test/api",
            FetchConfig {
                concurrency: 4,
                retry,
                timeout_ms: 30_000,
            },
        )
    }

    fn requests(names: &[&str]) -> Vec<CollectionRequest> {
        names
            .iter()
            .map(|name| CollectionRequest::new(*name, ["item"]).expect("request"))
            .collect()
    }

    #[tokio::test]
    async fn one_failing_collection_leaves_siblings_unaffected() {
        let client = Arc::new(
            CollectionScript::new()
                .script("SLJobs", vec![Ok(ok_body("J-1"))])
                .script("SLCoItems", vec![Ok(HttpResponse::with_status(500, ""))])
                .script("SLItems", vec![Ok(ok_body("FRAME-12"))]),
        );
        let engine = engine(client, RetryConfig::default());

        let results = engine
            .fetch_many(requests(&["SLJobs", "SLCoItems", "SLItems"]))
            .await;

        assert_eq!(results.len(), 3);
        assert!(results["SLJobs"].success);
        assert!(results["SLItems"].success);
        let failed = &results["SLCoItems"];
        assert!(!failed.success);
        assert!(failed.records.is_empty());
        assert!(matches!(failed.error, Some(FetchFailure::Other(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_twice_then_success_backs_off_increasingly() {
        let client = Arc::new(CollectionScript::new().script(
            "SLItems",
            vec![
                Ok(HttpResponse::with_status(429, "")),
                Ok(HttpResponse::with_status(429, "")),
                Ok(ok_body("FRAME-12")),
            ],
        ));
        let retry = RetryConfig {
            max_attempts: 3,
            backoff: Backoff::Exponential {
                base: Duration::from_secs(1),
                factor: 2.0,
                max: Duration::from_secs(30),
                jitter: false,
            },
        };
        let engine = engine(client.clone(), retry);

        let results = engine.fetch_many(requests(&["SLItems"])).await;

        assert!(results["SLItems"].success);
        assert_eq!(results["SLItems"].records.len(), 1);

        let times = client.times_for("SLItems");
        assert_eq!(times.len(), 3);
        let first_delay = times[1] - times[0];
        let second_delay = times[2] - times[1];
        assert!(first_delay >= Duration::from_secs(1));
        assert!(second_delay >= first_delay);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_hint_overrides_backoff() {
        let client = Arc::new(CollectionScript::new().script(
            "SLItems",
            vec![
                Ok(HttpResponse::with_status(429, "").with_retry_after(7)),
                Ok(ok_body("FRAME-12")),
            ],
        ));
        let retry = RetryConfig {
            max_attempts: 3,
            backoff: Backoff::Fixed {
                delay: Duration::from_secs(1),
            },
        };
        let engine = engine(client.clone(), retry);

        let results = engine.fetch_many(requests(&["SLItems"])).await;

        assert!(results["SLItems"].success);
        let times = client.times_for("SLItems");
        assert!(times[1] - times[0] >= Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_fails_only_that_collection() {
        let client = Arc::new(
            CollectionScript::new()
                .script(
                    "SLItems",
                    vec![
                        Ok(HttpResponse::with_status(429, "")),
                        Ok(HttpResponse::with_status(429, "")),
                        Ok(HttpResponse::with_status(429, "")),
                    ],
                )
                .script("SLJobs", vec![Ok(ok_body("J-1"))]),
        );
        let retry = RetryConfig {
            max_attempts: 3,
            backoff: Backoff::Fixed {
                delay: Duration::from_millis(10),
            },
        };
        let engine = engine(client, retry);

        let results = engine.fetch_many(requests(&["SLItems", "SLJobs"])).await;

        assert!(matches!(
            results["SLItems"].error,
            Some(FetchFailure::RateLimited { attempts: 3 })
        ));
        assert!(results["SLJobs"].success);
    }
}
