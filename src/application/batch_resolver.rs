//! Batch Resolver - bulk use case
//!
//! Resolves many locations in one pass while preserving input order and
//! cardinality. Duplicate inputs share one lookup; store and provider calls
//! are chunked, run concurrently under the admission gates, and retried per
//! item so one bad entry cannot fail its neighbours.

use crate::application::context::{Failure, ResolverContext, ResolverSettings};
use crate::domain::entities::{ErrorKind, ResolutionResult, ResolutionSource};
use crate::domain::errors::PortError;
use crate::domain::ports::{DocumentStore, GeoResolver};
use crate::domain::services::CacheLookup;
use crate::domain::value_objects::{GeoCoordinate, LocationKey};
use chrono::Utc;
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

type Outcome<V> = Result<V, PortError>;

/// Bulk resolution pipeline.
#[derive(Clone)]
pub struct BatchResolver {
    ctx: Arc<ResolverContext>,
}

impl BatchResolver {
    /// Create a standalone batch resolver.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        geo: Arc<dyn GeoResolver>,
        settings: ResolverSettings,
    ) -> Self {
        Self::from_context(Arc::new(ResolverContext::new(store, geo, settings)))
    }

    pub(crate) fn from_context(ctx: Arc<ResolverContext>) -> Self {
        Self { ctx }
    }

    /// Resolve every key; `result[i]` always answers `keys[i]`.
    pub async fn resolve_batch(&self, keys: &[LocationKey]) -> Vec<ResolutionResult> {
        let ctx = &self.ctx;
        let mut results: Vec<Option<ResolutionResult>> = vec![None; keys.len()];

        // Dedup in first-seen order; empty keys are answered immediately.
        let mut positions: HashMap<LocationKey, Vec<usize>> = HashMap::new();
        let mut unique: Vec<LocationKey> = Vec::new();
        for (i, key) in keys.iter().enumerate() {
            let key = key.normalized();
            if key.is_empty() {
                results[i] = Some(ResolutionResult::failed(
                    ErrorKind::InvalidInput,
                    "at least one location attribute is required",
                ));
                continue;
            }
            positions
                .entry(key)
                .or_insert_with_key(|k| {
                    unique.push(k.clone());
                    Vec::new()
                })
                .push(i);
        }

        let mut resolved: HashMap<LocationKey, ResolutionResult> = HashMap::new();
        let mut pending: Vec<(LocationKey, CacheLookup)> = Vec::new();
        let mut hits = 0;

        for (key, lookup) in self.lookup_cached(&unique).await {
            match lookup {
                Ok(CacheLookup::Fresh(record)) => {
                    hits += 1;
                    resolved.insert(
                        key,
                        ResolutionResult::resolved(record.iana_code, ResolutionSource::Cache),
                    );
                }
                Ok(lookup) => pending.push((key, lookup)),
                Err(failure) => {
                    resolved.insert(key, failure.into_result());
                }
            }
        }
        let misses = pending.len();

        let outcomes = self.resolve_upstream(&pending).await;
        let completions = pending.into_iter().map(|(key, lookup)| {
            let outcome = outcomes
                .get(&key)
                .cloned()
                .unwrap_or_else(|| Err(Failure::upstream("no upstream outcome produced")));
            async move {
                let result = ctx.complete(key.clone(), lookup, outcome).await;
                (key, result)
            }
        });
        resolved.extend(join_all(completions).await);

        for (key, indexes) in positions {
            if let Some(result) = resolved.get(&key) {
                for i in indexes {
                    results[i] = Some(result.clone());
                }
            }
        }

        let results: Vec<ResolutionResult> = results
            .into_iter()
            .map(|r| {
                r.unwrap_or_else(|| {
                    ResolutionResult::failed(ErrorKind::UpstreamError, "no result produced")
                })
            })
            .collect();

        tracing::info!(
            "batch resolved: inputs={} unique={} hits={} misses={} failures={}",
            keys.len(),
            unique.len(),
            hits,
            misses,
            results.iter().filter(|r| !r.is_success()).count()
        );

        results
    }

    /// Query the store in chunks and classify what comes back.
    ///
    /// A chunk whose query keeps failing fails every key in it.
    async fn lookup_cached(
        &self,
        unique: &[LocationKey],
    ) -> Vec<(LocationKey, Result<CacheLookup, Failure>)> {
        let ctx = &self.ctx;
        let queries = unique.chunks(ctx.store_batch_size).map(|chunk| async move {
            let result = ctx
                .retry
                .run(&ctx.store_gate, "store batch query", || {
                    ctx.store.query_by_attributes_batch(chunk)
                })
                .await;
            (chunk, result)
        });

        let now = Utc::now();
        let mut lookups = Vec::with_capacity(unique.len());
        for (chunk, result) in join_all(queries).await {
            match result {
                Ok(mut found) => {
                    for key in chunk {
                        let records = found.remove(key).unwrap_or_default();
                        let lookup = ctx.cache.classify(&key.to_string(), records, now);
                        lookups.push((key.clone(), Ok(lookup)));
                    }
                }
                Err(e) => {
                    tracing::warn!("store batch query failed for {} keys: {}", chunk.len(), e);
                    let failure = Failure::upstream(format!("document store query failed: {}", e));
                    lookups.extend(chunk.iter().map(|key| (key.clone(), Err(failure.clone()))));
                }
            }
        }
        lookups
    }

    /// Geocode and timezone-resolve every pending key, sharing calls between
    /// keys with the same query string or coordinate.
    async fn resolve_upstream(
        &self,
        pending: &[(LocationKey, CacheLookup)],
    ) -> HashMap<LocationKey, Result<(GeoCoordinate, String), Failure>> {
        let geo = &self.ctx.geo;

        let mut seen = HashSet::new();
        let queries: Vec<String> = pending
            .iter()
            .map(|(key, _)| key.to_query_string())
            .filter(|query| seen.insert(query.clone()))
            .collect();

        let geocoded = self
            .run_batched("geocode batch", &queries, |chunk| async move {
                geo.geocode_batch(&chunk).await
            })
            .await;

        let mut coordinates: Vec<GeoCoordinate> = Vec::new();
        let mut seen_coordinates = HashSet::new();
        let mut located: HashMap<&LocationKey, Result<GeoCoordinate, Failure>> = HashMap::new();
        for (key, _) in pending {
            let query = key.to_query_string();
            let outcome = match geocoded.get(&query) {
                Some(Ok(Some(coordinate))) => {
                    if seen_coordinates.insert(*coordinate) {
                        coordinates.push(*coordinate);
                    }
                    Ok(*coordinate)
                }
                Some(Ok(None)) => Err(Failure::not_found(format!(
                    "no geocode result for '{}'",
                    query
                ))),
                Some(Err(e)) => Err(Failure::upstream(format!(
                    "geocode failed for '{}': {}",
                    query, e
                ))),
                None => Err(Failure::upstream(format!("geocode produced no outcome for '{}'", query))),
            };
            located.insert(key, outcome);
        }

        let zones = if geo.supports_timezone_batch() {
            self.run_batched("timezone batch", &coordinates, |chunk| async move {
                geo.timezone_for_batch(&chunk).await
            })
            .await
        } else {
            self.lookup_timezones(&coordinates).await
        };

        located
            .into_iter()
            .map(|(key, location)| {
                let outcome = location.and_then(|coordinate| match zones.get(&coordinate) {
                    Some(Ok(Some(iana))) => Ok((coordinate, iana.clone())),
                    Some(Ok(None)) => Err(Failure::not_found(format!(
                        "no timezone for {}",
                        coordinate
                    ))),
                    Some(Err(e)) => Err(Failure::upstream(format!(
                        "timezone lookup failed for {}: {}",
                        coordinate, e
                    ))),
                    None => Err(Failure::upstream(format!(
                        "timezone lookup produced no outcome for {}",
                        coordinate
                    ))),
                });
                (key.clone(), outcome)
            })
            .collect()
    }

    /// One admitted, individually timed and retried lookup per coordinate.
    async fn lookup_timezones(
        &self,
        coordinates: &[GeoCoordinate],
    ) -> HashMap<GeoCoordinate, Outcome<Option<String>>> {
        let ctx = &self.ctx;
        let lookups = coordinates.iter().map(|&coordinate| async move {
            let outcome = ctx
                .retry
                .run(&ctx.geo_gate, "timezone lookup", || ctx.geo.timezone_for(coordinate))
                .await;
            (coordinate, outcome)
        });
        join_all(lookups).await.into_iter().collect()
    }

    /// Split `items` into provider-sized chunks and run them concurrently.
    async fn run_batched<K, V, F, Fut>(
        &self,
        operation: &str,
        items: &[K],
        call: F,
    ) -> HashMap<K, Outcome<V>>
    where
        K: Clone + Eq + Hash,
        F: Fn(Vec<K>) -> Fut,
        Fut: Future<Output = Result<HashMap<K, Outcome<V>>, PortError>>,
    {
        let chunks = items
            .chunks(self.ctx.geo_batch_size)
            .map(|chunk| self.run_chunk(operation, chunk.to_vec(), &call));
        join_all(chunks).await.into_iter().flatten().collect()
    }

    /// Run one chunk, resubmitting only the items that failed transiently.
    ///
    /// A non-transient failure of the whole call settles every item still
    /// pending; a transient one keeps them all pending for the next attempt.
    async fn run_chunk<K, V, F, Fut>(
        &self,
        operation: &str,
        mut pending: Vec<K>,
        call: &F,
    ) -> Vec<(K, Outcome<V>)>
    where
        K: Clone + Eq + Hash,
        F: Fn(Vec<K>) -> Fut,
        Fut: Future<Output = Result<HashMap<K, Outcome<V>>, PortError>>,
    {
        let retry = &self.ctx.retry;
        let max_attempts = retry.max_attempts.max(1);
        let mut settled = Vec::with_capacity(pending.len());
        let mut attempt = 1;

        loop {
            let mut failed: Vec<(K, PortError)> = Vec::new();
            match retry.attempt(&self.ctx.geo_gate, call(pending.clone())).await {
                Ok(mut outcomes) => {
                    for item in pending.drain(..) {
                        match outcomes.remove(&item) {
                            Some(Err(e)) if e.is_transient() => failed.push((item, e)),
                            Some(outcome) => settled.push((item, outcome)),
                            None => failed.push((
                                item,
                                PortError::Transport("missing from batch response".to_string()),
                            )),
                        }
                    }
                }
                Err(e) if e.is_transient() => {
                    failed.extend(pending.drain(..).map(|item| (item, e.clone())));
                }
                Err(e) => {
                    tracing::warn!("{} rejected: {}", operation, e);
                    settled.extend(pending.drain(..).map(|item| (item, Err(e.clone()))));
                }
            }

            if failed.is_empty() {
                break;
            }
            if attempt >= max_attempts {
                tracing::warn!(
                    "{} gave up on {} items after {} attempts",
                    operation,
                    failed.len(),
                    attempt
                );
                settled.extend(failed.into_iter().map(|(item, e)| (item, Err(e))));
                break;
            }

            let delay = retry.backoff_delay(attempt);
            tracing::debug!(
                "{} attempt {}/{}: {} items pending, retrying in {:?}",
                operation,
                attempt,
                max_attempts,
                failed.len(),
                delay
            );
            tokio::time::sleep(delay).await;
            pending = failed.into_iter().map(|(item, _)| item).collect();
            attempt += 1;
        }

        settled
    }
}
