//! Resolver Context
//!
//! Collaborators, policies and admission gates shared by the single-item
//! pipeline and the batch resolver, plus the steps both of them end with.

use crate::domain::entities::{
    CachedRecord, ErrorKind, PersistenceWarning, ResolutionResult, ResolutionSource,
};
use crate::domain::ports::{DocumentStore, GeoResolver};
use crate::domain::services::{CacheLookup, CachePolicy};
use crate::domain::value_objects::{GeoCoordinate, LocationKey};
use crate::infrastructure::{AdmissionGate, RetryPolicy};
use chrono::Utc;
use std::sync::Arc;

/// Explicit configuration for the resolution pipeline.
#[derive(Debug, Clone)]
pub struct ResolverSettings {
    /// Age after which a cached record is refreshed
    pub staleness: chrono::Duration,
    /// Ceiling on in-flight document store calls
    pub max_concurrent_store_requests: usize,
    /// Ceiling on in-flight geocode/timezone calls
    pub max_concurrent_geo_requests: usize,
    /// Retry/backoff/timeout for every downstream call
    pub retry: RetryPolicy,
    /// Items per geocode/timezone batch call
    pub geo_batch_size: usize,
    /// Filters per document store batch query
    pub store_batch_size: usize,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            staleness: chrono::Duration::days(30),
            max_concurrent_store_requests: 8,
            max_concurrent_geo_requests: 4,
            retry: RetryPolicy::default(),
            geo_batch_size: 100,
            store_batch_size: 50,
        }
    }
}

/// A failed resolution before it is turned into a caller-visible result.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Failure {
    pub kind: ErrorKind,
    pub message: String,
}

impl Failure {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::NotFound,
            message: message.into(),
        }
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::UpstreamError,
            message: message.into(),
        }
    }

    pub fn into_result(self) -> ResolutionResult {
        ResolutionResult::failed(self.kind, self.message)
    }
}

/// Shared state for one configured resolver. Holds no domain data.
pub(crate) struct ResolverContext {
    pub store: Arc<dyn DocumentStore>,
    pub geo: Arc<dyn GeoResolver>,
    pub cache: CachePolicy,
    pub retry: RetryPolicy,
    pub store_gate: AdmissionGate,
    pub geo_gate: AdmissionGate,
    pub geo_batch_size: usize,
    pub store_batch_size: usize,
}

impl ResolverContext {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        geo: Arc<dyn GeoResolver>,
        settings: ResolverSettings,
    ) -> Self {
        Self {
            store,
            geo,
            cache: CachePolicy::new(settings.staleness),
            retry: settings.retry,
            store_gate: AdmissionGate::new("store", settings.max_concurrent_store_requests),
            geo_gate: AdmissionGate::new("geo", settings.max_concurrent_geo_requests),
            geo_batch_size: settings.geo_batch_size.max(1),
            store_batch_size: settings.store_batch_size.max(1),
        }
    }

    /// Best-effort upsert. A failure is logged and returned as a warning.
    pub async fn persist(&self, record: &CachedRecord) -> Option<PersistenceWarning> {
        let result = self
            .retry
            .run(&self.store_gate, "store upsert", || self.store.upsert(record))
            .await;

        match result {
            Ok(()) => {
                tracing::debug!("persisted record {} ({})", record.id, record.iana_code);
                None
            }
            Err(e) => {
                tracing::warn!(
                    "persistence warning: record {} not written: {}",
                    record.id,
                    e
                );
                Some(PersistenceWarning {
                    record_id: record.id.clone(),
                    message: e.to_string(),
                })
            }
        }
    }

    /// Turn the upstream outcome for one lookup into the caller's result.
    ///
    /// On success the record is created (or refreshed under its existing id)
    /// and persisted. On failure a stale record, if present, is served instead.
    pub async fn complete(
        &self,
        location: LocationKey,
        lookup: CacheLookup,
        outcome: Result<(GeoCoordinate, String), Failure>,
    ) -> ResolutionResult {
        match outcome {
            Ok((coordinate, iana_code)) => {
                let now = Utc::now();
                let record = match lookup.existing() {
                    Some(existing) => {
                        CachedRecord::refreshed(existing, iana_code, location, coordinate, now)
                    }
                    None => CachedRecord::new(iana_code, location, coordinate, now),
                };
                let warning = self.persist(&record).await;
                ResolutionResult::resolved(record.iana_code, ResolutionSource::Upstream)
                    .with_warning(warning)
            }
            Err(failure) => match lookup.existing() {
                Some(stale) => {
                    tracing::warn!(
                        "refresh of record {} failed ({}), serving stale value",
                        stale.id,
                        failure.message
                    );
                    ResolutionResult::resolved(stale.iana_code.clone(), ResolutionSource::StaleCache)
                }
                None => failure.into_result(),
            },
        }
    }
}
