//! Resolution Service - single-item use case
//!
//! Cache-aside resolution of one location (or coordinate) to an IANA
//! timezone: store lookup, geocode and timezone lookup on a miss or stale
//! hit, best-effort write-back.

use crate::application::batch_resolver::BatchResolver;
use crate::application::context::{Failure, ResolverContext, ResolverSettings};
use crate::domain::entities::{ErrorKind, ResolutionResult, ResolutionSource};
use crate::domain::ports::{DocumentStore, GeoResolver};
use crate::domain::services::CacheLookup;
use crate::domain::value_objects::{GeoCoordinate, LocationKey};
use chrono::Utc;
use std::sync::Arc;

/// Resolution pipeline for single inputs.
///
/// Cheap to clone handles can be made with [`ResolutionService::batch_resolver`],
/// which shares the same collaborators and admission gates.
pub struct ResolutionService {
    ctx: Arc<ResolverContext>,
}

impl ResolutionService {
    /// Create a new resolution service.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        geo: Arc<dyn GeoResolver>,
        settings: ResolverSettings,
    ) -> Self {
        Self {
            ctx: Arc::new(ResolverContext::new(store, geo, settings)),
        }
    }

    /// A batch resolver sharing this service's collaborators and gates.
    pub fn batch_resolver(&self) -> BatchResolver {
        BatchResolver::from_context(self.ctx.clone())
    }

    /// Resolve a location to its IANA timezone code.
    ///
    /// 1. Queries the store on the key's non-empty attributes
    /// 2. Returns a fresh record without any external call
    /// 3. Otherwise geocodes, looks up the timezone and persists the result
    pub async fn resolve_location(&self, key: &LocationKey) -> ResolutionResult {
        let key = &key.normalized();
        if key.is_empty() {
            return ResolutionResult::failed(
                ErrorKind::InvalidInput,
                "at least one location attribute is required",
            );
        }

        let ctx = &self.ctx;
        let subject = key.to_string();
        let records = match ctx
            .retry
            .run(&ctx.store_gate, "store query", || {
                ctx.store.query_by_attributes(key)
            })
            .await
        {
            Ok(records) => records,
            Err(e) => {
                return Failure::upstream(format!("document store query failed: {}", e))
                    .into_result()
            }
        };

        let lookup = ctx.cache.classify(&subject, records, Utc::now());
        if let CacheLookup::Fresh(record) = &lookup {
            tracing::debug!("cache hit for {} -> {}", subject, record.iana_code);
            return ResolutionResult::resolved(record.iana_code.clone(), ResolutionSource::Cache);
        }

        tracing::debug!(
            "cache {} for {}",
            if lookup.existing().is_some() { "stale" } else { "miss" },
            subject
        );

        let outcome = match self.geocode(key).await {
            Ok(coordinate) => self
                .lookup_timezone(coordinate)
                .await
                .map(|iana| (coordinate, iana)),
            Err(failure) => Err(failure),
        };

        ctx.complete(key.clone(), lookup, outcome).await
    }

    /// Resolve a coordinate to its IANA timezone code.
    ///
    /// Same cache-aside flow as [`resolve_location`](Self::resolve_location),
    /// keyed by exact coordinate and without the geocode step.
    pub async fn resolve_coordinate(&self, coordinate: GeoCoordinate) -> ResolutionResult {
        let ctx = &self.ctx;
        let subject = coordinate.to_string();
        let records = match ctx
            .retry
            .run(&ctx.store_gate, "store query", || {
                ctx.store.query_by_coordinate(coordinate)
            })
            .await
        {
            Ok(records) => records,
            Err(e) => {
                return Failure::upstream(format!("document store query failed: {}", e))
                    .into_result()
            }
        };

        let lookup = ctx.cache.classify(&subject, records, Utc::now());
        if let CacheLookup::Fresh(record) = &lookup {
            tracing::debug!("cache hit for {} -> {}", subject, record.iana_code);
            return ResolutionResult::resolved(record.iana_code.clone(), ResolutionSource::Cache);
        }

        // A refreshed record keeps whatever location it was stored with.
        let location = lookup
            .existing()
            .map(|r| r.location.clone())
            .unwrap_or_default();
        let outcome = self
            .lookup_timezone(coordinate)
            .await
            .map(|iana| (coordinate, iana));

        ctx.complete(location, lookup, outcome).await
    }

    /// Validate raw latitude/longitude and resolve them.
    pub async fn resolve_lat_lon(&self, latitude: f64, longitude: f64) -> ResolutionResult {
        match GeoCoordinate::new(latitude, longitude) {
            Ok(coordinate) => self.resolve_coordinate(coordinate).await,
            Err(e) => ResolutionResult::failed(ErrorKind::InvalidInput, e.to_string()),
        }
    }

    async fn geocode(&self, key: &LocationKey) -> Result<GeoCoordinate, Failure> {
        let ctx = &self.ctx;
        let query = key.to_query_string();
        match ctx
            .retry
            .run(&ctx.geo_gate, "geocode", || ctx.geo.geocode(&query))
            .await
        {
            Ok(Some(coordinate)) => Ok(coordinate),
            Ok(None) => Err(Failure::not_found(format!("no geocode result for '{}'", query))),
            Err(e) => Err(Failure::upstream(format!("geocode failed for '{}': {}", query, e))),
        }
    }

    async fn lookup_timezone(&self, coordinate: GeoCoordinate) -> Result<String, Failure> {
        let ctx = &self.ctx;
        match ctx
            .retry
            .run(&ctx.geo_gate, "timezone lookup", || {
                ctx.geo.timezone_for(coordinate)
            })
            .await
        {
            Ok(Some(iana)) => Ok(iana),
            Ok(None) => Err(Failure::not_found(format!("no timezone for {}", coordinate))),
            Err(e) => Err(Failure::upstream(format!(
                "timezone lookup failed for {}: {}",
                coordinate, e
            ))),
        }
    }
}
