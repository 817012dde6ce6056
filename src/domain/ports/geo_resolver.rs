//! Geo Resolver Port
//!
//! Defines the interface for geocoding locations and resolving coordinates
//! to IANA timezones.

use crate::domain::errors::PortError;
use crate::domain::value_objects::GeoCoordinate;
use async_trait::async_trait;
use std::collections::HashMap;

/// Per-item outcome of a batch geocode. `Ok(None)` is an authoritative miss.
pub type GeocodeOutcome = Result<Option<GeoCoordinate>, PortError>;

/// Per-item outcome of a batch timezone lookup. `Ok(None)` is an authoritative miss.
pub type TimezoneOutcome = Result<Option<String>, PortError>;

/// Resolver for locations and coordinates.
///
/// This is an outbound port that abstracts the geocoding/timezone provider.
/// Calls are expensive and rate limited; the application layer only reaches
/// for them on a cache miss.
#[async_trait]
pub trait GeoResolver: Send + Sync {
    /// Geocode a free-form location query into a coordinate.
    async fn geocode(&self, query: &str) -> GeocodeOutcome;

    /// Geocode several queries in one round trip.
    ///
    /// An `Err` at the outer level means the whole call failed. Queries
    /// missing from the returned map are treated as transient failures.
    async fn geocode_batch(
        &self,
        queries: &[String],
    ) -> Result<HashMap<String, GeocodeOutcome>, PortError>;

    /// Resolve a coordinate into an IANA timezone code.
    async fn timezone_for(&self, coordinate: GeoCoordinate) -> TimezoneOutcome;

    /// Resolve several coordinates in one round trip.
    async fn timezone_for_batch(
        &self,
        coordinates: &[GeoCoordinate],
    ) -> Result<HashMap<GeoCoordinate, TimezoneOutcome>, PortError>;

    /// Whether `timezone_for_batch` is a single provider call.
    ///
    /// Providers without a batch timezone endpoint return `false`; callers
    /// then admit and time out each coordinate lookup on its own.
    fn supports_timezone_batch(&self) -> bool {
        true
    }
}
