//! Document Store Port
//!
//! Defines the interface for reading and writing cached timezone records.
//! Implementations may use SQLite, an in-memory map, or a remote document database.

use crate::domain::entities::CachedRecord;
use crate::domain::errors::PortError;
use crate::domain::value_objects::{GeoCoordinate, LocationKey};
use async_trait::async_trait;
use std::collections::HashMap;

/// Persistent store of [`CachedRecord`]s.
///
/// This is an outbound port. The document store is the single source of
/// truth for cached resolutions; the application layer keeps no record
/// state between calls and re-queries the store every time.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// All records whose location matches the filter's non-empty fields.
    ///
    /// Callers never pass an all-empty filter.
    async fn query_by_attributes(&self, filter: &LocationKey)
        -> Result<Vec<CachedRecord>, PortError>;

    /// Batched form of [`query_by_attributes`](Self::query_by_attributes).
    ///
    /// Every filter appears as a key in the result, with an empty list when
    /// nothing matched.
    async fn query_by_attributes_batch(
        &self,
        filters: &[LocationKey],
    ) -> Result<HashMap<LocationKey, Vec<CachedRecord>>, PortError>;

    /// All records stored for exactly this coordinate.
    async fn query_by_coordinate(
        &self,
        coordinate: GeoCoordinate,
    ) -> Result<Vec<CachedRecord>, PortError>;

    /// Insert or replace a record by id. An id conflict is not an error.
    async fn upsert(&self, record: &CachedRecord) -> Result<(), PortError>;
}
