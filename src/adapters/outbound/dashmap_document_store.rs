//! DashMap Document Store
//!
//! Implements DocumentStore using DashMap for lock-free concurrent access.

use crate::domain::entities::CachedRecord;
use crate::domain::errors::PortError;
use crate::domain::ports::DocumentStore;
use crate::domain::value_objects::{GeoCoordinate, LocationKey};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;

/// DashMap-backed document store.
///
/// Records are keyed by id, so an upsert of an existing id replaces it.
/// Queries scan the map; intended for tests and single-node deployments.
pub struct DashMapDocumentStore {
    records: Arc<DashMap<String, CachedRecord>>,
}

impl DashMapDocumentStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            records: Arc::new(DashMap::new()),
        }
    }

    /// Create a store pre-populated with records.
    pub fn with_records(records: impl IntoIterator<Item = CachedRecord>) -> Self {
        let store = Self::new();
        for record in records {
            store.records.insert(record.id.clone(), record);
        }
        store
    }

    /// Number of stored records.
    pub fn count(&self) -> usize {
        self.records.len()
    }

    /// Fetch a record by id.
    pub fn get(&self, id: &str) -> Option<CachedRecord> {
        self.records.get(id).map(|e| e.value().clone())
    }

    /// Snapshot of every stored record.
    pub fn all(&self) -> Vec<CachedRecord> {
        self.records.iter().map(|e| e.value().clone()).collect()
    }

    fn matching(&self, filter: &LocationKey) -> Vec<CachedRecord> {
        self.records
            .iter()
            .filter(|e| filter.matches(&e.value().location))
            .map(|e| e.value().clone())
            .collect()
    }
}

impl Default for DashMapDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for DashMapDocumentStore {
    async fn query_by_attributes(
        &self,
        filter: &LocationKey,
    ) -> Result<Vec<CachedRecord>, PortError> {
        Ok(self.matching(filter))
    }

    async fn query_by_attributes_batch(
        &self,
        filters: &[LocationKey],
    ) -> Result<HashMap<LocationKey, Vec<CachedRecord>>, PortError> {
        Ok(filters
            .iter()
            .map(|f| (f.clone(), self.matching(f)))
            .collect())
    }

    async fn query_by_coordinate(
        &self,
        coordinate: GeoCoordinate,
    ) -> Result<Vec<CachedRecord>, PortError> {
        Ok(self
            .records
            .iter()
            .filter(|e| e.value().coordinate == coordinate)
            .map(|e| e.value().clone())
            .collect())
    }

    async fn upsert(&self, record: &CachedRecord) -> Result<(), PortError> {
        self.records.insert(record.id.clone(), record.clone());
        Ok(())
    }
}
