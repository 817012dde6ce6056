//! Admission Gate
//!
//! Bounds the number of in-flight requests to one downstream dependency.

use crate::domain::errors::PortError;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Semaphore-backed concurrency ceiling for a named dependency.
///
/// Cloning shares the same permits, so every clone enforces one ceiling.
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    name: &'static str,
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl AdmissionGate {
    /// Create a gate admitting at most `capacity` concurrent holders (minimum 1).
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            name,
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait for a permit. The permit is released when dropped.
    pub async fn admit(&self) -> Result<OwnedSemaphorePermit, PortError> {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PortError::Transport(format!("{} admission gate closed", self.name)))
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Permits not currently held.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}
