//! timevault Library
//!
//! Cache-aside resolution of locations and coordinates to IANA timezone
//! codes. A document store holds previously resolved answers; a geo
//! provider is consulted only on a miss or when a record has gone stale.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-export commonly used types
pub use application::{BatchResolver, ResolutionService, ResolverSettings};
pub use config::{load_config, Config, ConfigError, StoreBackend};
pub use domain::entities::{
    CachedRecord, ErrorKind, PersistenceWarning, ResolutionResult, ResolutionSource,
};
pub use domain::errors::PortError;
pub use domain::ports::{DocumentStore, GeoResolver};
pub use domain::value_objects::{GeoCoordinate, InvalidCoordinate, LocationKey};
pub use infrastructure::{BackoffKind, RetryPolicy};
