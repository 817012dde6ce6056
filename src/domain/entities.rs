//! Domain Entities - Core business objects
//!
//! These entities represent the core concepts of the timevault domain.
//! They have no I/O dependencies and contain only business logic.

use crate::domain::value_objects::{GeoCoordinate, LocationKey};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Durable cache entry ("timevault document").
///
/// Associates a location and coordinate with a resolved IANA timezone.
/// The id is assigned once and survives refreshes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedRecord {
    /// Opaque, stable identifier
    pub id: String,
    /// IANA timezone code, e.g. "America/New_York"
    pub iana_code: String,
    /// Administrative location (empty for coordinate-only lookups)
    pub location: LocationKey,
    /// Geocoded point
    pub coordinate: GeoCoordinate,
    /// When the record was last resolved against the upstream provider
    pub last_updated: DateTime<Utc>,
}

impl CachedRecord {
    /// Create a record with a freshly minted id.
    pub fn new(
        iana_code: impl Into<String>,
        location: LocationKey,
        coordinate: GeoCoordinate,
        last_updated: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            iana_code: iana_code.into(),
            location,
            coordinate,
            last_updated,
        }
    }

    /// Overwrite the resolved content of an existing record, keeping its id.
    pub fn refreshed(
        existing: &CachedRecord,
        iana_code: impl Into<String>,
        location: LocationKey,
        coordinate: GeoCoordinate,
        last_updated: DateTime<Utc>,
    ) -> Self {
        Self {
            id: existing.id.clone(),
            iana_code: iana_code.into(),
            location,
            coordinate,
            last_updated,
        }
    }

    /// A record is fresh while `now - last_updated < interval`.
    pub fn is_fresh(&self, now: DateTime<Utc>, interval: Duration) -> bool {
        now.signed_duration_since(self.last_updated) < interval
    }
}

/// Failure kinds a caller can observe on a single resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// All location attributes empty, or the coordinate is invalid
    InvalidInput,
    /// The provider authoritatively returned no match
    NotFound,
    /// A dependency kept failing after the retry policy was exhausted
    UpstreamError,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::InvalidInput => write!(f, "invalid-input"),
            ErrorKind::NotFound => write!(f, "not-found"),
            ErrorKind::UpstreamError => write!(f, "upstream-error"),
        }
    }
}

/// Where a successful answer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionSource {
    /// Fresh record in the document store
    Cache,
    /// Resolved through the geo provider during this call
    Upstream,
    /// Stale record served because its refresh failed
    StaleCache,
}

/// Non-fatal: the answer is valid but writing it back to the store failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistenceWarning {
    pub record_id: String,
    pub message: String,
}

/// Outcome of resolving one input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResolutionResult {
    Resolved {
        iana_code: String,
        source: ResolutionSource,
        #[serde(skip_serializing_if = "Option::is_none")]
        warning: Option<PersistenceWarning>,
    },
    Failed {
        kind: ErrorKind,
        message: String,
    },
}

impl ResolutionResult {
    pub fn resolved(iana_code: impl Into<String>, source: ResolutionSource) -> Self {
        Self::Resolved {
            iana_code: iana_code.into(),
            source,
            warning: None,
        }
    }

    pub fn failed(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Failed {
            kind,
            message: message.into(),
        }
    }

    /// Attach a persistence warning to a successful result. No-op on failures.
    pub fn with_warning(self, warning: Option<PersistenceWarning>) -> Self {
        match self {
            Self::Resolved {
                iana_code, source, ..
            } => Self::Resolved {
                iana_code,
                source,
                warning,
            },
            failed => failed,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Resolved { .. })
    }

    pub fn iana_code(&self) -> Option<&str> {
        match self {
            Self::Resolved { iana_code, .. } => Some(iana_code),
            Self::Failed { .. } => None,
        }
    }

    pub fn source(&self) -> Option<ResolutionSource> {
        match self {
            Self::Resolved { source, .. } => Some(*source),
            Self::Failed { .. } => None,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Resolved { .. } => None,
            Self::Failed { kind, .. } => Some(*kind),
        }
    }

    pub fn warning(&self) -> Option<&PersistenceWarning> {
        match self {
            Self::Resolved { warning, .. } => warning.as_ref(),
            Self::Failed { .. } => None,
        }
    }
}
