//! Cache Policy Service
//!
//! Pure domain logic deciding whether stored records can be trusted.
//! This service has NO external dependencies - it's pure Rust.

use crate::domain::entities::CachedRecord;
use chrono::{DateTime, Duration, Utc};

/// Classification of the records found for one lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    /// A record exists and is younger than the staleness interval
    Fresh(CachedRecord),
    /// A record exists but must be refreshed; still usable as a fallback
    Stale(CachedRecord),
    /// Nothing stored
    Miss,
}

impl CacheLookup {
    /// The record to reuse when refreshing, if any.
    pub fn existing(&self) -> Option<&CachedRecord> {
        match self {
            CacheLookup::Fresh(r) | CacheLookup::Stale(r) => Some(r),
            CacheLookup::Miss => None,
        }
    }
}

/// Staleness rules for cached records.
#[derive(Debug, Clone)]
pub struct CachePolicy {
    staleness: Duration,
}

impl CachePolicy {
    pub fn new(staleness: Duration) -> Self {
        Self { staleness }
    }

    pub fn staleness(&self) -> Duration {
        self.staleness
    }

    /// Pick one record and decide whether it is fresh at `now`.
    ///
    /// `subject` only feeds the log line emitted when the store holds more
    /// than one matching record.
    pub fn classify(
        &self,
        subject: &str,
        records: Vec<CachedRecord>,
        now: DateTime<Utc>,
    ) -> CacheLookup {
        match Self::select_canonical(subject, records) {
            Some(record) if record.is_fresh(now, self.staleness) => CacheLookup::Fresh(record),
            Some(record) => CacheLookup::Stale(record),
            None => CacheLookup::Miss,
        }
    }

    /// Deterministically choose among duplicate records: lowest id wins.
    pub fn select_canonical(subject: &str, records: Vec<CachedRecord>) -> Option<CachedRecord> {
        if records.len() > 1 {
            tracing::warn!(
                "inconsistent cache: {} records match {}, using lowest id",
                records.len(),
                subject
            );
        }
        records.into_iter().min_by(|a, b| a.id.cmp(&b.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::{GeoCoordinate, LocationKey};
    use tracing_test::traced_test;

    fn record(id: &str, age_minutes: i64, now: DateTime<Utc>) -> CachedRecord {
        CachedRecord {
            id: id.to_string(),
            iana_code: format!("Zone/{}", id),
            location: LocationKey::city("x"),
            coordinate: GeoCoordinate::new(1.0, 2.0).unwrap(),
            last_updated: now - Duration::minutes(age_minutes),
        }
    }

    // ===== classify Tests =====

    #[test]
    fn test_classify_miss() {
        let policy = CachePolicy::new(Duration::minutes(10));
        assert_eq!(policy.classify("x", vec![], Utc::now()), CacheLookup::Miss);
    }

    #[test]
    fn test_classify_fresh() {
        let now = Utc::now();
        let policy = CachePolicy::new(Duration::minutes(10));
        let lookup = policy.classify("x", vec![record("a", 5, now)], now);
        assert!(matches!(lookup, CacheLookup::Fresh(r) if r.id == "a"));
    }

    #[test]
    fn test_classify_stale() {
        let now = Utc::now();
        let policy = CachePolicy::new(Duration::minutes(10));
        let lookup = policy.classify("x", vec![record("a", 11, now)], now);
        assert!(matches!(lookup, CacheLookup::Stale(r) if r.id == "a"));
    }

    #[test]
    fn test_existing_record_accessor() {
        let now = Utc::now();
        assert!(CacheLookup::Miss.existing().is_none());
        assert_eq!(
            CacheLookup::Stale(record("s", 0, now)).existing().map(|r| r.id.as_str()),
            Some("s")
        );
    }

    // ===== select_canonical Tests =====

    #[test]
    fn test_select_canonical_empty() {
        assert!(CachePolicy::select_canonical("x", vec![]).is_none());
    }

    #[test]
    #[traced_test]
    fn test_select_canonical_lowest_id_and_logs() {
        let now = Utc::now();
        let chosen = CachePolicy::select_canonical(
            "new york",
            vec![record("c", 0, now), record("a", 0, now), record("b", 0, now)],
        )
        .unwrap();

        assert_eq!(chosen.id, "a");
        assert!(logs_contain("inconsistent cache: 3 records match new york"));
    }

    #[test]
    fn test_select_canonical_is_order_independent() {
        let now = Utc::now();
        let forward = CachePolicy::select_canonical("x", vec![record("1", 0, now), record("2", 0, now)]);
        let reverse = CachePolicy::select_canonical("x", vec![record("2", 0, now), record("1", 0, now)]);
        assert_eq!(forward, reverse);
    }

    #[test]
    fn test_duplicate_selection_ignores_freshness() {
        // lowest id is chosen first, freshness is judged on that record only
        let now = Utc::now();
        let policy = CachePolicy::new(Duration::minutes(10));
        let lookup = policy.classify("x", vec![record("b", 0, now), record("a", 30, now)], now);
        assert!(matches!(lookup, CacheLookup::Stale(r) if r.id == "a"));
    }
}
