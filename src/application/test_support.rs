//! In-memory collaborators with call counting and failure injection.

use crate::adapters::outbound::DashMapDocumentStore;
use crate::application::context::ResolverSettings;
use crate::domain::entities::CachedRecord;
use crate::domain::errors::PortError;
use crate::domain::ports::{DocumentStore, GeoResolver, GeocodeOutcome, TimezoneOutcome};
use crate::domain::value_objects::{GeoCoordinate, LocationKey};
use crate::infrastructure::{BackoffKind, RetryPolicy};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub fn fast_settings() -> ResolverSettings {
    ResolverSettings {
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            backoff: BackoffKind::Exponential,
            jitter: false,
            call_timeout: Duration::from_secs(1),
        },
        ..Default::default()
    }
}

/// A New York coordinate record last refreshed `age` ago.
pub fn record_aged(location: LocationKey, zone: &str, age: chrono::Duration) -> CachedRecord {
    CachedRecord::new(
        zone,
        location,
        GeoCoordinate::new(40.71, -74.00).unwrap(),
        Utc::now() - age,
    )
}

/// Tracks concurrent calls and the highest concurrency observed.
#[derive(Default)]
pub struct Concurrency {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Concurrency {
    fn enter(&self) -> ConcurrencyGuard<'_> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        ConcurrencyGuard(self)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

struct ConcurrencyGuard<'a>(&'a Concurrency);

impl Drop for ConcurrencyGuard<'_> {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

// ===== Mock Document Store =====

pub struct MockStore {
    pub inner: DashMapDocumentStore,
    query_failure: Option<PortError>,
    upsert_failure: Option<PortError>,
    latency: Duration,
    queries: AtomicUsize,
    batch_queries: AtomicUsize,
    upserts: AtomicUsize,
    pub concurrency: Concurrency,
}

impl MockStore {
    pub fn new() -> Self {
        Self::with_records(Vec::new())
    }

    pub fn with_records(records: Vec<CachedRecord>) -> Self {
        Self {
            inner: DashMapDocumentStore::with_records(records),
            query_failure: None,
            upsert_failure: None,
            latency: Duration::ZERO,
            queries: AtomicUsize::new(0),
            batch_queries: AtomicUsize::new(0),
            upserts: AtomicUsize::new(0),
            concurrency: Concurrency::default(),
        }
    }

    /// Every query (single, batch, coordinate) fails with `error`.
    pub fn failing_queries(mut self, error: PortError) -> Self {
        self.query_failure = Some(error);
        self
    }

    pub fn failing_upserts(mut self, error: PortError) -> Self {
        self.upsert_failure = Some(error);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn query_calls(&self) -> usize {
        self.queries.load(Ordering::SeqCst) + self.batch_queries.load(Ordering::SeqCst)
    }

    pub fn batch_query_calls(&self) -> usize {
        self.batch_queries.load(Ordering::SeqCst)
    }

    pub fn upsert_calls(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    async fn delay(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn check_query(&self) -> Result<(), PortError> {
        match &self.query_failure {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DocumentStore for MockStore {
    async fn query_by_attributes(
        &self,
        filter: &LocationKey,
    ) -> Result<Vec<CachedRecord>, PortError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let _guard = self.concurrency.enter();
        self.delay().await;
        self.check_query()?;
        self.inner.query_by_attributes(filter).await
    }

    async fn query_by_attributes_batch(
        &self,
        filters: &[LocationKey],
    ) -> Result<HashMap<LocationKey, Vec<CachedRecord>>, PortError> {
        self.batch_queries.fetch_add(1, Ordering::SeqCst);
        let _guard = self.concurrency.enter();
        self.delay().await;
        self.check_query()?;
        self.inner.query_by_attributes_batch(filters).await
    }

    async fn query_by_coordinate(
        &self,
        coordinate: GeoCoordinate,
    ) -> Result<Vec<CachedRecord>, PortError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let _guard = self.concurrency.enter();
        self.delay().await;
        self.check_query()?;
        self.inner.query_by_coordinate(coordinate).await
    }

    async fn upsert(&self, record: &CachedRecord) -> Result<(), PortError> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        let _guard = self.concurrency.enter();
        self.delay().await;
        if let Some(e) = &self.upsert_failure {
            return Err(e.clone());
        }
        self.inner.upsert(record).await
    }
}

// ===== Mock Geo Resolver =====

#[derive(Default)]
pub struct MockGeoResolver {
    coordinates: HashMap<String, GeoCoordinate>,
    zones: HashMap<GeoCoordinate, String>,
    geocode_failures: HashMap<String, PortError>,
    flaky_geocodes: Mutex<HashMap<String, (usize, PortError)>>,
    timezone_failures: HashMap<GeoCoordinate, PortError>,
    slow_timezones: HashMap<GeoCoordinate, Duration>,
    timezone_fan_out: bool,
    batch_failures: Mutex<Option<(usize, PortError)>>,
    omitted_once: Mutex<HashSet<String>>,
    latency: Duration,
    geocode_requests: Mutex<HashMap<String, usize>>,
    geocode_batches: AtomicUsize,
    timezone_requests: AtomicUsize,
    timezone_batches: AtomicUsize,
    pub concurrency: Concurrency,
}

impl MockGeoResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// `query` geocodes to (lat, lon), which resolves to `zone`.
    pub fn with_place(mut self, query: &str, lat: f64, lon: f64, zone: &str) -> Self {
        let coordinate = GeoCoordinate::new(lat, lon).unwrap();
        self.coordinates.insert(query.to_string(), coordinate);
        self.zones.insert(coordinate, zone.to_string());
        self
    }

    /// `query` geocodes, but no timezone is known for the point.
    pub fn with_coordinate(mut self, query: &str, lat: f64, lon: f64) -> Self {
        self.coordinates
            .insert(query.to_string(), GeoCoordinate::new(lat, lon).unwrap());
        self
    }

    pub fn failing_geocode(mut self, query: &str, error: PortError) -> Self {
        self.geocode_failures.insert(query.to_string(), error);
        self
    }

    /// The first `times` geocodes of `query` fail with `error`.
    pub fn flaky_geocode(self, query: &str, times: usize, error: PortError) -> Self {
        self.flaky_geocodes
            .lock()
            .unwrap()
            .insert(query.to_string(), (times, error));
        self
    }

    pub fn failing_timezone(mut self, lat: f64, lon: f64, error: PortError) -> Self {
        self.timezone_failures
            .insert(GeoCoordinate::new(lat, lon).unwrap(), error);
        self
    }

    /// Timezone lookups for (lat, lon) take `delay` longer than the rest.
    pub fn slow_timezone(mut self, lat: f64, lon: f64, delay: Duration) -> Self {
        self.slow_timezones
            .insert(GeoCoordinate::new(lat, lon).unwrap(), delay);
        self
    }

    /// Behave like a provider with no batch timezone endpoint.
    pub fn without_timezone_batch(mut self) -> Self {
        self.timezone_fan_out = true;
        self
    }

    /// The first `times` geocode batch calls fail as a whole.
    pub fn failing_batches(self, times: usize, error: PortError) -> Self {
        *self.batch_failures.lock().unwrap() = Some((times, error));
        self
    }

    /// `query` is left out of the first batch response that contains it.
    pub fn omitting_once(self, query: &str) -> Self {
        self.omitted_once.lock().unwrap().insert(query.to_string());
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn geocode_requests(&self, query: &str) -> usize {
        self.geocode_requests
            .lock()
            .unwrap()
            .get(query)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_geocode_requests(&self) -> usize {
        self.geocode_requests.lock().unwrap().values().sum()
    }

    pub fn geocode_batch_calls(&self) -> usize {
        self.geocode_batches.load(Ordering::SeqCst)
    }

    pub fn timezone_requests(&self) -> usize {
        self.timezone_requests.load(Ordering::SeqCst)
    }

    pub fn timezone_batch_calls(&self) -> usize {
        self.timezone_batches.load(Ordering::SeqCst)
    }

    async fn delay(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn geocode_one(&self, query: &str) -> GeocodeOutcome {
        *self
            .geocode_requests
            .lock()
            .unwrap()
            .entry(query.to_string())
            .or_insert(0) += 1;

        if let Some(e) = self.geocode_failures.get(query) {
            return Err(e.clone());
        }
        if let Some((remaining, e)) = self.flaky_geocodes.lock().unwrap().get_mut(query) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(e.clone());
            }
        }
        Ok(self.coordinates.get(query).copied())
    }

    fn timezone_one(&self, coordinate: GeoCoordinate) -> TimezoneOutcome {
        self.timezone_requests.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self.timezone_failures.get(&coordinate) {
            return Err(e.clone());
        }
        Ok(self.zones.get(&coordinate).cloned())
    }
}

#[async_trait]
impl GeoResolver for MockGeoResolver {
    async fn geocode(&self, query: &str) -> GeocodeOutcome {
        let _guard = self.concurrency.enter();
        self.delay().await;
        self.geocode_one(query)
    }

    async fn geocode_batch(
        &self,
        queries: &[String],
    ) -> Result<HashMap<String, GeocodeOutcome>, PortError> {
        self.geocode_batches.fetch_add(1, Ordering::SeqCst);
        let _guard = self.concurrency.enter();
        self.delay().await;

        if let Some((remaining, e)) = self.batch_failures.lock().unwrap().as_mut() {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(e.clone());
            }
        }

        let mut results = HashMap::new();
        for query in queries {
            if self.omitted_once.lock().unwrap().remove(query) {
                continue;
            }
            results.insert(query.clone(), self.geocode_one(query));
        }
        Ok(results)
    }

    async fn timezone_for(&self, coordinate: GeoCoordinate) -> TimezoneOutcome {
        let _guard = self.concurrency.enter();
        self.delay().await;
        if let Some(extra) = self.slow_timezones.get(&coordinate) {
            tokio::time::sleep(*extra).await;
        }
        self.timezone_one(coordinate)
    }

    async fn timezone_for_batch(
        &self,
        coordinates: &[GeoCoordinate],
    ) -> Result<HashMap<GeoCoordinate, TimezoneOutcome>, PortError> {
        self.timezone_batches.fetch_add(1, Ordering::SeqCst);
        let _guard = self.concurrency.enter();
        self.delay().await;
        Ok(coordinates
            .iter()
            .map(|c| (*c, self.timezone_one(*c)))
            .collect())
    }

    fn supports_timezone_batch(&self) -> bool {
        !self.timezone_fan_out
    }
}
