//! HTTP Geo Resolver
//!
//! Implements GeoResolver against an Azure Maps style REST API:
//! address search (single and batch) and timezone-by-coordinates.

use crate::domain::errors::PortError;
use crate::domain::ports::{GeoResolver, GeocodeOutcome, TimezoneOutcome};
use crate::domain::value_objects::GeoCoordinate;
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

const API_VERSION: &str = "1.0";

/// Configuration for the HTTP geo provider.
#[derive(Debug, Clone)]
pub struct HttpGeoResolverConfig {
    /// Base URL (e.g., "https://atlas.microsoft.com")
    pub api_url: String,
    /// Subscription key sent as a query parameter
    pub api_key: String,
    /// Transport-level timeout for one HTTP request
    pub request_timeout: Duration,
    /// Ceiling on concurrent lookups within one batch timezone call
    pub max_concurrent_requests: usize,
}

impl Default for HttpGeoResolverConfig {
    fn default() -> Self {
        Self {
            api_url: "https://atlas.microsoft.com".to_string(),
            api_key: String::new(),
            request_timeout: Duration::from_secs(10),
            max_concurrent_requests: 4,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    position: Position,
}

#[derive(Debug, Deserialize)]
struct Position {
    lat: f64,
    lon: f64,
}

#[derive(Debug, Serialize)]
struct BatchRequest {
    #[serde(rename = "batchItems")]
    batch_items: Vec<BatchRequestItem>,
}

#[derive(Debug, Serialize)]
struct BatchRequestItem {
    query: String,
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    #[serde(rename = "batchItems", default)]
    batch_items: Vec<BatchResponseItem>,
}

#[derive(Debug, Deserialize)]
struct BatchResponseItem {
    #[serde(rename = "statusCode")]
    status_code: u16,
    response: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct TimezoneResponse {
    #[serde(rename = "TimeZones", default)]
    time_zones: Vec<TimezoneEntry>,
}

#[derive(Debug, Deserialize)]
struct TimezoneEntry {
    #[serde(rename = "Id")]
    id: String,
}

fn map_reqwest_error(e: reqwest::Error) -> PortError {
    if e.is_timeout() {
        PortError::Timeout
    } else if e.is_decode() {
        PortError::Malformed(e.to_string())
    } else {
        PortError::Transport(e.to_string())
    }
}

/// Geo resolver backed by an HTTP geocoding/timezone provider.
pub struct HttpGeoResolver {
    config: HttpGeoResolverConfig,
    client: reqwest::Client,
}

impl HttpGeoResolver {
    /// Create a resolver with a pooled HTTP client.
    pub fn new(config: HttpGeoResolverConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_url.trim_end_matches('/'), path)
    }

    /// Send a request and decode a successful JSON body.
    ///
    /// 404 is reported as `Ok(None)`: the provider has no answer for the query.
    async fn send_json<T: serde::de::DeserializeOwned>(
        request: reqwest::RequestBuilder,
    ) -> Result<Option<T>, PortError> {
        let response = request.send().await.map_err(map_reqwest_error)?;
        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PortError::from_status(status.as_u16(), body));
        }

        response.json::<T>().await.map(Some).map_err(map_reqwest_error)
    }

    fn first_position(response: SearchResponse) -> GeocodeOutcome {
        match response.results.into_iter().next() {
            Some(result) => GeoCoordinate::new(result.position.lat, result.position.lon)
                .map(Some)
                .map_err(|e| PortError::Malformed(e.to_string())),
            None => Ok(None),
        }
    }

    /// Encode one batch item as the provider's relative query string.
    fn batch_item_query(query: &str) -> Result<String, PortError> {
        let url = reqwest::Url::parse_with_params(
            "http://batch.invalid/",
            &[("query", query), ("limit", "1")],
        )
        .map_err(|e| PortError::Malformed(e.to_string()))?;
        Ok(format!("?{}", url.query().unwrap_or_default()))
    }

    fn parse_batch_item(item: BatchResponseItem) -> GeocodeOutcome {
        if item.status_code == 404 {
            return Ok(None);
        }
        if !(200..300).contains(&item.status_code) {
            return Err(PortError::from_status(item.status_code, item.response.to_string()));
        }
        let response: SearchResponse = serde_json::from_value(item.response)
            .map_err(|e| PortError::Malformed(e.to_string()))?;
        Self::first_position(response)
    }
}

#[async_trait]
impl GeoResolver for HttpGeoResolver {
    async fn geocode(&self, query: &str) -> GeocodeOutcome {
        let request = self.client.get(self.url("/search/address/json")).query(&[
            ("api-version", API_VERSION),
            ("subscription-key", self.config.api_key.as_str()),
            ("query", query),
            ("limit", "1"),
        ]);

        match Self::send_json::<SearchResponse>(request).await? {
            Some(response) => Self::first_position(response),
            None => Ok(None),
        }
    }

    async fn geocode_batch(
        &self,
        queries: &[String],
    ) -> Result<HashMap<String, GeocodeOutcome>, PortError> {
        if queries.is_empty() {
            return Ok(HashMap::new());
        }

        let body = BatchRequest {
            batch_items: queries
                .iter()
                .map(|q| Self::batch_item_query(q).map(|query| BatchRequestItem { query }))
                .collect::<Result<Vec<_>, _>>()?,
        };

        let request = self
            .client
            .post(self.url("/search/address/batch/sync/json"))
            .query(&[
                ("api-version", API_VERSION),
                ("subscription-key", self.config.api_key.as_str()),
            ])
            .json(&body);

        let response = Self::send_json::<BatchResponse>(request)
            .await?
            .ok_or_else(|| PortError::Malformed("batch endpoint returned 404".to_string()))?;

        if response.batch_items.len() != queries.len() {
            tracing::warn!(
                "geocode batch returned {} items for {} queries",
                response.batch_items.len(),
                queries.len()
            );
        }

        // Items come back in request order; any missing tail is left out of the map.
        Ok(queries
            .iter()
            .cloned()
            .zip(response.batch_items.into_iter().map(Self::parse_batch_item))
            .collect())
    }

    async fn timezone_for(&self, coordinate: GeoCoordinate) -> TimezoneOutcome {
        let query = coordinate.to_query_string();
        let request = self
            .client
            .get(self.url("/timezone/byCoordinates/json"))
            .query(&[
                ("api-version", API_VERSION),
                ("subscription-key", self.config.api_key.as_str()),
                ("query", query.as_str()),
            ]);

        let response = Self::send_json::<TimezoneResponse>(request).await?;
        Ok(response
            .and_then(|r| r.time_zones.into_iter().next())
            .map(|tz| tz.id)
            .filter(|id| !id.is_empty()))
    }

    async fn timezone_for_batch(
        &self,
        coordinates: &[GeoCoordinate],
    ) -> Result<HashMap<GeoCoordinate, TimezoneOutcome>, PortError> {
        // No batch endpoint: fan out, bounded, with a deadline per lookup.
        let limit = self.config.max_concurrent_requests.max(1);
        let deadline = self.config.request_timeout;

        let outcomes = futures::stream::iter(coordinates.iter().copied())
            .map(|coordinate| async move {
                let outcome = tokio::time::timeout(deadline, self.timezone_for(coordinate))
                    .await
                    .unwrap_or(Err(PortError::Timeout));
                (coordinate, outcome)
            })
            .buffer_unordered(limit)
            .collect::<HashMap<_, _>>()
            .await;

        Ok(outcomes)
    }

    fn supports_timezone_batch(&self) -> bool {
        false
    }
}
