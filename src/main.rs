//! timevault - timezone resolution with a cache-aside document store
//!
//! This is the composition root that wires together all the components.
//! Reads a JSON array of locations from stdin and prints one result per
//! location to stdout, in input order.

use anyhow::Context;
use serde::Serialize;
use std::sync::Arc;
use timevault::adapters::outbound::{DashMapDocumentStore, HttpGeoResolver, SqliteDocumentStore};
use timevault::{
    load_config, DocumentStore, GeoResolver, LocationKey, ResolutionResult, ResolutionService,
    StoreBackend,
};
use tokio::io::AsyncReadExt;
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Serialize)]
struct Resolution<'a> {
    location: &'a LocationKey,
    #[serde(flatten)]
    result: &'a ResolutionResult,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from environment
    let cfg = load_config()?;

    // Setup logging
    let log_level = if cfg.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(
        "starting timevault store={:?} staleness={}m geo={}",
        cfg.store_backend,
        cfg.staleness_minutes,
        cfg.geo_api_url
    );

    // ===== COMPOSITION ROOT =====

    // 1. Create outbound adapters
    let store: Arc<dyn DocumentStore> = match cfg.store_backend {
        StoreBackend::Memory => Arc::new(DashMapDocumentStore::new()),
        StoreBackend::Sqlite => {
            let store = SqliteDocumentStore::open(&cfg.sqlite_path)
                .with_context(|| format!("failed to open {}", cfg.sqlite_path))?;
            tracing::info!("document store opened at {}", cfg.sqlite_path);
            Arc::new(store)
        }
    };

    let geo: Arc<dyn GeoResolver> = Arc::new(HttpGeoResolver::new(cfg.geo_resolver_config()?)?);

    // 2. Create application service
    let service = ResolutionService::new(store, geo, cfg.resolver_settings());
    let batch = service.batch_resolver();

    // 3. Read input, resolve, print
    let mut input = String::new();
    tokio::io::stdin()
        .read_to_string(&mut input)
        .await
        .context("failed to read stdin")?;

    let keys: Vec<LocationKey> =
        serde_json::from_str(&input).context("expected a JSON array of location objects")?;

    let results = batch.resolve_batch(&keys).await;

    let output: Vec<Resolution<'_>> = keys
        .iter()
        .zip(results.iter())
        .map(|(location, result)| Resolution { location, result })
        .collect();

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
