mod document_store;
mod geo_resolver;

pub use document_store::DocumentStore;
pub use geo_resolver::{GeoResolver, GeocodeOutcome, TimezoneOutcome};
