mod dashmap_document_store;
mod http_geo_resolver;
mod sqlite_document_store;

pub use dashmap_document_store::DashMapDocumentStore;
pub use http_geo_resolver::{HttpGeoResolver, HttpGeoResolverConfig};
pub use sqlite_document_store::SqliteDocumentStore;
