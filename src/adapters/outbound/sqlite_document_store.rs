//! SQLite Document Store
//!
//! Implements DocumentStore using SQLite for durable storage.
//! Every call runs on the blocking pool so the async runtime is never stalled.

use crate::domain::entities::CachedRecord;
use crate::domain::errors::PortError;
use crate::domain::ports::DocumentStore;
use crate::domain::value_objects::{GeoCoordinate, LocationKey};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, Row};
use std::collections::HashMap;
use std::sync::Arc;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS timevault_documents (
    id           TEXT PRIMARY KEY,
    iana_code    TEXT NOT NULL,
    city         TEXT NOT NULL DEFAULT '',
    state        TEXT NOT NULL DEFAULT '',
    postal_code  TEXT NOT NULL DEFAULT '',
    country      TEXT NOT NULL DEFAULT '',
    latitude     REAL NOT NULL,
    longitude    REAL NOT NULL,
    last_updated TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_timevault_location
    ON timevault_documents (city, state, postal_code, country);
CREATE INDEX IF NOT EXISTS idx_timevault_coordinate
    ON timevault_documents (latitude, longitude);
";

const SELECT_COLUMNS: &str = "SELECT id, iana_code, city, state, postal_code, country, \
                              latitude, longitude, last_updated FROM timevault_documents";

/// Row as stored, before domain validation.
struct RawRecord {
    id: String,
    iana_code: String,
    city: String,
    state: String,
    postal_code: String,
    country: String,
    latitude: f64,
    longitude: f64,
    last_updated: String,
}

impl RawRecord {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            iana_code: row.get(1)?,
            city: row.get(2)?,
            state: row.get(3)?,
            postal_code: row.get(4)?,
            country: row.get(5)?,
            latitude: row.get(6)?,
            longitude: row.get(7)?,
            last_updated: row.get(8)?,
        })
    }
}

impl TryFrom<RawRecord> for CachedRecord {
    type Error = PortError;

    fn try_from(raw: RawRecord) -> Result<Self, Self::Error> {
        let coordinate = GeoCoordinate::new(raw.latitude, raw.longitude)
            .map_err(|e| PortError::Malformed(format!("record {}: {}", raw.id, e)))?;
        let last_updated = DateTime::parse_from_rfc3339(&raw.last_updated)
            .map_err(|e| PortError::Malformed(format!("record {}: {}", raw.id, e)))?
            .with_timezone(&Utc);

        Ok(CachedRecord {
            id: raw.id,
            iana_code: raw.iana_code,
            location: LocationKey {
                city: raw.city,
                state: raw.state,
                postal_code: raw.postal_code,
                country: raw.country,
            },
            coordinate,
            last_updated,
        })
    }
}

/// Decode fetched rows, skipping any that fail validation.
///
/// A corrupt row costs its location a cache miss rather than failing the query.
fn decode_rows(raws: Vec<RawRecord>) -> Vec<CachedRecord> {
    raws.into_iter()
        .filter_map(|raw| match CachedRecord::try_from(raw) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!("skipping undecodable record: {}", e);
                None
            }
        })
        .collect()
}

fn map_sqlite_error(e: rusqlite::Error) -> PortError {
    match &e {
        rusqlite::Error::SqliteFailure(err, _)
            if matches!(err.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
        {
            PortError::Busy(e.to_string())
        }
        _ => PortError::Storage(e.to_string()),
    }
}

/// SQLite-backed document store.
pub struct SqliteDocumentStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDocumentStore {
    /// Open (or create) a database file and ensure the schema exists.
    pub fn open(path: &str) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> anyhow::Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a closure against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, PortError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, PortError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock();
            f(&*guard)
        })
        .await
        .map_err(|e| PortError::Storage(format!("blocking task failed: {}", e)))?
    }

    fn select_by_attributes(
        conn: &Connection,
        filter: &LocationKey,
    ) -> Result<Vec<CachedRecord>, PortError> {
        let columns = [
            ("city", &filter.city),
            ("state", &filter.state),
            ("postal_code", &filter.postal_code),
            ("country", &filter.country),
        ];
        let constrained: Vec<(&str, &String)> = columns
            .into_iter()
            .filter(|(_, value)| !value.is_empty())
            .collect();

        let mut sql = String::from(SELECT_COLUMNS);
        if !constrained.is_empty() {
            let clauses: Vec<String> = constrained
                .iter()
                .enumerate()
                .map(|(i, (column, _))| format!("{} = ?{}", column, i + 1))
                .collect();
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        let mut stmt = conn.prepare_cached(&sql).map_err(map_sqlite_error)?;
        let raws = stmt
            .query_map(
                params_from_iter(constrained.iter().map(|(_, value)| value.as_str())),
                RawRecord::from_row,
            )
            .map_err(map_sqlite_error)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(map_sqlite_error)?;

        Ok(decode_rows(raws))
    }

    /// Number of stored records.
    pub async fn count(&self) -> Result<usize, PortError> {
        self.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM timevault_documents", [], |row| {
                row.get::<_, i64>(0)
            })
            .map(|n| n as usize)
            .map_err(map_sqlite_error)
        })
        .await
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn query_by_attributes(
        &self,
        filter: &LocationKey,
    ) -> Result<Vec<CachedRecord>, PortError> {
        let filter = filter.clone();
        self.with_conn(move |conn| Self::select_by_attributes(conn, &filter))
            .await
    }

    async fn query_by_attributes_batch(
        &self,
        filters: &[LocationKey],
    ) -> Result<HashMap<LocationKey, Vec<CachedRecord>>, PortError> {
        let filters = filters.to_vec();
        self.with_conn(move |conn| {
            let mut out = HashMap::with_capacity(filters.len());
            for filter in filters {
                let records = Self::select_by_attributes(conn, &filter)?;
                out.insert(filter, records);
            }
            Ok(out)
        })
        .await
    }

    async fn query_by_coordinate(
        &self,
        coordinate: GeoCoordinate,
    ) -> Result<Vec<CachedRecord>, PortError> {
        self.with_conn(move |conn| {
            let sql = format!("{} WHERE latitude = ?1 AND longitude = ?2", SELECT_COLUMNS);
            let mut stmt = conn.prepare_cached(&sql).map_err(map_sqlite_error)?;
            let raws = stmt
                .query_map(
                    params![coordinate.latitude(), coordinate.longitude()],
                    RawRecord::from_row,
                )
                .map_err(map_sqlite_error)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(map_sqlite_error)?;
            Ok(decode_rows(raws))
        })
        .await
    }

    async fn upsert(&self, record: &CachedRecord) -> Result<(), PortError> {
        let record = record.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO timevault_documents \
                 (id, iana_code, city, state, postal_code, country, latitude, longitude, last_updated) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) \
                 ON CONFLICT(id) DO UPDATE SET \
                 iana_code = excluded.iana_code, city = excluded.city, state = excluded.state, \
                 postal_code = excluded.postal_code, country = excluded.country, \
                 latitude = excluded.latitude, longitude = excluded.longitude, \
                 last_updated = excluded.last_updated",
                params![
                    record.id,
                    record.iana_code,
                    record.location.city,
                    record.location.state,
                    record.location.postal_code,
                    record.location.country,
                    record.coordinate.latitude(),
                    record.coordinate.longitude(),
                    record.last_updated.to_rfc3339(),
                ],
            )
            .map(|_| ())
            .map_err(map_sqlite_error)
        })
        .await
    }
}
