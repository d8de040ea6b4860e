//! Record store backed by the `<prefix>records` table.
//!
//! Expected layout:
//!
//! ```sql
//! CREATE TABLE coredns_records (
//!     id          INTEGER PRIMARY KEY,
//!     zone        TEXT NOT NULL,   -- e.g. "example.com."
//!     name        TEXT NOT NULL,   -- relative owner, "@" or "" for the apex
//!     ttl         INTEGER,         -- NULL or 0 reads back as the configured ttl
//!     content     TEXT NOT NULL,   -- JSON, shape depends on record_type
//!     record_type TEXT NOT NULL    -- "A", "AAAA", "MX", ...
//! );
//! ```

use super::normalize_name;
use super::record::{APEX, Record, RecordContent, resolve_ttl};
use super::store::RecordStore;
use crate::dns::enums::DNSResourceType;
use crate::error::StoreError;
use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use tracing::{debug, warn};

pub struct SqlRecordStore {
    pool: SqlitePool,
    table: String,
    default_ttl: u32,
    lookup_sql: String,
    zones_sql: String,
}

impl SqlRecordStore {
    /// Build a store reading `table` through `pool`. Rows without a TTL are
    /// returned with `default_ttl`.
    pub fn new(pool: SqlitePool, table: &str, default_ttl: u32) -> Self {
        let quoted = quote_identifier(table);
        let lookup_sql = format!(
            "SELECT id, zone, name, ttl, content, record_type FROM {} \
             WHERE lower(rtrim(zone, '.')) = ? AND lower(name) IN (?, ?) AND upper(record_type) = ? \
             ORDER BY id",
            quoted
        );
        let zones_sql = format!("SELECT DISTINCT zone FROM {} ORDER BY zone", quoted);

        Self {
            pool,
            table: table.to_string(),
            default_ttl,
            lookup_sql,
            zones_sql,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn decode_row(&self, row: &SqliteRow) -> Result<Record, StoreError> {
        let id: i64 = row.try_get("id")?;
        let zone: String = row.try_get("zone")?;
        let name: String = row.try_get("name")?;
        let ttl: Option<i64> = row.try_get("ttl")?;
        let content: String = row.try_get("content")?;
        let record_type: String = row.try_get("record_type")?;

        let malformed = |msg: String| StoreError::MalformedRow(format!("row {}: {}", id, msg));

        let rtype = record_type.parse::<DNSResourceType>().map_err(malformed)?;
        let ttl = ttl
            .map(u32::try_from)
            .transpose()
            .map_err(|_| malformed(format!("TTL out of range: {:?}", ttl)))?;
        let content = RecordContent::from_json(rtype, &content).map_err(malformed)?;

        Ok(Record {
            zone,
            name,
            rtype,
            ttl: Some(resolve_ttl(ttl, self.default_ttl)),
            content,
        })
    }
}

#[async_trait]
impl RecordStore for SqlRecordStore {
    async fn lookup(
        &self,
        zone: &str,
        name: &str,
        rtype: DNSResourceType,
    ) -> Result<Vec<Record>, StoreError> {
        let owner = name.to_ascii_lowercase();
        let (first, second) = if owner.is_empty() || owner == APEX {
            (APEX.to_string(), String::new())
        } else {
            (owner.clone(), owner.clone())
        };

        let rows = sqlx::query(&self.lookup_sql)
            .bind(normalize_name(zone))
            .bind(first)
            .bind(second)
            .bind(rtype.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                warn!("Record lookup in {} failed: {}", self.table, e);
                StoreError::from(e)
            })?;

        debug!(
            "Lookup {} {} in zone {} returned {} rows",
            rtype,
            owner,
            zone,
            rows.len()
        );

        rows.iter().map(|row| self.decode_row(row)).collect()
    }

    async fn zones(&self) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query(&self.zones_sql)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("zone").map_err(StoreError::from))
            .collect()
    }
}

/// Quote an identifier for interpolation into SQL text
fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
