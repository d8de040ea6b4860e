//! Shared helpers for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{ConnectOptions, Connection};
use sqlzone::dns::DNSPacket;
use sqlzone::dns::enums::{DNSResourceType, ResponseCode};
use sqlzone::error::Result;
use sqlzone::zone::{Record, RecordStore};
use sqlzone::{Handler, StoreError};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

pub fn create_test_query(domain: &str, qtype: DNSResourceType) -> DNSPacket {
    DNSPacket::query(1234, domain, qtype)
}

/// Terminal handler that counts the queries reaching it and answers NXDOMAIN
#[derive(Clone, Default)]
pub struct RecordingHandler {
    calls: Arc<AtomicUsize>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Handler for RecordingHandler {
    fn name(&self) -> &'static str {
        "recorder"
    }

    async fn serve_dns(&self, query: &DNSPacket) -> Result<Option<DNSPacket>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(query.response(ResponseCode::NameError)))
    }
}

/// Store whose every call fails
pub struct FailingStore {
    pub zones: Vec<String>,
}

#[async_trait]
impl RecordStore for FailingStore {
    async fn lookup(
        &self,
        _zone: &str,
        _name: &str,
        _rtype: DNSResourceType,
    ) -> std::result::Result<Vec<Record>, StoreError> {
        Err(StoreError::Database("database is locked".to_string()))
    }

    async fn zones(&self) -> std::result::Result<Vec<String>, StoreError> {
        Ok(self.zones.clone())
    }
}

/// Row to insert into a test records table
pub struct Row<'a> {
    pub zone: &'a str,
    pub name: &'a str,
    pub ttl: Option<i64>,
    pub content: &'a str,
    pub record_type: &'a str,
}

/// SQLite file in a temporary directory, removed on drop
pub struct TestDatabase {
    dir: TempDir,
    path: PathBuf,
}

impl TestDatabase {
    /// Create `<dir>/zones.db` holding `table` filled with `rows`
    pub async fn create(table: &str, rows: &[Row<'_>]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zones.db");

        let mut conn = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .connect()
            .await
            .unwrap();
        create_table(&mut conn, table).await;
        for row in rows {
            insert_row(&mut conn, table, row).await;
        }
        conn.close().await.unwrap();

        Self { dir, path }
    }

    pub fn dir(&self) -> &std::path::Path {
        self.dir.path()
    }

    pub fn dsn(&self) -> String {
        self.path.display().to_string()
    }

    /// Run a statement against the database from outside the plugin
    pub async fn execute(&self, sql: &str) {
        let mut conn = SqliteConnectOptions::new()
            .filename(&self.path)
            .connect()
            .await
            .unwrap();
        sqlx::query(sql).execute(&mut conn).await.unwrap();
        conn.close().await.unwrap();
    }

    pub async fn insert(&self, table: &str, row: Row<'_>) {
        let mut conn = SqliteConnectOptions::new()
            .filename(&self.path)
            .connect()
            .await
            .unwrap();
        insert_row(&mut conn, table, &row).await;
        conn.close().await.unwrap();
    }
}

async fn create_table(conn: &mut SqliteConnection, table: &str) {
    sqlx::query(&format!(
        "CREATE TABLE {} (id INTEGER PRIMARY KEY, zone TEXT NOT NULL, name TEXT NOT NULL, \
         ttl INTEGER, content TEXT NOT NULL, record_type TEXT NOT NULL)",
        table
    ))
    .execute(&mut *conn)
    .await
    .unwrap();
}

async fn insert_row(conn: &mut SqliteConnection, table: &str, row: &Row<'_>) {
    sqlx::query(&format!(
        "INSERT INTO {} (zone, name, ttl, content, record_type) VALUES (?, ?, ?, ?, ?)",
        table
    ))
    .bind(row.zone)
    .bind(row.name)
    .bind(row.ttl)
    .bind(row.content)
    .bind(row.record_type)
    .execute(&mut *conn)
    .await
    .unwrap();
}

/// Plugin block for `dsn` with extra directive lines
pub fn block(dsn: &str, extra: &[&str]) -> String {
    let mut block = format!("sqlite3 {{\n    dsn \"{}\"\n", dsn);
    for line in extra {
        block.push_str("    ");
        block.push_str(line);
        block.push('\n');
    }
    block.push_str("}\n");
    block
}
