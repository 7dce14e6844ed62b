//! SQLite-backed metadata store.
//!
//! One table holds all four logical caches (transcripts, content, summaries,
//! slide manifests), distinguished by namespace. Every read and write first
//! sweeps expired rows and, when the total payload exceeds the byte cap,
//! evicts by ascending `last_accessed_at` until under cap. Reads touch
//! `last_accessed_at`.
//!
//! Writes are serialized by an internal mutex; WAL journaling plus a busy
//! timeout keeps the file usable across process crashes.

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CacheError, CacheResult};

/// Logical table within the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Transcript,
    Content,
    Summary,
    Slides,
}

impl Namespace {
    fn as_str(&self) -> &'static str {
        match self {
            Namespace::Transcript => "transcript",
            Namespace::Content => "content",
            Namespace::Summary => "summary",
            Namespace::Slides => "slides",
        }
    }
}

/// Store configuration.
#[derive(Debug, Clone)]
pub struct MetaStoreConfig {
    pub path: PathBuf,
    pub max_bytes: u64,
    pub ttl_ms: i64,
}

/// Aggregate statistics for `--cache-stats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub entries: u64,
    pub total_bytes: u64,
}

/// The metadata store. Exclusively owns its database file.
pub struct MetaStore {
    conn: Mutex<Connection>,
    max_bytes: u64,
    ttl_ms: i64,
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

impl MetaStore {
    /// Open (creating if needed) the store at the configured path.
    pub fn open(config: &MetaStoreConfig) -> CacheResult<Self> {
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|_| CacheError::DirectoryUnavailable(parent.to_path_buf()))?;
        }

        let conn = Connection::open(&config.path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.busy_timeout(std::time::Duration::from_millis(5_000))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS entries (
                namespace        TEXT NOT NULL,
                key              TEXT NOT NULL,
                value            TEXT NOT NULL,
                created_at       INTEGER NOT NULL,
                last_accessed_at INTEGER NOT NULL,
                size_bytes       INTEGER NOT NULL,
                PRIMARY KEY (namespace, key)
            );
            CREATE INDEX IF NOT EXISTS idx_entries_lru ON entries (last_accessed_at);",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
            max_bytes: config.max_bytes,
            ttl_ms: config.ttl_ms,
        })
    }

    /// In-memory store for tests and `--no-cache` runs that still want the
    /// read-through shape.
    pub fn open_in_memory(max_bytes: u64, ttl_ms: i64) -> CacheResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS entries (
                namespace        TEXT NOT NULL,
                key              TEXT NOT NULL,
                value            TEXT NOT NULL,
                created_at       INTEGER NOT NULL,
                last_accessed_at INTEGER NOT NULL,
                size_bytes       INTEGER NOT NULL,
                PRIMARY KEY (namespace, key)
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            max_bytes,
            ttl_ms,
        })
    }

    /// Fetch a value, touching its access time.
    pub fn get(&self, ns: Namespace, key: &str) -> CacheResult<Option<String>> {
        self.get_at(ns, key, now_ms())
    }

    pub(crate) fn get_at(&self, ns: Namespace, key: &str, now: i64) -> CacheResult<Option<String>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        Self::sweep(&conn, self.ttl_ms, self.max_bytes, now)?;

        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM entries WHERE namespace = ?1 AND key = ?2",
                params![ns.as_str(), key],
                |row| row.get(0),
            )
            .optional()?;

        if value.is_some() {
            conn.execute(
                "UPDATE entries SET last_accessed_at = ?3 WHERE namespace = ?1 AND key = ?2",
                params![ns.as_str(), key, now],
            )?;
        }

        Ok(value)
    }

    /// Insert or replace a value.
    pub fn put(&self, ns: Namespace, key: &str, value: &str) -> CacheResult<()> {
        self.put_at(ns, key, value, now_ms())
    }

    pub(crate) fn put_at(
        &self,
        ns: Namespace,
        key: &str,
        value: &str,
        now: i64,
    ) -> CacheResult<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        Self::sweep(&conn, self.ttl_ms, self.max_bytes, now)?;

        conn.execute(
            "INSERT INTO entries (namespace, key, value, created_at, last_accessed_at, size_bytes)
             VALUES (?1, ?2, ?3, ?4, ?4, ?5)
             ON CONFLICT (namespace, key) DO UPDATE SET
                value = excluded.value,
                created_at = excluded.created_at,
                last_accessed_at = excluded.last_accessed_at,
                size_bytes = excluded.size_bytes",
            params![ns.as_str(), key, value, now, value.len() as i64],
        )?;

        Self::evict_over_cap(&conn, self.max_bytes)?;
        Ok(())
    }

    /// Delete everything (`--clear-cache`).
    pub fn clear(&self) -> CacheResult<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.execute("DELETE FROM entries", [])?;
        Ok(())
    }

    /// Entry count and total payload size.
    pub fn stats(&self) -> CacheResult<StoreStats> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let (entries, total_bytes): (u64, u64) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(size_bytes), 0) FROM entries",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(StoreStats {
            entries,
            total_bytes,
        })
    }

    /// TTL sweep, then size-cap eviction. Runs under the writer lock.
    fn sweep(conn: &Connection, ttl_ms: i64, max_bytes: u64, now: i64) -> CacheResult<()> {
        let expired = conn.execute(
            "DELETE FROM entries WHERE created_at + ?1 < ?2",
            params![ttl_ms, now],
        )?;
        if expired > 0 {
            debug!(expired, "Cache TTL sweep removed entries");
        }
        Self::evict_over_cap(conn, max_bytes)
    }

    fn evict_over_cap(conn: &Connection, max_bytes: u64) -> CacheResult<()> {
        loop {
            let total: i64 =
                conn.query_row("SELECT COALESCE(SUM(size_bytes), 0) FROM entries", [], |r| {
                    r.get(0)
                })?;
            if total as u64 <= max_bytes {
                return Ok(());
            }

            let victim: Option<(String, String)> = conn
                .query_row(
                    "SELECT namespace, key FROM entries
                     ORDER BY last_accessed_at ASC LIMIT 1",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            match victim {
                Some((ns, key)) => {
                    conn.execute(
                        "DELETE FROM entries WHERE namespace = ?1 AND key = ?2",
                        params![ns, key],
                    )?;
                    debug!(namespace = %ns, "Cache evicted LRU entry over byte cap");
                }
                None => return Ok(()),
            }
        }
    }
}
