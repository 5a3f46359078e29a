//! SQLite cache backend.

use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::backend::{CacheBackend, CacheStats};

pub const SCHEMA_VERSION: i64 = 1;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Entries in a single `cache_entries` table.
///
/// A connection is opened per call so the backend stays `Send + Sync`
/// without a shared handle; SQLite serializes the writes.
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    db_path: PathBuf,
}

impl SqliteBackend {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed creating directory: {}", parent.display()))?;
        }
        let backend = Self { db_path: db_path.to_path_buf() };
        let conn = backend.connect()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS cache_entries (
                key TEXT PRIMARY KEY,
                entry TEXT NOT NULL
            );
            ",
        )?;

        let current: Option<i64> = conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
            .optional()?;
        match current {
            None => {
                conn.execute("INSERT INTO schema_version(version) VALUES(?1)", [SCHEMA_VERSION])?;
            }
            Some(version) if version == SCHEMA_VERSION => {}
            Some(version) => {
                bail!("Unsupported cache schema version {version}; expected {SCHEMA_VERSION}");
            }
        }
        Ok(backend)
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)
            .with_context(|| format!("Failed opening cache database: {}", self.db_path.display()))?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }
}

impl CacheBackend for SqliteBackend {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let conn = self.connect()?;
        let entry = conn
            .query_row("SELECT entry FROM cache_entries WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(entry)
    }

    fn write(&self, key: &str, entry: &str) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT OR REPLACE INTO cache_entries(key, entry) VALUES(?1, ?2)",
            params![key, entry],
        )?;
        Ok(())
    }

    fn stats(&self) -> Result<CacheStats> {
        let conn = self.connect()?;
        let (entries, bytes): (i64, i64) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(LENGTH(entry)), 0) FROM cache_entries",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(CacheStats {
            entries: entries as usize,
            bytes: bytes as u64,
            location: self.db_path.clone(),
        })
    }

    fn clear(&self) -> Result<usize> {
        let conn = self.connect()?;
        let removed = conn.execute("DELETE FROM cache_entries", [])?;
        Ok(removed)
    }

    fn location(&self) -> PathBuf {
        self.db_path.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn write_replaces_previous_entry() {
        let tmp = TempDir::new().expect("tmp");
        let backend = SqliteBackend::open(&tmp.path().join("c.sqlite")).expect("open");
        backend.write("k", "one").expect("write");
        backend.write("k", "two").expect("overwrite");
        assert_eq!(backend.read("k").expect("read").as_deref(), Some("two"));
        assert_eq!(backend.stats().expect("stats").entries, 1);
    }

    #[test]
    fn reopen_keeps_entries() {
        let tmp = TempDir::new().expect("tmp");
        let path = tmp.path().join("c.sqlite");
        SqliteBackend::open(&path).expect("open").write("k", "v").expect("write");
        let reopened = SqliteBackend::open(&path).expect("reopen");
        assert_eq!(reopened.read("k").expect("read").as_deref(), Some("v"));
    }

    #[test]
    fn rejects_unknown_schema_version() {
        let tmp = TempDir::new().expect("tmp");
        let path = tmp.path().join("c.sqlite");
        SqliteBackend::open(&path).expect("open");
        let conn = Connection::open(&path).expect("conn");
        conn.execute("UPDATE schema_version SET version = 99", []).expect("bump");
        assert!(SqliteBackend::open(&path).is_err());
    }
}
