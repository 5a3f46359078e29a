//! Durable TTL cache for expensive fetches.
//!
//! Entries are stored under the canonical string form of a [`CacheKey`] and
//! carry the instant they were written. [`CacheStore::load_or_call`] hands back
//! a fresh entry untouched, and otherwise calls the supplied fetch exactly once
//! and overwrites the entry wholesale. There is no partial invalidation and no
//! locking: two callers racing on the same key both fetch, and the last write
//! wins.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub mod backend;
pub mod sqlite;

pub use backend::{CacheBackend, CacheStats, FileBackend};
pub use sqlite::SqliteBackend;

use crate::domain::Provenance;

/// Upper bound on a TTL (100 years); anything longer means "never expires".
const MAX_TTL_HOURS: u64 = 876_000;

/// Namespace plus request parameters, rendered with parameters sorted by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    namespace: String,
    parts: BTreeMap<String, String>,
}

impl CacheKey {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self { namespace: namespace.into(), parts: BTreeMap::new() }
    }

    pub fn from_parts<I, K, V>(namespace: impl Into<String>, parts: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        let mut key = Self::new(namespace);
        for (k, v) in parts {
            key.parts.insert(k.into(), v.to_string());
        }
        key
    }

    pub fn part(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.parts.insert(name.into(), value.to_string());
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|", self.namespace)?;
        let mut first = true;
        for (k, v) in &self.parts {
            if !first {
                f.write_str("|")?;
            }
            first = false;
            write!(f, "{k}={v}")?;
        }
        Ok(())
    }
}

/// A persisted fetch result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
}

/// Source of "now" for TTL decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Which backend a [`CacheStore`] persists to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Files,
    Sqlite,
}

pub struct CacheStore {
    backend: Box<dyn CacheBackend>,
    clock: Arc<dyn Clock>,
}

impl CacheStore {
    pub fn new(backend: impl CacheBackend + 'static) -> Self {
        Self { backend: Box::new(backend), clock: Arc::new(SystemClock) }
    }

    /// Open the store under `dir` with the requested backend.
    pub fn open(dir: &Path, kind: BackendKind) -> Result<Self> {
        let store = match kind {
            BackendKind::Files => Self::new(FileBackend::open(dir)?),
            BackendKind::Sqlite => Self::new(SqliteBackend::open(&dir.join("cache.sqlite"))?),
        };
        Ok(store)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn location(&self) -> PathBuf {
        self.backend.location()
    }

    /// Return the cached value for `key` when younger than `ttl_hours`,
    /// otherwise call `fetch` once and store its result.
    ///
    /// Errors from `fetch` are returned as-is. A stored entry that cannot be
    /// read or decoded counts as a miss.
    pub fn load_or_call<T, F>(
        &self,
        key: &str,
        ttl_hours: u64,
        fetch: F,
        force_refresh: bool,
    ) -> Result<(T, Provenance)>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T>,
    {
        let now = self.clock.now();
        if !force_refresh {
            if let Some(value) = self.load_fresh(key, ttl_hours, now) {
                tracing::debug!(key, "cache hit");
                return Ok((value, Provenance::Cache));
            }
        } else {
            tracing::debug!(key, "forced refresh");
        }

        let value = fetch()?;
        let entry = CacheEntry { timestamp: self.clock.now(), payload: serde_json::to_value(&value)? };
        match serde_json::to_string(&entry) {
            Ok(raw) => {
                if let Err(err) = self.backend.write(key, &raw) {
                    tracing::warn!(key, "failed to persist cache entry: {err:#}");
                }
            }
            Err(err) => tracing::warn!(key, "failed to encode cache entry: {err}"),
        }
        Ok((value, Provenance::Api))
    }

    fn load_fresh<T: DeserializeOwned>(
        &self,
        key: &str,
        ttl_hours: u64,
        now: DateTime<Utc>,
    ) -> Option<T> {
        let raw = match self.backend.read(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                tracing::warn!(key, "unreadable cache entry, refetching: {err:#}");
                return None;
            }
        };
        let entry: CacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(key, "corrupt cache entry, refetching: {err}");
                return None;
            }
        };
        let ttl = Duration::hours(ttl_hours.min(MAX_TTL_HOURS) as i64);
        if now - entry.timestamp >= ttl {
            tracing::debug!(key, "cache entry expired");
            return None;
        }
        match serde_json::from_value(entry.payload) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(key, "cached payload has an unexpected shape, refetching: {err}");
                None
            }
        }
    }

    pub fn stats(&self) -> Result<CacheStats> {
        self.backend.stats()
    }

    /// Remove every entry. Returns the number removed.
    pub fn clear(&self) -> Result<usize> {
        self.backend.clear()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Clock;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::sync::Mutex;

    /// Clock that only moves when told to.
    pub struct ManualClock(Mutex<DateTime<Utc>>);

    impl ManualClock {
        pub fn at_epoch_secs(secs: i64) -> Self {
            Self(Mutex::new(Utc.timestamp_opt(secs, 0).unwrap()))
        }

        pub fn advance_secs(&self, secs: i64) {
            let mut now = self.0.lock().unwrap();
            *now += Duration::seconds(secs);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::ManualClock;
    use super::*;
    use std::cell::Cell;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn store(tmp: &TempDir, clock: Arc<ManualClock>) -> CacheStore {
        CacheStore::new(FileBackend::open(tmp.path()).expect("backend")).with_clock(clock)
    }

    #[test]
    fn key_is_independent_of_part_order() {
        let mut ab = HashMap::new();
        ab.insert("a", 1);
        ab.insert("b", 2);
        let a_first = CacheKey::from_parts("ns", [("a", 1), ("b", 2)]);
        let b_first = CacheKey::from_parts("ns", [("b", 2), ("a", 1)]);
        let from_map = CacheKey::from_parts("ns", ab);
        assert_eq!(a_first.to_string(), b_first.to_string());
        assert_eq!(a_first.to_string(), from_map.to_string());
        assert_eq!(a_first.to_string(), "ns|a=1|b=2");
    }

    #[test]
    fn namespace_is_part_of_the_key() {
        let commits = CacheKey::new("bb:commits").part("repo", "web");
        let search = CacheKey::new("jira:search").part("repo", "web");
        assert_ne!(commits.to_string(), search.to_string());
    }

    #[test]
    fn ttl_controls_refetch() {
        let tmp = TempDir::new().expect("tmp");
        let clock = Arc::new(ManualClock::at_epoch_secs(1_700_000_000));
        let store = store(&tmp, clock.clone());
        let calls = Cell::new(0);
        let fetch = |value: &str| {
            calls.set(calls.get() + 1);
            Ok::<_, anyhow::Error>(value.to_string())
        };

        let (v, src) = store.load_or_call("k", 1, || fetch("v1"), false).expect("first");
        assert_eq!((v.as_str(), src), ("v1", Provenance::Api));

        clock.advance_secs(1800);
        let (v, src) = store.load_or_call("k", 1, || fetch("v2"), false).expect("second");
        assert_eq!((v.as_str(), src), ("v1", Provenance::Cache));
        assert_eq!(calls.get(), 1);

        clock.advance_secs(5400);
        let (v, src) = store.load_or_call("k", 1, || fetch("v3"), false).expect("third");
        assert_eq!((v.as_str(), src), ("v3", Provenance::Api));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn force_refresh_bypasses_fresh_entry() {
        let tmp = TempDir::new().expect("tmp");
        let clock = Arc::new(ManualClock::at_epoch_secs(0));
        let store = store(&tmp, clock);
        store.load_or_call("k", 12, || Ok(1u32), false).expect("seed");
        let (v, src) = store.load_or_call("k", 12, || Ok(2u32), true).expect("forced");
        assert_eq!((v, src), (2, Provenance::Api));
        let (v, src) = store.load_or_call("k", 12, || Ok(3u32), false).expect("after");
        assert_eq!((v, src), (2, Provenance::Cache));
    }

    #[test]
    fn fetch_error_propagates_and_writes_nothing() {
        let tmp = TempDir::new().expect("tmp");
        let store = store(&tmp, Arc::new(ManualClock::at_epoch_secs(0)));
        let err = store
            .load_or_call::<u32, _>("k", 12, || anyhow::bail!("HTTP 401"), false)
            .expect_err("should fail");
        assert!(err.to_string().contains("401"));
        assert_eq!(store.stats().expect("stats").entries, 0);
    }

    #[test]
    fn corrupt_entry_is_a_miss() {
        let tmp = TempDir::new().expect("tmp");
        let backend = FileBackend::open(tmp.path()).expect("backend");
        backend.write("k", "{not json").expect("write garbage");
        let store = CacheStore::new(backend).with_clock(Arc::new(ManualClock::at_epoch_secs(0)));
        let (v, src) = store.load_or_call("k", 12, || Ok("fresh".to_string()), false).expect("ok");
        assert_eq!((v.as_str(), src), ("fresh", Provenance::Api));
        let (_, src) = store.load_or_call("k", 12, || Ok("again".to_string()), false).expect("ok");
        assert_eq!(src, Provenance::Cache);
    }

    #[test]
    fn payload_of_the_wrong_shape_is_a_miss() {
        let tmp = TempDir::new().expect("tmp");
        let store = store(&tmp, Arc::new(ManualClock::at_epoch_secs(0)));
        store.load_or_call("k", 12, || Ok("text".to_string()), false).expect("seed");
        let (v, src) = store.load_or_call("k", 12, || Ok(vec![1u8, 2]), false).expect("reshape");
        assert_eq!((v, src), (vec![1, 2], Provenance::Api));
    }

    #[test]
    fn entries_survive_reopening() {
        let tmp = TempDir::new().expect("tmp");
        let clock = Arc::new(ManualClock::at_epoch_secs(0));
        store(&tmp, clock.clone()).load_or_call("k", 12, || Ok(7u32), false).expect("seed");
        let (v, src) =
            store(&tmp, clock).load_or_call("k", 12, || Ok(8u32), false).expect("reopen");
        assert_eq!((v, src), (7, Provenance::Cache));
    }

    #[test]
    fn sqlite_backend_honours_the_same_contract() {
        let tmp = TempDir::new().expect("tmp");
        let clock = Arc::new(ManualClock::at_epoch_secs(0));
        let store = CacheStore::open(tmp.path(), BackendKind::Sqlite)
            .expect("open")
            .with_clock(clock.clone());
        let (_, src) = store.load_or_call("k", 1, || Ok(1u32), false).expect("first");
        assert_eq!(src, Provenance::Api);
        clock.advance_secs(60);
        let (v, src) = store.load_or_call("k", 1, || Ok(2u32), false).expect("second");
        assert_eq!((v, src), (1, Provenance::Cache));
        assert_eq!(store.stats().expect("stats").entries, 1);
        assert_eq!(store.clear().expect("clear"), 1);
        assert_eq!(store.stats().expect("stats").entries, 0);
    }
}
