//! Cache persistence backends.

use anyhow::{Context, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::utils::{sha256_hex, write_atomic};

/// Durable string-keyed storage for serialized cache entries.
///
/// Implementations must tolerate concurrent readers and writers on distinct
/// keys, and concurrent writers on the same key (last writer wins).
pub trait CacheBackend: Send + Sync {
    /// Raw stored entry for `key`, or `None` when absent.
    fn read(&self, key: &str) -> Result<Option<String>>;

    /// Store `entry` under `key`, replacing any previous entry.
    fn write(&self, key: &str, entry: &str) -> Result<()>;

    fn stats(&self) -> Result<CacheStats>;

    fn clear(&self) -> Result<usize>;

    fn location(&self) -> PathBuf;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub bytes: u64,
    pub location: PathBuf,
}

/// One JSON file per key, named by the SHA-256 of the key string.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed creating cache directory: {}", dir.display()))?;
        Ok(Self { dir: dir.to_path_buf() })
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sha256_hex(key)))
    }

    fn entry_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let listing = match fs::read_dir(&self.dir) {
            Ok(listing) => listing,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(files),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("Failed listing cache: {}", self.dir.display()))
            }
        };
        for entry in listing.filter_map(Result::ok) {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                files.push(path);
            }
        }
        Ok(files)
    }
}

impl CacheBackend for FileBackend {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let path = self.entry_path(key);
        match fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => {
                Err(err).with_context(|| format!("Failed reading cache entry: {}", path.display()))
            }
        }
    }

    fn write(&self, key: &str, entry: &str) -> Result<()> {
        write_atomic(&self.entry_path(key), entry.as_bytes())
    }

    fn stats(&self) -> Result<CacheStats> {
        let files = self.entry_files()?;
        let bytes = files.iter().filter_map(|p| fs::metadata(p).ok()).map(|m| m.len()).sum();
        Ok(CacheStats { entries: files.len(), bytes, location: self.dir.clone() })
    }

    fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        for path in self.entry_files()? {
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(err)
                        .with_context(|| format!("Failed removing {}", path.display()))
                }
            }
        }
        Ok(removed)
    }

    fn location(&self) -> PathBuf {
        self.dir.clone()
    }
}
