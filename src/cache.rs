//! Disk-backed cache: one bincode record per log under the platform cache
//! directory.
//!
//! Layout: `<cache-dir>/chat-atlas/<subject-hash>/<name-hash>.bin`. Records
//! carry a schema version; a mismatch, a truncated file or any decode error
//! is treated as a miss for that one log. Writes go through a temp file and
//! rename so a crash never leaves a half-written record behind.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bincode::config;
use serde::{Deserialize, Serialize};

use crate::models::LogEntry;
use crate::ports::CachePort;

/// Cache schema version for invalidation on format changes.
pub const CACHE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct CacheRecord {
    version: u32,
    entry: LogEntry,
}

/// Stable hash of an arbitrary key for use as a file or directory name.
/// Returns the first 12 characters of the hex digest.
fn key_hash(key: &str) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    format!("{:016x}", hasher.finish())[..12].to_string()
}

#[derive(Debug, Clone)]
pub struct DiskCache {
    root: PathBuf,
}

impl DiskCache {
    /// Cache rooted at the platform cache directory.
    pub fn new() -> Result<Self> {
        let base = dirs::cache_dir().context("failed to resolve platform cache directory")?;
        Ok(Self { root: base.join("chat-atlas") })
    }

    /// Cache rooted at an explicit directory (tests, embedded hosts).
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn subject_dir(&self, subject: &str) -> PathBuf {
        self.root.join(key_hash(subject))
    }

    fn entry_path(&self, subject: &str, name: &str) -> PathBuf {
        self.subject_dir(subject).join(format!("{}.bin", key_hash(name)))
    }

    fn read_record(path: &Path) -> Result<LogEntry> {
        let bytes = fs::read(path).context("failed to read cache record")?;
        let record: CacheRecord = bincode::serde::decode_from_slice(&bytes, config::standard())
            .context("failed to decode cache record")?
            .0;
        if record.version != CACHE_VERSION {
            anyhow::bail!(
                "cache record version mismatch (expected {}, found {})",
                CACHE_VERSION,
                record.version
            );
        }
        Ok(record.entry)
    }
}

impl CachePort for DiskCache {
    fn read_all(&self, subject: &str) -> Result<HashMap<String, LogEntry>> {
        let dir = self.subject_dir(subject);
        if !dir.exists() {
            return Ok(HashMap::new());
        }
        let mut entries = HashMap::new();
        for item in fs::read_dir(&dir).context("failed to read cache directory")? {
            let path = match item {
                Ok(item) => item.path(),
                Err(_) => continue,
            };
            if path.extension().and_then(|e| e.to_str()) != Some("bin") {
                continue;
            }
            match Self::read_record(&path) {
                Ok(entry) => {
                    entries.insert(entry.name.clone(), entry);
                }
                Err(e) => {
                    // A single unreadable record is a miss, not a failure.
                    log::debug!("skipping cache record {}: {}", path.display(), e);
                }
            }
        }
        Ok(entries)
    }

    fn write(&self, subject: &str, entry: &LogEntry) -> Result<()> {
        let dir = self.subject_dir(subject);
        fs::create_dir_all(&dir).context("failed to create cache directory")?;

        let record = CacheRecord { version: CACHE_VERSION, entry: entry.clone() };
        let bytes = bincode::serde::encode_to_vec(&record, config::standard())
            .context("failed to serialize cache record")?;

        // Atomic write: temp file + rename.
        let path = self.entry_path(subject, &entry.name);
        let temp = path.with_extension("bin.tmp");
        fs::write(&temp, bytes).context("failed to write cache temp file")?;
        fs::rename(&temp, &path).context("failed to rename cache temp file")?;
        Ok(())
    }

    fn delete(&self, subject: &str, name: &str) -> Result<()> {
        let path = self.entry_path(subject, name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context("failed to delete cache record"),
        }
    }
}
