//! Key-value storage for fetched items and rendered reports.
//!
//! Values are opaque strings with a time-to-live; [`put_json`] and
//! [`get_json`] layer serde on top. Expired entries read as absent.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::date::FetchDate;
use crate::sources::Category;

/// Entries live for a week unless configured otherwise.
pub const DEFAULT_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Minimal storage interface shared by the file-backed and in-memory stores.
pub trait KvStore: Send + Sync {
    /// Stores `value` under `key`, replacing any previous value.
    fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Returns the value for `key`, or `None` when missing or expired.
    fn get(&self, key: &str) -> Result<Option<String>>;
}

/// `2025-06-01-news`
pub fn data_key(date: FetchDate, category: Category) -> String {
    format!("{date}-{}", category.as_str())
}

/// `2025-06-01-report`
pub fn report_key(date: FetchDate) -> String {
    format!("{date}-report")
}

/// Serializes `value` as JSON and stores it.
pub fn put_json<T: Serialize + ?Sized>(
    store: &dyn KvStore,
    key: &str,
    value: &T,
    ttl: Duration,
) -> Result<()> {
    debug!(key, "Storing value");
    let json = serde_json::to_string(value).context("Failed to serialize value for storage")?;
    store.put(key, &json, ttl)
}

/// Loads and deserializes the JSON stored under `key`.
pub fn get_json<T: DeserializeOwned>(store: &dyn KvStore, key: &str) -> Result<Option<T>> {
    debug!(key, "Retrieving value");
    let Some(raw) = store.get(key)? else {
        return Ok(None);
    };
    serde_json::from_str(&raw)
        .map(Some)
        .with_context(|| format!("Stored value for '{key}' is not valid JSON"))
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    expires_at: u64,
    value: String,
}

/// One JSON envelope file per key under a directory.
#[derive(Debug, Clone)]
pub struct FileKvStore {
    dir: PathBuf,
}

impl FileKvStore {
    /// Uses `dir` as the storage root; it is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Key bytes outside `[A-Za-z0-9.-]` are written as `_XX` hex, so
    /// distinct keys never share a file.
    fn entry_path(&self, key: &str) -> PathBuf {
        let mut file_name = String::with_capacity(key.len());
        for byte in key.bytes() {
            if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.') {
                file_name.push(char::from(byte));
            } else {
                let _ = write!(file_name, "_{byte:02X}");
            }
        }
        self.dir.join(format!("{file_name}.json"))
    }
}

impl KvStore for FileKvStore {
    fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create directory {}", self.dir.display()))?;

        let envelope = Envelope {
            expires_at: now_secs().saturating_add(ttl.as_secs()),
            value: value.to_string(),
        };
        let contents =
            serde_json::to_string(&envelope).context("Failed to serialize storage entry")?;

        let path = self.entry_path(key);
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, contents)
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                tmp_path.display(),
                path.display()
            )
        })
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.entry_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let envelope: Envelope = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        if envelope.expires_at <= now_secs() {
            debug!(key, "Entry expired");
            let _ = fs::remove_file(&path);
            return Ok(None);
        }
        Ok(Some(envelope.value))
    }
}

/// Process-local store, used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, (u64, String)>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryKvStore {
    fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let expires_at = now_secs().saturating_add(ttl.as_secs());
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), (expires_at, value.to_string()));
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.get(key) {
            Some((expires_at, _)) if *expires_at <= now_secs() => {
                entries.remove(key);
                Ok(None)
            }
            Some((_, value)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }
}
