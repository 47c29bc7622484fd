//! Keyed upsert store.
//!
//! The reconciler is the only writer. Each `upsert_one` is atomic for its key;
//! nothing spans keys. Two implementations:
//!
//! - [`MemoryStore`]: a mutex-guarded ordered map, for tests and one-shot runs.
//! - [`JsonFileStore`]: one JSON file per key under
//!   `{root}/symbol={SYMBOL}/{data_type}[-{interval}]/{timestamp}.json`,
//!   written to a uniquely named temp file and renamed into place.

use crate::domain::{KeyPrefix, RecordKey, StoredRecord};
use crate::error::FeedError;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

/// Persistence collaborator used by the reconciler and the read path.
pub trait SeriesStore: Send + Sync {
    /// Insert or replace the record stored under `key`.
    fn upsert_one(&self, key: &RecordKey, record: &StoredRecord) -> Result<(), FeedError>;

    /// Record with the greatest timestamp under `prefix`.
    fn find_latest(&self, prefix: &KeyPrefix) -> Result<Option<StoredRecord>, FeedError>;

    /// All records under `prefix`, ascending by timestamp.
    fn scan(&self, prefix: &KeyPrefix) -> Result<Vec<StoredRecord>, FeedError>;
}

impl<T: SeriesStore + ?Sized> SeriesStore for std::sync::Arc<T> {
    fn upsert_one(&self, key: &RecordKey, record: &StoredRecord) -> Result<(), FeedError> {
        (**self).upsert_one(key, record)
    }

    fn find_latest(&self, prefix: &KeyPrefix) -> Result<Option<StoredRecord>, FeedError> {
        (**self).find_latest(prefix)
    }

    fn scan(&self, prefix: &KeyPrefix) -> Result<Vec<StoredRecord>, FeedError> {
        (**self).scan(prefix)
    }
}

// ── In-memory ────────────────────────────────────────────────────────

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<RecordKey, StoredRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<RecordKey, StoredRecord>>, FeedError> {
        self.records
            .lock()
            .map_err(|_| FeedError::StorageFailure("memory store lock poisoned".into()))
    }
}

impl SeriesStore for MemoryStore {
    fn upsert_one(&self, key: &RecordKey, record: &StoredRecord) -> Result<(), FeedError> {
        self.lock()?.insert(key.clone(), record.clone());
        Ok(())
    }

    fn find_latest(&self, prefix: &KeyPrefix) -> Result<Option<StoredRecord>, FeedError> {
        Ok(self
            .lock()?
            .iter()
            .filter(|(k, _)| prefix.matches(k))
            .map(|(_, v)| v)
            .next_back()
            .cloned())
    }

    fn scan(&self, prefix: &KeyPrefix) -> Result<Vec<StoredRecord>, FeedError> {
        Ok(self
            .lock()?
            .iter()
            .filter(|(k, _)| prefix.matches(k))
            .map(|(_, v)| v.clone())
            .collect())
    }
}

// ── JSON files ───────────────────────────────────────────────────────

/// File-backed store with atomic per-key writes.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for a series: `{root}/symbol={SYMBOL}/{data_type}[-{interval}]/`
    fn series_dir(&self, prefix: &KeyPrefix) -> PathBuf {
        let leaf = match prefix.interval {
            Some(interval) => format!("{}-{}", prefix.data_type, interval),
            None => prefix.data_type.to_string(),
        };
        self.root
            .join(format!("symbol={}", path_segment(&prefix.symbol)))
            .join(leaf)
    }

    fn record_path(&self, key: &RecordKey) -> PathBuf {
        self.series_dir(&key.prefix())
            .join(format!("{}.json", path_segment(&key.timestamp)))
    }

    /// Read every record in a series directory. Unreadable files are skipped
    /// with a warning rather than failing the whole read.
    fn read_dir_records(&self, prefix: &KeyPrefix) -> Result<Vec<StoredRecord>, FeedError> {
        let dir = self.series_dir(prefix);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&dir)
            .map_err(|e| FeedError::StorageFailure(format!("read dir {}: {e}", dir.display())))?;

        let mut records = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| FeedError::StorageFailure(format!("dir entry: {e}")))?;
            let path = entry.path();

            // Skip in-flight .tmp files and anything else that isn't a record
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            match read_record(&path) {
                Ok(record) if prefix.matches(&record.key) => records.push(record),
                Ok(record) => warn!(
                    path = %path.display(),
                    key = %record.key,
                    "record stored under the wrong series directory; ignoring"
                ),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable record"),
            }
        }

        records.sort_by(|a, b| a.key.timestamp.cmp(&b.key.timestamp));
        Ok(records)
    }
}

impl SeriesStore for JsonFileStore {
    fn upsert_one(&self, key: &RecordKey, record: &StoredRecord) -> Result<(), FeedError> {
        let path = self.record_path(key);
        let dir = path
            .parent()
            .ok_or_else(|| FeedError::StorageFailure(format!("no parent for {}", path.display())))?;
        fs::create_dir_all(dir)
            .map_err(|e| FeedError::StorageFailure(format!("failed to create dir: {e}")))?;

        let json = serde_json::to_vec_pretty(record)
            .map_err(|e| FeedError::StorageFailure(format!("record serialization: {e}")))?;

        // Unique temp file per write
        let mut tmp = tempfile::Builder::new()
            .suffix(".tmp")
            .tempfile_in(dir)
            .map_err(|e| FeedError::StorageFailure(format!("temp file in {}: {e}", dir.display())))?;
        tmp.write_all(&json)
            .map_err(|e| FeedError::StorageFailure(format!("write {}: {e}", tmp.path().display())))?;

        // Atomic rename; a failed persist drops (and deletes) the temp file
        tmp.persist(&path)
            .map(|_| ())
            .map_err(|e| FeedError::StorageFailure(format!("atomic rename failed: {}", e.error)))
    }

    fn find_latest(&self, prefix: &KeyPrefix) -> Result<Option<StoredRecord>, FeedError> {
        Ok(self.read_dir_records(prefix)?.pop())
    }

    fn scan(&self, prefix: &KeyPrefix) -> Result<Vec<StoredRecord>, FeedError> {
        self.read_dir_records(prefix)
    }
}

fn read_record(path: &Path) -> Result<StoredRecord, FeedError> {
    let content = fs::read_to_string(path)
        .map_err(|e| FeedError::StorageFailure(format!("read {}: {e}", path.display())))?;
    serde_json::from_str(&content)
        .map_err(|e| FeedError::StorageFailure(format!("parse {}: {e}", path.display())))
}

/// Filesystem-safe single path component for a key part
/// ("2024-01-05 16:00:00" → "2024-01-05T16-00-00", "a/../b" → "a-..-b").
/// The real key lives inside the record.
fn path_segment(raw: &str) -> String {
    raw
        .trim()
        .chars()
        .map(|c| match c {
            ' ' => 'T',
            c if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' => c,
            _ => '-',
        })
        .collect()
}
