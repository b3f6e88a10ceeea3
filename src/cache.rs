// 🗄️ Dataset Cache - explicit, bounded memo of normalized datasets
//
// Keyed by (file identity, modification time). Callers own the cache and
// pass it where it is needed; nothing is memoized process-wide.

use crate::config::CacheConfig;
use crate::dataset::RawDataset;
use crate::error::Result;
use crate::normalizer::{DatasetNormalizer, NormalizedDataset};
use anyhow::Context;
use moka::sync::Cache;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DatasetKey {
    /// SHA-256 of the canonical path (files) or of the content (uploads)
    pub identity: String,
    /// File modification time; None for uploaded bytes
    pub modified: Option<SystemTime>,
}

impl DatasetKey {
    pub fn for_path(path: &Path) -> Result<Self> {
        let canonical = fs::canonicalize(path)
            .with_context(|| format!("Failed to resolve path: {}", path.display()))?;
        let modified = fs::metadata(&canonical)
            .with_context(|| format!("Failed to stat file: {}", canonical.display()))?
            .modified()
            .ok();

        Ok(DatasetKey {
            identity: sha256_hex(canonical.to_string_lossy().as_bytes()),
            modified,
        })
    }

    pub fn for_bytes(bytes: &[u8]) -> Self {
        DatasetKey {
            identity: sha256_hex(bytes),
            modified: None,
        }
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Bounded, thread-safe memo of normalized datasets.
///
/// Parsing and normalization happen outside the cache; only the finished
/// dataset is inserted. Entries past `max_datasets` are evicted.
#[derive(Clone)]
pub struct DatasetCache {
    normalizer: DatasetNormalizer,
    entries: Cache<DatasetKey, Arc<NormalizedDataset>>,
}

impl Default for DatasetCache {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DatasetCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatasetCache")
            .field("entries", &self.entries.entry_count())
            .finish()
    }
}

impl DatasetCache {
    pub fn new() -> Self {
        Self::with_config(&CacheConfig::default())
    }

    pub fn with_config(config: &CacheConfig) -> Self {
        DatasetCache {
            normalizer: DatasetNormalizer::new(),
            entries: Cache::builder().max_capacity(config.max_datasets).build(),
        }
    }

    /// Normalized dataset for a file, re-read when its mtime changed
    pub fn load_path(&self, path: &Path) -> Result<Arc<NormalizedDataset>> {
        let key = DatasetKey::for_path(path)?;
        if let Some(hit) = self.entries.get(&key) {
            debug!(path = %path.display(), "dataset cache hit");
            return Ok(hit);
        }

        debug!(path = %path.display(), "dataset cache miss");
        let raw = RawDataset::from_path(path)?;
        self.insert(key, &raw)
    }

    /// Normalized dataset for uploaded bytes (content-addressed)
    pub fn load_bytes(&self, bytes: &[u8]) -> Result<Arc<NormalizedDataset>> {
        let key = DatasetKey::for_bytes(bytes);
        if let Some(hit) = self.entries.get(&key) {
            debug!("dataset cache hit (upload)");
            return Ok(hit);
        }

        let raw = RawDataset::from_bytes(bytes)?;
        self.insert(key, &raw)
    }

    fn insert(&self, key: DatasetKey, raw: &RawDataset) -> Result<Arc<NormalizedDataset>> {
        // Schema errors propagate and are never cached
        let dataset = Arc::new(self.normalizer.normalize(raw)?);

        // Older versions of the same file are stale now
        self.remove_identity(&key.identity);
        self.entries.insert(key, Arc::clone(&dataset));
        Ok(dataset)
    }

    fn remove_identity(&self, identity: &str) -> usize {
        let stale: Vec<Arc<DatasetKey>> = self
            .entries
            .iter()
            .filter(|(k, _)| k.identity == identity)
            .map(|(k, _)| k)
            .collect();
        for key in &stale {
            self.entries.invalidate(key.as_ref());
        }
        stale.len()
    }

    pub fn contains(&self, key: &DatasetKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn invalidate(&self, key: &DatasetKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drop every cached version of a file; returns how many were removed
    pub fn invalidate_path(&self, path: &Path) -> Result<usize> {
        let identity = DatasetKey::for_path(path)?.identity;
        Ok(self.remove_identity(&identity))
    }

    pub fn clear(&self) {
        self.entries.invalidate_all();
        self.entries.run_pending_tasks();
    }

    pub fn len(&self) -> usize {
        self.entries.run_pending_tasks();
        self.entries.entry_count() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnalyticsError;
    use std::fs::File;
    use std::time::Duration;
    use tempfile::TempDir;

    const CSV: &str = "Date,Amount,Category\n2024-01-05,-50,Food\n2024-01-10,1000,Income\n";

    fn write(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_path_hit_returns_same_dataset() {
        let temp = TempDir::new().unwrap();
        let path = write(&temp, "tx.csv", CSV);
        let cache = DatasetCache::new();

        let first = cache.load_path(&path).unwrap();
        let second = cache.load_path(&path).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
        assert_eq!(first.table.len(), 2);
    }

    #[test]
    fn test_modified_file_is_reloaded() {
        let temp = TempDir::new().unwrap();
        let path = write(&temp, "tx.csv", CSV);
        let cache = DatasetCache::new();
        let first = cache.load_path(&path).unwrap();

        fs::write(&path, "Date,Amount\n2024-03-01,-5\n").unwrap();
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(SystemTime::now() + Duration::from_secs(60))
            .unwrap();

        let second = cache.load_path(&path).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.table.len(), 1);
        // stale entry replaced, not kept alongside
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_bytes_are_content_addressed() {
        let cache = DatasetCache::new();
        let a = cache.load_bytes(CSV.as_bytes()).unwrap();
        let b = cache.load_bytes(CSV.as_bytes()).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert!(cache.contains(&DatasetKey::for_bytes(CSV.as_bytes())));
    }

    #[test]
    fn test_invalidation() {
        let temp = TempDir::new().unwrap();
        let path = write(&temp, "tx.csv", CSV);
        let cache = DatasetCache::new();

        cache.load_path(&path).unwrap();
        cache.load_bytes(CSV.as_bytes()).unwrap();
        assert_eq!(cache.len(), 2);

        assert_eq!(cache.invalidate_path(&path).unwrap(), 1);
        assert!(cache.invalidate(&DatasetKey::for_bytes(CSV.as_bytes())));
        assert!(!cache.invalidate(&DatasetKey::for_bytes(b"other")));
        assert!(cache.is_empty());

        cache.load_bytes(CSV.as_bytes()).unwrap();
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_upload_entries_are_bounded() {
        let cache = DatasetCache::with_config(&CacheConfig { max_datasets: 2 });
        for day in 1..=6 {
            let body = format!("Date,Amount\n2024-01-0{},-5\n", day);
            let dataset = cache.load_bytes(body.as_bytes()).unwrap();
            assert_eq!(dataset.table.len(), 1);
        }

        assert!(cache.len() <= 2);
    }

    #[test]
    fn test_shared_between_threads() {
        let cache = DatasetCache::new();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = cache.clone();
                std::thread::spawn(move || cache.load_bytes(CSV.as_bytes()).unwrap().table.len())
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 2);
        }
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_schema_errors_not_cached() {
        let cache = DatasetCache::new();
        let result = cache.load_bytes(b"Memo,Amount\nx,1\n");

        assert!(matches!(result, Err(AnalyticsError::NoDateColumnFound)));
        assert!(cache.is_empty());
    }
}
