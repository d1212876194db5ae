//! Exchange-rate cache persisted across runs.
//!
//! Stored as `exchange_rates.json`: a pretty-printed map from currency pair
//! to its cache entry. Freshness is judged by the oracle on read, so stale
//! entries are kept on disk and simply refetched.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use cdcx_feed::{MemoryRateStore, RateCacheEntry, RateStore};

use crate::error::PersistenceResult;

pub const RATE_FILE_NAME: &str = "exchange_rates.json";

/// [`RateStore`] that can be loaded from and saved to a file.
#[derive(Debug)]
pub struct FileRateStore {
    path: PathBuf,
    inner: MemoryRateStore,
}

impl FileRateStore {
    /// Load `path`. A missing file starts empty; an unreadable one is logged
    /// and also starts empty.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let inner = MemoryRateStore::new();

        match fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<BTreeMap<String, RateCacheEntry>>(&text) {
                Ok(entries) => {
                    for (_, entry) in entries {
                        inner.put(entry);
                    }
                    info!(path = %path.display(), rates = inner.len(), "Loaded rate cache");
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Ignoring corrupt rate cache"),
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "No rate cache yet");
            }
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to read rate cache"),
        }

        Self { path, inner }
    }

    /// `exchange_rates.json` under `data_dir`.
    pub fn in_dir(data_dir: impl AsRef<Path>) -> Self {
        Self::load(data_dir.as_ref().join(RATE_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn save(&self) -> PersistenceResult<()> {
        let entries: BTreeMap<String, RateCacheEntry> = self
            .inner
            .entries()
            .into_iter()
            .map(|e| (e.currency_pair.clone(), e))
            .collect();

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&entries)?)?;
        debug!(path = %self.path.display(), rates = entries.len(), "Saved rate cache");
        Ok(())
    }
}

impl RateStore for FileRateStore {
    fn get(&self, currency_pair: &str) -> Option<RateCacheEntry> {
        self.inner.get(currency_pair)
    }

    fn put(&self, entry: RateCacheEntry) {
        self.inner.put(entry)
    }

    fn entries(&self) -> Vec<RateCacheEntry> {
        self.inner.entries()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let store = FileRateStore::in_dir(dir.path());
        assert!(store.is_empty());
        assert_eq!(store.path(), dir.path().join("exchange_rates.json"));
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let fetched_at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();

        let store = FileRateStore::in_dir(dir.path().join("nested"));
        store.put(RateCacheEntry::new("USDTINR", dec!(83.25), fetched_at));
        store.put(RateCacheEntry::new("BTCINR", dec!(5400000), fetched_at));
        store.save().unwrap();

        let text = fs::read_to_string(store.path()).unwrap();
        let raw: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert!(raw.get("USDTINR").is_some());

        let reloaded = FileRateStore::in_dir(dir.path().join("nested"));
        assert_eq!(reloaded.len(), 2);
        let entry = reloaded.get("USDTINR").unwrap();
        assert_eq!(entry.rate, dec!(83.25));
        assert_eq!(entry.fetched_at, fetched_at);
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(RATE_FILE_NAME);
        fs::write(&path, "[1, 2").unwrap();

        let store = FileRateStore::load(&path);
        assert!(store.is_empty());

        // next save replaces the corrupt file
        store.put(RateCacheEntry::new("USDTINR", dec!(83), Utc::now()));
        store.save().unwrap();
        assert_eq!(FileRateStore::load(&path).len(), 1);
    }
}
