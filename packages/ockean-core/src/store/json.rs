//! JSON-file-backed price store.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{MemoryPriceStore, PriceStore, PriceWriter};
use crate::types::{DateWindow, PriceRecord};
use crate::Result;

/// Price store that keeps records in memory and persists them to a JSON file.
#[derive(Debug)]
pub struct JsonPriceStore {
    /// Path to the store JSON file
    path: PathBuf,
    /// In-memory records
    inner: MemoryPriceStore,
}

impl JsonPriceStore {
    /// Open the store at `path`, loading existing records if the file exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let inner = Self::load_from_path(&path)?;
        debug!(path = %path.display(), records = inner.len(), "Opened price store");
        Ok(Self { path, inner })
    }

    /// Create an in-memory store (no persistence).
    pub fn in_memory() -> Self {
        Self {
            path: PathBuf::new(),
            inner: MemoryPriceStore::new(),
        }
    }

    /// Get the default store file path.
    ///
    /// Default path: `~/.ockean/prices.json`
    /// Can be overridden with `OCKEAN_STORE_FILE` environment variable.
    pub fn default_path() -> PathBuf {
        if let Ok(path) = env::var("OCKEAN_STORE_FILE") {
            return PathBuf::from(path);
        }

        directories::BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(".ockean/prices.json"))
            .unwrap_or_else(|| PathBuf::from("prices.json"))
    }

    /// Get the current path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_from_path(path: &Path) -> Result<MemoryPriceStore> {
        if !path.exists() {
            return Ok(MemoryPriceStore::new());
        }

        let content = fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(MemoryPriceStore::new());
        }
        let records: Vec<PriceRecord> = serde_json::from_str(&content)?;
        Ok(records.into_iter().collect())
    }

    /// Save all records to disk.
    pub fn save(&self) -> Result<()> {
        // Skip if in-memory only
        if self.path.as_os_str().is_empty() {
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let records: Vec<&PriceRecord> = self.inner.records().collect();
        let content = serde_json::to_string_pretty(&records)?;
        fs::write(&self.path, content)?;
        debug!(path = %self.path.display(), records = records.len(), "Saved price store");
        Ok(())
    }

    /// Reload records from disk, discarding unsaved changes.
    pub fn reload(&mut self) -> Result<()> {
        self.inner = Self::load_from_path(&self.path)?;
        Ok(())
    }

    /// Insert or replace records; see [`MemoryPriceStore::upsert`].
    pub fn upsert<I>(&mut self, records: I) -> usize
    where
        I: IntoIterator<Item = PriceRecord>,
    {
        self.inner.upsert(records)
    }

    /// Borrow the in-memory records.
    pub fn records(&self) -> &MemoryPriceStore {
        &self.inner
    }
}

impl PriceStore for JsonPriceStore {
    fn fetch(&self, tickers: Option<&[String]>, window: &DateWindow) -> Result<Vec<PriceRecord>> {
        self.inner.fetch(tickers, window)
    }
}

impl PriceWriter for JsonPriceStore {
    fn upsert_records(&mut self, records: Vec<PriceRecord>) -> usize {
        self.upsert(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    #[test]
    fn test_missing_file_opens_empty() {
        let dir = tempdir().unwrap();
        let store = JsonPriceStore::open(dir.path().join("nope.json")).unwrap();
        assert!(store.records().is_empty());
    }

    #[test]
    fn test_persistence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/prices.json");

        // Create and save
        {
            let mut store = JsonPriceStore::open(&path).unwrap();
            let changed = store.upsert(vec![
                PriceRecord::close("AAPL", day(1), 180.0),
                PriceRecord::close("MSFT", day(1), 410.0),
            ]);
            assert_eq!(changed, 2);
            store.save().unwrap();
        }

        // Reload and verify
        {
            let store = JsonPriceStore::open(&path).unwrap();
            assert_eq!(store.records().len(), 2);
            assert_eq!(store.records().get("MSFT", day(1)).unwrap().close, Some(410.0));

            let window = DateWindow::new(day(1), day(2)).unwrap();
            assert_eq!(store.fetch(None, &window).unwrap().len(), 2);
        }
    }

    #[test]
    fn test_reload_discards_unsaved() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prices.json");

        let mut store = JsonPriceStore::open(&path).unwrap();
        store.upsert(vec![PriceRecord::close("AAPL", day(1), 180.0)]);
        store.save().unwrap();

        store.upsert(vec![PriceRecord::close("AAPL", day(2), 181.0)]);
        assert_eq!(store.records().len(), 2);

        store.reload().unwrap();
        assert_eq!(store.records().len(), 1);
    }

    #[test]
    fn test_in_memory_save_is_noop() {
        let mut store = JsonPriceStore::in_memory();
        store.upsert(vec![PriceRecord::close("AAPL", day(1), 180.0)]);
        assert!(store.save().is_ok());
        assert!(store.path().as_os_str().is_empty());
    }
}
