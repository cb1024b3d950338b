//! In-memory keyed price store.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use super::{normalize_tickers, PriceStore, PriceWriter};
use crate::types::{DateWindow, PriceRecord};
use crate::Result;

/// Price records keyed by `(ticker, date)`.
#[derive(Debug, Clone, Default)]
pub struct MemoryPriceStore {
    records: BTreeMap<(String, NaiveDate), PriceRecord>,
}

impl MemoryPriceStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace records by key.
    ///
    /// Returns the number of records inserted or modified. Re-upserting an
    /// identical record counts as zero, so repeated ingestion is idempotent.
    pub fn upsert<I>(&mut self, records: I) -> usize
    where
        I: IntoIterator<Item = PriceRecord>,
    {
        let mut changed = 0;
        for mut record in records {
            record.ticker = record.ticker.trim().to_uppercase();
            let key = record.key();
            match self.records.get(&key) {
                Some(existing) if *existing == record => {}
                _ => {
                    self.records.insert(key, record);
                    changed += 1;
                }
            }
        }
        changed
    }

    /// Look up a single record.
    pub fn get(&self, ticker: &str, date: NaiveDate) -> Option<&PriceRecord> {
        self.records.get(&(ticker.to_uppercase(), date))
    }

    /// All distinct tickers, ascending.
    pub fn tickers(&self) -> Vec<String> {
        let mut tickers: Vec<String> = self.records.keys().map(|(t, _)| t.clone()).collect();
        tickers.dedup();
        tickers
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate all records in key order.
    pub fn records(&self) -> impl Iterator<Item = &PriceRecord> {
        self.records.values()
    }
}

impl PriceStore for MemoryPriceStore {
    fn fetch(&self, tickers: Option<&[String]>, window: &DateWindow) -> Result<Vec<PriceRecord>> {
        let filter = normalize_tickers(tickers);
        let rows = self
            .records
            .values()
            .filter(|r| window.contains(r.date))
            .filter(|r| match &filter {
                Some(symbols) => symbols.binary_search(&r.ticker).is_ok(),
                None => true,
            })
            .cloned()
            .collect();
        Ok(rows)
    }
}

impl FromIterator<PriceRecord> for MemoryPriceStore {
    fn from_iter<I: IntoIterator<Item = PriceRecord>>(iter: I) -> Self {
        let mut store = Self::new();
        store.upsert(iter);
        store
    }
}

impl PriceWriter for MemoryPriceStore {
    fn upsert_records(&mut self, records: Vec<PriceRecord>) -> usize {
        self.upsert(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn sample_store() -> MemoryPriceStore {
        vec![
            PriceRecord::close("AAPL", day(1), 100.0),
            PriceRecord::close("AAPL", day(4), 101.0),
            PriceRecord::close("MSFT", day(1), 400.0),
            PriceRecord::close("MSFT", day(5), 402.0),
            PriceRecord::close("XOM", day(4), 110.0),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_upsert_counts_inserts_and_modifications() {
        let mut store = MemoryPriceStore::new();
        let changed = store.upsert(vec![
            PriceRecord::close("aapl", day(1), 100.0),
            PriceRecord::close("AAPL", day(4), 101.0),
        ]);
        assert_eq!(changed, 2);
        assert_eq!(store.len(), 2);

        // Identical re-upsert is a no-op
        let changed = store.upsert(vec![PriceRecord::close("AAPL", day(1), 100.0)]);
        assert_eq!(changed, 0);

        // A different close modifies in place
        let changed = store.upsert(vec![PriceRecord::close("AAPL", day(1), 99.5)]);
        assert_eq!(changed, 1);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get("aapl", day(1)).unwrap().close, Some(99.5));
    }

    #[test]
    fn test_fetch_is_end_exclusive() {
        let store = sample_store();
        let window = DateWindow::new(day(1), day(5)).unwrap();
        let rows = store.fetch(None, &window).unwrap();

        assert_eq!(rows.len(), 4);
        assert!(rows.iter().all(|r| r.date < day(5)));
    }

    #[test]
    fn test_fetch_ticker_subset_case_insensitive() {
        let store = sample_store();
        let window = DateWindow::new(day(1), day(10)).unwrap();
        let subset = vec!["msft".to_string(), "XOM".to_string(), "NONE".to_string()];
        let rows = store.fetch(Some(subset.as_slice()), &window).unwrap();

        let tickers: Vec<&str> = rows.iter().map(|r| r.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["MSFT", "MSFT", "XOM"]);
    }

    #[test]
    fn test_fetch_empty_subset_selects_all() {
        let store = sample_store();
        let window = DateWindow::new(day(1), day(10)).unwrap();
        let empty: Vec<String> = Vec::new();
        let rows = store.fetch(Some(empty.as_slice()), &window).unwrap();
        assert_eq!(rows.len(), 5);
    }

    #[test]
    fn test_tickers_sorted_unique() {
        let store = sample_store();
        assert_eq!(store.tickers(), vec!["AAPL", "MSFT", "XOM"]);
    }
}
