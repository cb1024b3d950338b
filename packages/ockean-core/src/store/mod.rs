//! Price record storage.
//!
//! The clustering pipeline only needs a narrow query seam ([`PriceStore`]);
//! the stores here add keyed upsert and JSON persistence on top of it.

mod ingest;
mod json;
mod memory;

pub use ingest::{ingest_many, read_ohlcv_csv, read_tickers_file, IngestSummary};
pub use json::JsonPriceStore;
pub use memory::MemoryPriceStore;

use crate::types::{DateWindow, PriceRecord};
use crate::Result;

/// Point-in-time price store queried by ticker and date range.
pub trait PriceStore {
    /// Fetch records inside `window` (end-exclusive), ordered by `(ticker, date)`.
    ///
    /// `None` or an empty slice selects every ticker. Symbols are matched
    /// case-insensitively.
    fn fetch(&self, tickers: Option<&[String]>, window: &DateWindow) -> Result<Vec<PriceRecord>>;
}

/// Store that accepts keyed upserts.
pub trait PriceWriter {
    /// Insert or replace records by `(ticker, date)`, returning how many changed.
    fn upsert_records(&mut self, records: Vec<PriceRecord>) -> usize;
}

/// Normalize an optional ticker filter to uppercase symbols.
pub(crate) fn normalize_tickers(tickers: Option<&[String]>) -> Option<Vec<String>> {
    match tickers {
        Some(list) if !list.is_empty() => {
            let mut symbols: Vec<String> = list.iter().map(|t| t.trim().to_uppercase()).collect();
            symbols.sort();
            symbols.dedup();
            Some(symbols)
        }
        _ => None,
    }
}
