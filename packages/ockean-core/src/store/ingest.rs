//! Bulk ingestion of per-ticker OHLCV CSV files into a price store.

use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::PriceWriter;
use crate::types::{DateWindow, PriceRecord};
use crate::Result;

/// Outcome of [`ingest_many`].
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct IngestSummary {
    /// Tickers whose file was found and read
    pub tickers: usize,
    /// Records inserted or modified in the store
    pub changed: usize,
    /// Tickers with no data file
    pub missing: Vec<String>,
}

/// Read a tickers file: one symbol per line, blank lines and `#` comments skipped.
pub fn read_tickers_file(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| line.to_uppercase())
        .collect())
}

/// Column positions resolved from a CSV header row.
#[derive(Debug, Default)]
struct Columns {
    date: Option<usize>,
    open: Option<usize>,
    high: Option<usize>,
    low: Option<usize>,
    close: Option<usize>,
    adj_close: Option<usize>,
    volume: Option<usize>,
}

impl Columns {
    fn resolve(headers: &csv::StringRecord) -> Self {
        let mut cols = Columns::default();
        for (idx, header) in headers.iter().enumerate() {
            let key: String = header
                .chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .collect::<String>()
                .to_ascii_lowercase();
            let slot = match key.as_str() {
                "date" | "datetime" | "timestamp" => &mut cols.date,
                "open" => &mut cols.open,
                "high" => &mut cols.high,
                "low" => &mut cols.low,
                "close" => &mut cols.close,
                "adjclose" => &mut cols.adj_close,
                "volume" => &mut cols.volume,
                _ => continue,
            };
            slot.get_or_insert(idx);
        }
        cols
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    // Accept plain dates and timestamps like "2024-01-02 00:00:00"
    let raw = raw.trim();
    let head = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

fn parse_number(record: &csv::StringRecord, col: Option<usize>) -> Option<f64> {
    col.and_then(|i| record.get(i))
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

/// Parse an OHLCV CSV file into records for `ticker`.
///
/// Headers are matched case-insensitively ignoring spaces and underscores, so
/// both `Adj Close` and `adj_close` work. Rows with an unparsable date are
/// skipped; empty or non-numeric cells become missing values.
pub fn read_ohlcv_csv(path: &Path, ticker: &str) -> Result<Vec<PriceRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)?;
    let cols = Columns::resolve(reader.headers()?);
    let ticker = ticker.trim().to_uppercase();

    let mut records = Vec::new();
    let mut skipped = 0usize;
    for row in reader.records() {
        let row = row?;
        let Some(date) = cols.date.and_then(|i| row.get(i)).and_then(parse_date) else {
            skipped += 1;
            continue;
        };
        let close = parse_number(&row, cols.close);
        records.push(PriceRecord {
            ticker: ticker.clone(),
            date,
            open: parse_number(&row, cols.open),
            high: parse_number(&row, cols.high),
            low: parse_number(&row, cols.low),
            close,
            adj_close: parse_number(&row, cols.adj_close).or(close),
            volume: parse_number(&row, cols.volume)
                .filter(|v| *v >= 0.0)
                .map(|v| v.round() as u64),
        });
    }

    if skipped > 0 {
        warn!(ticker = %ticker, skipped, "Skipped rows with unparsable dates");
    }
    Ok(records)
}

/// Ingest `<data_dir>/<SYMBOL>.csv` for every symbol, keeping rows inside `window`.
pub fn ingest_many<W: PriceWriter>(
    store: &mut W,
    symbols: &[String],
    data_dir: &Path,
    window: &DateWindow,
) -> Result<IngestSummary> {
    let mut summary = IngestSummary::default();

    for symbol in symbols {
        let symbol = symbol.trim().to_uppercase();
        if symbol.is_empty() {
            continue;
        }

        let path = data_dir.join(format!("{}.csv", symbol));
        if !path.exists() {
            warn!(ticker = %symbol, path = %path.display(), "No data file for ticker");
            summary.missing.push(symbol);
            continue;
        }

        let rows: Vec<PriceRecord> = read_ohlcv_csv(&path, &symbol)?
            .into_iter()
            .filter(|r| window.contains(r.date))
            .collect();
        let changed = store.upsert_records(rows);
        debug!(ticker = %symbol, changed, "Ingested ticker");

        summary.tickers += 1;
        summary.changed += changed;
    }

    info!(
        tickers = summary.tickers,
        changed = summary.changed,
        missing = summary.missing.len(),
        "Ingestion complete"
    );
    Ok(summary)
}
