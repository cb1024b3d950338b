//! Date-aligned closing price panel.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use ndarray::Array2;
use tracing::{debug, warn};

use crate::store::PriceStore;
use crate::types::DateWindow;
use crate::{Error, Result};

/// Closing prices indexed by date (rows) and ticker (columns).
///
/// Missing observations are stored as `NaN`. Dates are strictly ascending and
/// tickers are unique.
#[derive(Debug, Clone, PartialEq)]
pub struct PricePanel {
    dates: Vec<NaiveDate>,
    tickers: Vec<String>,
    closes: Array2<f64>,
}

impl PricePanel {
    /// Build a panel from its parts, checking shape and index invariants.
    pub fn new(dates: Vec<NaiveDate>, tickers: Vec<String>, closes: Array2<f64>) -> Result<Self> {
        if closes.dim() != (dates.len(), tickers.len()) {
            return Err(Error::InvalidArgument(format!(
                "panel shape {:?} does not match {} dates x {} tickers",
                closes.dim(),
                dates.len(),
                tickers.len()
            )));
        }
        if dates.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Error::InvalidArgument(
                "panel dates must be unique and ascending".to_string(),
            ));
        }
        let unique: BTreeSet<&String> = tickers.iter().collect();
        if unique.len() != tickers.len() {
            return Err(Error::InvalidArgument(
                "panel tickers must be unique".to_string(),
            ));
        }
        Ok(Self {
            dates,
            tickers,
            closes,
        })
    }

    /// A panel with no rows and no columns.
    pub fn empty() -> Self {
        Self {
            dates: Vec::new(),
            tickers: Vec::new(),
            closes: Array2::zeros((0, 0)),
        }
    }

    /// Whether the panel has no usable cells.
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty() || self.tickers.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    /// Raw close matrix (dates × tickers).
    pub fn closes(&self) -> &Array2<f64> {
        &self.closes
    }

    pub fn n_dates(&self) -> usize {
        self.dates.len()
    }

    pub fn n_tickers(&self) -> usize {
        self.tickers.len()
    }

    /// Close for one cell, `None` when absent.
    pub fn get(&self, date: NaiveDate, ticker: &str) -> Option<f64> {
        let row = self.dates.binary_search(&date).ok()?;
        let col = self.tickers.iter().position(|t| t == ticker)?;
        let value = self.closes[[row, col]];
        value.is_finite().then_some(value)
    }
}

/// Query `store` and pivot the result into a [`PricePanel`].
///
/// Records without a finite close are dropped before pivoting. When nothing
/// matches, the returned panel is empty; callers decide whether that is fatal.
pub fn build_panel<S: PriceStore + ?Sized>(
    store: &S,
    window: &DateWindow,
    tickers: Option<&[String]>,
) -> Result<PricePanel> {
    let rows = store.fetch(tickers, window)?;

    let usable: Vec<_> = rows
        .iter()
        .filter_map(|r| r.usable_close().map(|close| (r.ticker.as_str(), r.date, close)))
        .collect();
    if usable.is_empty() {
        debug!(start = %window.start, end = %window.end, "No price records in window");
        return Ok(PricePanel::empty());
    }

    let dates: Vec<NaiveDate> = usable
        .iter()
        .map(|(_, d, _)| *d)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let symbols: Vec<String> = usable
        .iter()
        .map(|(t, _, _)| t.to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let date_idx: BTreeMap<NaiveDate, usize> =
        dates.iter().enumerate().map(|(i, d)| (*d, i)).collect();
    let ticker_idx: BTreeMap<&str, usize> = symbols
        .iter()
        .enumerate()
        .map(|(i, t)| (t.as_str(), i))
        .collect();

    let mut closes = Array2::from_elem((dates.len(), symbols.len()), f64::NAN);
    for (ticker, date, close) in usable {
        let cell = &mut closes[[date_idx[&date], ticker_idx[ticker]]];
        if !cell.is_nan() {
            warn!(ticker, date = %date, "Duplicate price record; keeping the later one");
        }
        *cell = close;
    }

    debug!(
        dates = dates.len(),
        tickers = symbols.len(),
        "Built price panel"
    );
    PricePanel::new(dates, symbols, closes)
}
