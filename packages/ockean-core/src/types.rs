//! Core data types shared by the store, the pipeline and the CLI.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A single daily OHLCV record for one ticker.
///
/// Records are keyed by `(ticker, date)`; a store never holds two records
/// with the same key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceRecord {
    /// Ticker symbol (uppercase)
    pub ticker: String,
    /// Trading date
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low: Option<f64>,
    /// Closing price, the only field the clustering pipeline reads
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adj_close: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<u64>,
}

impl PriceRecord {
    /// Create a close-only record.
    pub fn close(ticker: &str, date: NaiveDate, close: f64) -> Self {
        Self {
            ticker: ticker.to_uppercase(),
            date,
            open: None,
            high: None,
            low: None,
            close: Some(close),
            adj_close: None,
            volume: None,
        }
    }

    /// The store key of this record.
    pub fn key(&self) -> (String, NaiveDate) {
        (self.ticker.clone(), self.date)
    }

    /// Closing price if it is usable for return computation.
    pub fn usable_close(&self) -> Option<f64> {
        self.close.filter(|c| c.is_finite())
    }
}

/// Half-open date range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    /// Create a window; `start` must come strictly before `end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start >= end {
            return Err(Error::InvalidArgument(format!(
                "date window start {} must be before end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// Parse a window from `YYYY-MM-DD` strings.
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        let start = NaiveDate::parse_from_str(start.trim(), "%Y-%m-%d")?;
        let end = NaiveDate::parse_from_str(end.trim(), "%Y-%m-%d")?;
        Self::new(start, end)
    }

    /// Whether `date` falls inside the window.
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date < self.end
    }
}

/// API response wrapper used for CLI output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Create a successful response.
    pub fn ok(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    /// Create an error response.
    pub fn err(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(error.into()),
        }
    }
}
