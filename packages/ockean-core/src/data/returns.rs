//! Log-return transform.

use chrono::NaiveDate;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use tracing::debug;

use super::PricePanel;
use crate::{Error, Result};

/// Log returns `ln(p_t) - ln(p_{t-1})` for every `t` after the first.
///
/// The output has one element fewer than the input. Non-positive or
/// non-finite prices yield `NaN` for every return that touches them.
///
/// # Example
///
/// ```rust
/// use ndarray::array;
/// use ockean_core::log_returns;
///
/// let r = log_returns(array![100.0, 110.0, 0.0, 121.0].view());
/// assert_eq!(r.len(), 3);
/// assert!((r[0] - (1.1f64).ln()).abs() < 1e-12);
/// assert!(r[1].is_nan() && r[2].is_nan());
/// ```
pub fn log_returns(prices: ArrayView1<'_, f64>) -> Array1<f64> {
    let logs = prices.mapv(|p| if p.is_finite() && p > 0.0 { p.ln() } else { f64::NAN });
    if logs.len() < 2 {
        return Array1::zeros(0);
    }
    let n = logs.len();
    Array1::from_shape_fn(n - 1, |t| logs[t + 1] - logs[t])
}

/// Dense log-return matrix (periods × tickers).
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnMatrix {
    dates: Vec<NaiveDate>,
    tickers: Vec<String>,
    returns: Array2<f64>,
}

impl ReturnMatrix {
    /// Derive returns from every panel column, then drop unusable data.
    ///
    /// Columns without a single computable return are dropped first; any
    /// remaining row containing a gap is then dropped, so the result holds no
    /// missing values.
    pub fn from_panel(panel: &PricePanel) -> Result<Self> {
        if panel.is_empty() {
            return Err(Error::EmptyPanel(
                "no prices loaded for the given window/tickers".to_string(),
            ));
        }

        let closes = panel.closes();
        let periods = panel.n_dates().saturating_sub(1);
        let mut raw = Array2::from_elem((periods, panel.n_tickers()), f64::NAN);
        for (j, column) in closes.axis_iter(Axis(1)).enumerate() {
            raw.column_mut(j).assign(&log_returns(column));
        }

        let keep_cols: Vec<usize> = (0..raw.ncols())
            .filter(|&j| raw.column(j).iter().any(|r| r.is_finite()))
            .collect();
        let keep_rows: Vec<usize> = (0..raw.nrows())
            .filter(|&i| keep_cols.iter().all(|&j| raw[[i, j]].is_finite()))
            .collect();

        let returns = raw
            .select(Axis(1), &keep_cols)
            .select(Axis(0), &keep_rows);
        let tickers: Vec<String> = keep_cols
            .iter()
            .map(|&j| panel.tickers()[j].clone())
            .collect();
        // Return t spans dates t and t + 1 and is stamped with the later one
        let dates: Vec<NaiveDate> = keep_rows.iter().map(|&i| panel.dates()[i + 1]).collect();

        debug!(
            periods = returns.nrows(),
            tickers = returns.ncols(),
            dropped_tickers = panel.n_tickers() - tickers.len(),
            dropped_periods = periods - dates.len(),
            "Computed log returns"
        );

        Ok(Self {
            dates,
            tickers,
            returns,
        })
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    /// Return values (periods × tickers), fully dense.
    pub fn values(&self) -> &Array2<f64> {
        &self.returns
    }

    pub fn n_periods(&self) -> usize {
        self.returns.nrows()
    }

    pub fn n_tickers(&self) -> usize {
        self.returns.ncols()
    }
}
