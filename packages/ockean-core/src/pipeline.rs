//! Store-to-features pipeline entry points.

use tracing::{info, warn};

use crate::data::{build_panel, FeatureMatrix, ReturnMatrix};
use crate::store::PriceStore;
use crate::types::DateWindow;
use crate::{Error, Result};

/// Load closes for `tickers` (or every ticker) inside `window` and derive
/// cleaned log returns.
///
/// # Errors
///
/// `EmptyPanel` when the store has no usable closes in the window.
pub fn compute_returns<S: PriceStore + ?Sized>(
    store: &S,
    window: &DateWindow,
    tickers: Option<&[String]>,
) -> Result<ReturnMatrix> {
    let panel = build_panel(store, window, tickers)?;
    if panel.is_empty() {
        return Err(Error::EmptyPanel(format!(
            "no prices loaded for {} to {}",
            window.start, window.end
        )));
    }

    let returns = ReturnMatrix::from_panel(&panel)?;
    if returns.n_tickers() < panel.n_tickers() {
        let dropped: Vec<&str> = panel
            .tickers()
            .iter()
            .filter(|t| !returns.tickers().contains(*t))
            .map(String::as_str)
            .collect();
        warn!(?dropped, "Dropped tickers without a single usable return");
    }

    info!(
        start = %window.start,
        end = %window.end,
        tickers = returns.n_tickers(),
        periods = returns.n_periods(),
        "Loaded returns"
    );
    Ok(returns)
}

/// Standardize each ticker's return series into a feature row.
pub fn compute_features(returns: &ReturnMatrix) -> Result<FeatureMatrix> {
    FeatureMatrix::from_returns(returns)
}
