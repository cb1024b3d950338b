//! Pipeline stages from stored prices to clustering features.
//!
//! - **Panel**: date-aligned closes, one column per ticker
//! - **Returns**: log returns with column/row drop rules applied
//! - **Features**: tickers × time steps, z-scored per row
//!
//! All matrices are row-major `ndarray` arrays and every stage returns a new
//! value; nothing is modified in place once built.

mod features;
mod panel;
mod returns;

pub use features::{standardize_rows, FeatureMatrix, MIN_ENTITIES, STD_EPSILON};
pub use panel::{build_panel, PricePanel};
pub use returns::{log_returns, ReturnMatrix};
