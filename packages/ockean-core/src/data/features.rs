//! Row-wise standardized clustering features.

use ndarray::{Array2, ArrayView1, ArrayView2};
use tracing::debug;

use super::ReturnMatrix;
use crate::{Error, Result};

/// Added to each row's standard deviation before dividing.
///
/// Keeps constant series finite (they standardize to all zeros) while being
/// negligible next to the variance of any real return series.
pub const STD_EPSILON: f64 = 1e-9;

/// Minimum number of tickers needed to form at least two clusters.
pub const MIN_ENTITIES: usize = 3;

/// Standardize each row: `(row - mean) / (std + STD_EPSILON)`.
///
/// `std` is the population standard deviation (divisor `n`). The result is
/// always in standard (row-major) layout, even for a transposed input view.
pub fn standardize_rows(data: ArrayView2<'_, f64>) -> Array2<f64> {
    let mut out = data.as_standard_layout().into_owned();
    let n = out.ncols();
    if n == 0 {
        return out;
    }

    for mut row in out.rows_mut() {
        let mean = row.sum() / n as f64;
        let variance = row.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n as f64;
        let denom = variance.sqrt() + STD_EPSILON;
        row.mapv_inplace(|x| (x - mean) / denom);
    }
    out
}

/// Standardized return vectors, one row per ticker.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    tickers: Vec<String>,
    values: Array2<f64>,
}

impl FeatureMatrix {
    /// Transpose a return matrix and standardize each ticker's series.
    pub fn from_returns(returns: &ReturnMatrix) -> Result<Self> {
        let features = Self::from_rows(returns.tickers().to_vec(), returns.values().t())?;
        debug!(
            tickers = features.n_entities(),
            steps = features.n_steps(),
            "Standardized return features"
        );
        Ok(features)
    }

    /// Standardize raw rows (entities × time steps) labelled by `tickers`.
    pub fn from_rows(tickers: Vec<String>, rows: ArrayView2<'_, f64>) -> Result<Self> {
        if tickers.len() != rows.nrows() {
            return Err(Error::InvalidArgument(format!(
                "{} tickers for {} feature rows",
                tickers.len(),
                rows.nrows()
            )));
        }
        if rows.nrows() < MIN_ENTITIES {
            return Err(Error::InsufficientData(format!(
                "Need at least {} tickers after cleaning; got {}",
                MIN_ENTITIES,
                rows.nrows()
            )));
        }
        if rows.ncols() < 2 {
            return Err(Error::InsufficientData(format!(
                "Need at least 2 return observations per ticker; got {}",
                rows.ncols()
            )));
        }
        if rows.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidArgument(
                "feature rows must not contain missing values".to_string(),
            ));
        }

        Ok(Self {
            tickers,
            values: standardize_rows(rows),
        })
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    /// Standardized values (entities × time steps).
    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    /// Feature vector of one entity.
    pub fn row(&self, idx: usize) -> ArrayView1<'_, f64> {
        self.values.row(idx)
    }

    pub fn n_entities(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_steps(&self) -> usize {
        self.values.ncols()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Axis};

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("T{}", i)).collect()
    }

    #[test]
    fn test_standardize_rows_moments() {
        let data = array![
            [0.01, -0.02, 0.03, 0.005, -0.01],
            [1.0, 2.0, 3.0, 4.0, 5.0],
            [-300.0, 120.0, 55.0, 0.0, 7.5],
        ];
        let z = standardize_rows(data.view());

        for row in z.axis_iter(Axis(0)) {
            let mean = row.sum() / row.len() as f64;
            let std = row.std(0.0);
            assert_abs_diff_eq!(mean, 0.0, epsilon = 1e-12);
            assert_abs_diff_eq!(std, 1.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_standardize_constant_row_is_zero() {
        let data = array![[0.5, 0.5, 0.5, 0.5]];
        let z = standardize_rows(data.view());
        assert!(z.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_standardize_is_scale_invariant() {
        let a = array![[0.01, -0.02, 0.015, 0.0]];
        let b = &a * 40.0;
        let za = standardize_rows(a.view());
        let zb = standardize_rows(b.view());
        for (x, y) in za.iter().zip(zb.iter()) {
            assert_abs_diff_eq!(*x, *y, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_from_rows_requires_three_tickers() {
        let rows = array![[0.1, 0.2, 0.3], [0.3, 0.1, 0.2]];
        let result = FeatureMatrix::from_rows(names(2), rows.view());
        assert!(matches!(result, Err(Error::InsufficientData(_))));
    }

    #[test]
    fn test_from_rows_requires_two_steps() {
        let rows = array![[0.1], [0.2], [0.3]];
        let result = FeatureMatrix::from_rows(names(3), rows.view());
        assert!(matches!(result, Err(Error::InsufficientData(_))));
    }

    #[test]
    fn test_from_rows_rejects_label_mismatch() {
        let rows = array![[0.1, 0.2], [0.2, 0.1], [0.3, 0.3]];
        let result = FeatureMatrix::from_rows(names(4), rows.view());
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_transposed_input_stored_row_major() {
        let steps_by_tickers = array![
            [0.01, -0.02, 0.005, 0.0],
            [-0.01, 0.03, 0.002, 0.01],
            [0.02, 0.01, -0.004, -0.02],
            [0.00, -0.01, 0.001, 0.03],
            [0.01, 0.02, -0.003, 0.00],
        ];
        let features = FeatureMatrix::from_rows(names(4), steps_by_tickers.t()).unwrap();

        assert!(features.values().is_standard_layout());
        assert_eq!(features.values().dim(), (4, 5));
        let direct = standardize_rows(steps_by_tickers.t().to_owned().view());
        for (x, y) in features.values().iter().zip(direct.iter()) {
            assert_abs_diff_eq!(*x, *y, epsilon = 1e-15);
        }
    }

    #[test]
    fn test_from_rows_preserves_order() {
        let rows = array![[0.1, 0.2, 0.4], [0.2, 0.1, 0.0], [0.3, 0.3, 0.1]];
        let features = FeatureMatrix::from_rows(names(3), rows.view()).unwrap();

        assert_eq!(features.tickers(), names(3).as_slice());
        assert_eq!(features.n_entities(), 3);
        assert_eq!(features.n_steps(), 3);
        // Row 0 rises over time, so its last standardized value is its largest
        let last = features.row(0)[2];
        assert!(features.row(0).iter().all(|v| *v <= last));
    }
}
