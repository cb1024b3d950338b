//! Report tables: return correlations, cluster sizes and CSV writers.
//!
//! Every writer creates missing parent directories and overwrites the target
//! file.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::clustering::{ClusterAssignment, ClusterRow, SilhouetteRow};
use crate::data::ReturnMatrix;
use crate::Result;

/// Pearson correlation of every ticker pair's returns.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationMatrix {
    tickers: Vec<String>,
    values: Array2<f64>,
}

impl CorrelationMatrix {
    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    /// Symmetric tickers × tickers matrix.
    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    /// Correlation between two tickers by name.
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.tickers.iter().position(|t| t == a)?;
        let j = self.tickers.iter().position(|t| t == b)?;
        Some(self.values[[i, j]])
    }
}

/// Correlate every pair of return columns.
///
/// Pairs involving a constant series have no defined correlation and are
/// reported as 0, including that series' own diagonal entry.
pub fn correlation_matrix(returns: &ReturnMatrix) -> CorrelationMatrix {
    let values = returns.values();
    let n = values.ncols();
    let periods = values.nrows().max(1) as f64;

    let means = values.sum_axis(Axis(0)) / periods;
    let centered = values - &means;
    let norms: Vec<f64> = centered
        .axis_iter(Axis(1))
        .map(|col| col.dot(&col).sqrt())
        .collect();

    let mut corr = Array2::zeros((n, n));
    for i in 0..n {
        for j in i..n {
            let denom = norms[i] * norms[j];
            let r = if denom > 0.0 {
                let dot = centered.column(i).dot(&centered.column(j));
                (dot / denom).clamp(-1.0, 1.0)
            } else {
                0.0
            };
            corr[[i, j]] = r;
            corr[[j, i]] = r;
        }
    }

    debug!(tickers = n, periods = values.nrows(), "Computed return correlations");
    CorrelationMatrix {
        tickers: returns.tickers().to_vec(),
        values: corr,
    }
}

/// Number of tickers in one cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSize {
    pub cluster: usize,
    pub n_tickers: usize,
}

/// Cluster sizes, ascending by cluster label.
pub fn cluster_sizes(assignment: &ClusterAssignment) -> Vec<ClusterSize> {
    sizes_from_labels(assignment.labels().iter().copied())
}

/// Cluster sizes for rows read back from an assignment table.
pub fn cluster_sizes_from_rows(rows: &[ClusterRow]) -> Vec<ClusterSize> {
    sizes_from_labels(rows.iter().map(|r| r.cluster))
}

fn sizes_from_labels(labels: impl Iterator<Item = usize>) -> Vec<ClusterSize> {
    let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
    for label in labels {
        *counts.entry(label).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|(cluster, n_tickers)| ClusterSize { cluster, n_tickers })
        .collect()
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn write_rows<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    create_parent(path)?;
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    info!(path = %path.display(), rows = rows.len(), "Wrote table");
    Ok(())
}

/// Write `ticker,cluster` rows sorted by `(cluster, ticker)`.
pub fn write_assignment_csv(path: &Path, assignment: &ClusterAssignment) -> Result<()> {
    write_rows(path, &assignment.rows())
}

/// Read `ticker,cluster` rows written by [`write_assignment_csv`].
pub fn read_assignment_csv(path: &Path) -> Result<Vec<ClusterRow>> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;
    let rows = reader
        .deserialize::<ClusterRow>()
        .collect::<std::result::Result<Vec<_>, _>>()?;
    debug!(path = %path.display(), rows = rows.len(), "Read cluster assignment");
    Ok(rows)
}

/// Write `k,silhouette` rows in ascending k.
pub fn write_scan_csv(path: &Path, rows: &[SilhouetteRow]) -> Result<()> {
    write_rows(path, rows)
}

/// Write `cluster,n_tickers` rows.
pub fn write_sizes_csv(path: &Path, sizes: &[ClusterSize]) -> Result<()> {
    write_rows(path, sizes)
}

/// Write the correlation matrix with a leading `ticker` column and one column
/// per ticker.
pub fn write_correlation_csv(path: &Path, corr: &CorrelationMatrix) -> Result<()> {
    create_parent(path)?;
    let mut writer = csv::Writer::from_path(path)?;

    let mut header = Vec::with_capacity(corr.tickers.len() + 1);
    header.push("ticker".to_string());
    header.extend(corr.tickers.iter().cloned());
    writer.write_record(&header)?;

    for (ticker, row) in corr.tickers.iter().zip(corr.values.axis_iter(Axis(0))) {
        let mut record = Vec::with_capacity(row.len() + 1);
        record.push(ticker.clone());
        record.extend(row.iter().map(|v| format!("{:.6}", v)));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    info!(path = %path.display(), tickers = corr.tickers.len(), "Wrote correlation matrix");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clustering::cluster;
    use crate::clustering::test_support::grouped_features;
    use crate::data::PricePanel;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;
    use ndarray::Array2;
    use tempfile::TempDir;

    fn returns_from(closes: Array2<f64>, tickers: &[&str]) -> ReturnMatrix {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let dates = (0..closes.nrows() as u64)
            .map(|d| start + chrono::Days::new(d))
            .collect();
        let tickers = tickers.iter().map(|t| t.to_string()).collect();
        let panel = PricePanel::new(dates, tickers, closes).unwrap();
        ReturnMatrix::from_panel(&panel).unwrap()
    }

    fn sample_returns() -> ReturnMatrix {
        // A and B move together, C moves against them, D is flat
        let closes = Array2::from_shape_fn((30, 4), |(t, j)| {
            let wave = (t as f64 * 0.7).sin() * 0.02;
            match j {
                0 => 100.0 * (1.0 + wave),
                1 => 50.0 * (1.0 + 1.5 * wave),
                2 => 80.0 * (1.0 - wave),
                _ => 20.0,
            }
        });
        returns_from(closes, &["A", "B", "C", "D"])
    }

    #[test]
    fn test_correlation_matrix_properties() {
        let corr = correlation_matrix(&sample_returns());
        let v = corr.values();

        assert_relative_eq!(v[[0, 0]], 1.0, epsilon = 1e-12);
        assert_relative_eq!(v[[2, 2]], 1.0, epsilon = 1e-12);
        for i in 0..4 {
            for j in 0..4 {
                assert_relative_eq!(v[[i, j]], v[[j, i]]);
            }
        }
        assert!(corr.get("A", "B").unwrap() > 0.9);
        assert!(corr.get("A", "C").unwrap() < -0.9);
    }

    #[test]
    fn test_constant_series_correlates_zero() {
        let corr = correlation_matrix(&sample_returns());
        assert_eq!(corr.get("D", "A"), Some(0.0));
        assert_eq!(corr.get("D", "D"), Some(0.0));
        assert_eq!(corr.get("D", "ZZZ"), None);
    }

    #[test]
    fn test_cluster_sizes_sum_to_n() {
        let groups = [0, 0, 1, 1, 1, 2];
        let features = grouped_features(&groups, 40);
        let assignment = cluster(&features, 3, 10, 42).unwrap();
        let sizes = cluster_sizes(&assignment);

        assert_eq!(sizes.len(), 3);
        assert_eq!(sizes.iter().map(|s| s.n_tickers).sum::<usize>(), groups.len());
        assert!(sizes.windows(2).all(|w| w[0].cluster < w[1].cluster));
    }

    #[test]
    fn test_assignment_csv_round_trip_feeds_sizes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/clusters.csv");

        let features = grouped_features(&[0, 1, 0, 1, 0], 30);
        let assignment = cluster(&features, 2, 10, 42).unwrap();
        write_assignment_csv(&path, &assignment).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("ticker,cluster\n"));

        let rows = read_assignment_csv(&path).unwrap();
        assert_eq!(rows, assignment.rows());
        assert_eq!(cluster_sizes_from_rows(&rows), cluster_sizes(&assignment));
    }

    #[test]
    fn test_write_scan_and_sizes_csv() {
        let dir = TempDir::new().unwrap();
        let scan_path = dir.path().join("silhouette.csv");
        let sizes_path = dir.path().join("out/sizes.csv");

        let rows = vec![
            SilhouetteRow { k: 2, silhouette: 0.5 },
            SilhouetteRow { k: 3, silhouette: 0.25 },
        ];
        write_scan_csv(&scan_path, &rows).unwrap();
        write_sizes_csv(
            &sizes_path,
            &[
                ClusterSize { cluster: 0, n_tickers: 3 },
                ClusterSize { cluster: 1, n_tickers: 1 },
            ],
        )
        .unwrap();

        assert_eq!(
            fs::read_to_string(&scan_path).unwrap(),
            "k,silhouette\n2,0.5\n3,0.25\n"
        );
        assert_eq!(
            fs::read_to_string(&sizes_path).unwrap(),
            "cluster,n_tickers\n0,3\n1,1\n"
        );
    }

    #[test]
    fn test_write_correlation_csv_layout() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("corr.csv");
        write_correlation_csv(&path, &correlation_matrix(&sample_returns())).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "ticker,A,B,C,D");
        assert!(lines[1].starts_with("A,1.000000,"));
        assert!(lines[4].ends_with(",0.000000"));
    }
}
