//! Silhouette coefficients and k-range scans.

use std::ops::RangeInclusive;

use ndarray::{Array1, Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::kmeans::{cluster_with, ClusterParams};
use super::{check_entities, squared_distance};
use crate::data::FeatureMatrix;
use crate::{Error, Result};

/// Effective k window after capping against the number of entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KRange {
    pub k_min: usize,
    pub k_max: usize,
    /// Number of entities the window was capped against
    pub n: usize,
}

impl KRange {
    /// Floor `k_min` to 2 and cap `k_max` to `n - 1`.
    ///
    /// Fails with `InvalidRange` when the window is empty after capping.
    pub fn capped(k_min: usize, k_max: usize, n: usize) -> Result<Self> {
        let k_min = k_min.max(2);
        let k_max = k_max.min(n.saturating_sub(1));
        if k_min > k_max {
            return Err(Error::InvalidRange { k_min, k_max, n });
        }
        Ok(Self { k_min, k_max, n })
    }

    pub fn iter(&self) -> RangeInclusive<usize> {
        self.k_min..=self.k_max
    }

    pub fn len(&self) -> usize {
        self.k_max - self.k_min + 1
    }

    /// Always false; an empty window fails construction.
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// One `(k, silhouette)` output row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SilhouetteRow {
    pub k: usize,
    pub silhouette: f64,
}

/// Mean silhouette for every k in a capped window, ascending by k.
#[derive(Debug, Clone, PartialEq)]
pub struct SilhouetteScan {
    range: KRange,
    rows: Vec<SilhouetteRow>,
}

impl SilhouetteScan {
    pub fn range(&self) -> KRange {
        self.range
    }

    pub fn rows(&self) -> &[SilhouetteRow] {
        &self.rows
    }

    /// Row with the highest silhouette; ties go to the smaller k.
    pub fn best(&self) -> Option<&SilhouetteRow> {
        self.rows.iter().fold(None, |best, row| match best {
            Some(b) if b.silhouette >= row.silhouette => Some(b),
            _ => Some(row),
        })
    }
}

/// Euclidean distance between every pair of rows.
pub fn pairwise_distances(data: ArrayView2<'_, f64>) -> Array2<f64> {
    let n = data.nrows();
    let mut distances = Array2::zeros((n, n));
    for i in 0..n {
        for j in (i + 1)..n {
            let d = squared_distance(data.row(i), data.row(j)).sqrt();
            distances[[i, j]] = d;
            distances[[j, i]] = d;
        }
    }
    distances
}

/// Silhouette coefficient of every entity.
///
/// `a(i)` is the mean distance to the other members of its cluster, `b(i)` the
/// lowest mean distance to the members of any other cluster, and
/// `s(i) = (b - a) / max(a, b)`. Entities in singleton clusters score 0.
pub fn silhouette_samples(
    distances: ArrayView2<'_, f64>,
    labels: &[usize],
    k: usize,
) -> Array1<f64> {
    let n = labels.len();
    let mut counts = vec![0usize; k];
    for &label in labels {
        counts[label] += 1;
    }

    Array1::from_shape_fn(n, |i| {
        let own = labels[i];
        if counts[own] <= 1 {
            return 0.0;
        }

        let mut sums = vec![0.0; k];
        for (j, &label) in labels.iter().enumerate() {
            if j != i {
                sums[label] += distances[[i, j]];
            }
        }

        let a = sums[own] / (counts[own] - 1) as f64;
        let b = (0..k)
            .filter(|&c| c != own && counts[c] > 0)
            .map(|c| sums[c] / counts[c] as f64)
            .fold(f64::INFINITY, f64::min);

        let scale = a.max(b);
        if !b.is_finite() || scale <= 0.0 {
            0.0
        } else {
            (b - a) / scale
        }
    })
}

/// Mean silhouette coefficient over all entities.
pub fn silhouette_score(distances: ArrayView2<'_, f64>, labels: &[usize], k: usize) -> f64 {
    silhouette_samples(distances, labels, k)
        .mean()
        .unwrap_or(0.0)
}

/// Cluster for every k in `[k_min, k_max]` (after capping) and score each.
///
/// # Errors
///
/// `InvalidRange` when the capped window is empty.
pub fn scan(
    features: &FeatureMatrix,
    k_min: usize,
    k_max: usize,
    restarts: usize,
    seed: u64,
) -> Result<SilhouetteScan> {
    scan_with(features, k_min, k_max, &ClusterParams::new(restarts, seed))
}

/// [`scan`] with explicit clustering parameters.
pub fn scan_with(
    features: &FeatureMatrix,
    k_min: usize,
    k_max: usize,
    params: &ClusterParams,
) -> Result<SilhouetteScan> {
    let n = features.n_entities();
    check_entities(n)?;
    let range = KRange::capped(k_min, k_max, n)?;
    if range.k_min != k_min || range.k_max != k_max {
        debug!(
            requested_min = k_min,
            requested_max = k_max,
            k_min = range.k_min,
            k_max = range.k_max,
            n,
            "Capped k range"
        );
    }

    let distances = pairwise_distances(features.values().view());
    let rows = range
        .iter()
        .map(|k| {
            let assignment = cluster_with(features, k, params)?;
            let silhouette = silhouette_score(distances.view(), assignment.labels(), k);
            debug!(k, silhouette, "Scored k");
            Ok(SilhouetteRow { k, silhouette })
        })
        .collect::<Result<Vec<_>>>()?;

    let scan = SilhouetteScan { range, rows };
    if let Some(best) = scan.best() {
        info!(k = best.k, silhouette = best.silhouette, "Silhouette scan complete");
    }
    Ok(scan)
}
