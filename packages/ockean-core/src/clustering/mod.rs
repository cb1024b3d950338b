//! Ticker clustering.
//!
//! - **K-means**: Lloyd's algorithm with k-means++ seeding and parallel,
//!   individually seeded restarts
//! - **Silhouette**: per-entity cohesion/separation and k-range scans

mod kmeans;
mod silhouette;

pub use kmeans::{
    cluster, cluster_with, ClusterAssignment, ClusterParams, ClusterRow, DEFAULT_MAX_ITERATIONS,
    DEFAULT_RESTARTS, DEFAULT_SEED,
};
pub use silhouette::{
    pairwise_distances, scan, scan_with, silhouette_samples, silhouette_score, KRange,
    SilhouetteRow, SilhouetteScan,
};

use ndarray::ArrayView1;

use crate::data::MIN_ENTITIES;
use crate::{Error, Result};

/// Squared Euclidean distance between two feature vectors.
pub(crate) fn squared_distance(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Fail with `InsufficientData` when there are too few entities to cluster.
///
/// A [`FeatureMatrix`](crate::data::FeatureMatrix) never holds fewer than
/// `MIN_ENTITIES` rows, so through the public API this guard does not fire;
/// it keeps `n - 1` in the k bounds from underflowing.
pub(crate) fn check_entities(n: usize) -> Result<()> {
    if n < MIN_ENTITIES {
        return Err(Error::InsufficientData(format!(
            "Need at least {} tickers to cluster; got {}",
            MIN_ENTITIES, n
        )));
    }
    Ok(())
}
