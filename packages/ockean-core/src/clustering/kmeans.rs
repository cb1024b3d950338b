//! K-means clustering of standardized ticker features.

use ndarray::{Array2, ArrayView2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, trace};

use super::{check_entities, squared_distance};
use crate::data::FeatureMatrix;
use crate::{Error, Result};

/// Default number of independent restarts.
pub const DEFAULT_RESTARTS: usize = 25;

/// Default base seed.
pub const DEFAULT_SEED: u64 = 42;

/// Default cap on Lloyd iterations per restart.
pub const DEFAULT_MAX_ITERATIONS: usize = 300;

/// Parameters shared by every k-means run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterParams {
    /// Independent trials; the lowest-inertia trial wins
    pub restarts: usize,
    /// Base seed; trial `t` uses `seed + t`
    pub seed: u64,
    /// Iteration cap per trial
    pub max_iterations: usize,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            restarts: DEFAULT_RESTARTS,
            seed: DEFAULT_SEED,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

impl ClusterParams {
    /// Params with the default iteration cap.
    pub fn new(restarts: usize, seed: u64) -> Self {
        Self {
            restarts,
            seed,
            ..Default::default()
        }
    }

    /// Override the iteration cap.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Seed used by trial `trial`.
    pub fn trial_seed(&self, trial: usize) -> u64 {
        self.seed.wrapping_add(trial as u64)
    }

    fn validate(&self) -> Result<()> {
        if self.restarts == 0 {
            return Err(Error::InvalidArgument(
                "restarts must be at least 1".to_string(),
            ));
        }
        if self.max_iterations == 0 {
            return Err(Error::InvalidArgument(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// One `(ticker, cluster)` output row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterRow {
    pub ticker: String,
    pub cluster: usize,
}

/// Final partition of tickers into `k` clusters.
///
/// Labels are numbered in order of first appearance over the ticker order, so
/// the first ticker is always in cluster 0.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterAssignment {
    tickers: Vec<String>,
    labels: Vec<usize>,
    k: usize,
    inertia: f64,
    trial: usize,
    iterations: usize,
}

impl ClusterAssignment {
    pub fn k(&self) -> usize {
        self.k
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    /// Labels in ticker order.
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Sum of squared distances to assigned centroids.
    pub fn inertia(&self) -> f64 {
        self.inertia
    }

    /// Index of the winning restart.
    pub fn trial(&self) -> usize {
        self.trial
    }

    /// Lloyd iterations run by the winning restart.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Cluster label of `ticker`.
    pub fn label_of(&self, ticker: &str) -> Option<usize> {
        let idx = self.tickers.iter().position(|t| t == ticker)?;
        Some(self.labels[idx])
    }

    /// Tickers in `cluster`, ascending.
    pub fn members(&self, cluster: usize) -> Vec<&str> {
        let mut members: Vec<&str> = self
            .tickers
            .iter()
            .zip(&self.labels)
            .filter(|(_, &label)| label == cluster)
            .map(|(t, _)| t.as_str())
            .collect();
        members.sort_unstable();
        members
    }

    /// Output rows sorted by `(cluster, ticker)`.
    pub fn rows(&self) -> Vec<ClusterRow> {
        let mut rows: Vec<ClusterRow> = self
            .tickers
            .iter()
            .zip(&self.labels)
            .map(|(ticker, &cluster)| ClusterRow {
                ticker: ticker.clone(),
                cluster,
            })
            .collect();
        rows.sort_by(|a, b| a.cluster.cmp(&b.cluster).then_with(|| a.ticker.cmp(&b.ticker)));
        rows
    }
}

/// Partition `features` into `k` clusters with `restarts` seeded trials.
///
/// # Errors
///
/// - `InvalidParameter` when `k` is outside `[2, n - 1]`
/// - `InvalidArgument` when `restarts` is zero
pub fn cluster(
    features: &FeatureMatrix,
    k: usize,
    restarts: usize,
    seed: u64,
) -> Result<ClusterAssignment> {
    cluster_with(features, k, &ClusterParams::new(restarts, seed))
}

/// [`cluster`] with explicit parameters.
pub fn cluster_with(
    features: &FeatureMatrix,
    k: usize,
    params: &ClusterParams,
) -> Result<ClusterAssignment> {
    let n = features.n_entities();
    check_entities(n)?;
    if k < 2 || k > n - 1 {
        return Err(Error::InvalidParameter {
            name: "k",
            value: k,
            min: 2,
            max: n - 1,
        });
    }
    params.validate()?;

    let best = best_of_trials(features.values().view(), k, params)?;
    let labels = canonical_labels(&best.labels);

    info!(
        k,
        entities = n,
        inertia = best.inertia,
        trial = best.index,
        iterations = best.iterations,
        "Clustered tickers"
    );

    Ok(ClusterAssignment {
        tickers: features.tickers().to_vec(),
        labels,
        k,
        inertia: best.inertia,
        trial: best.index,
        iterations: best.iterations,
    })
}

/// Outcome of a single restart.
#[derive(Debug, Clone)]
struct Trial {
    index: usize,
    labels: Vec<usize>,
    inertia: f64,
    iterations: usize,
}

/// Run every restart in parallel and keep the lowest inertia.
///
/// Ties go to the earliest trial, so the result does not depend on scheduling.
fn best_of_trials(data: ArrayView2<'_, f64>, k: usize, params: &ClusterParams) -> Result<Trial> {
    let trials: Vec<Trial> = (0..params.restarts)
        .into_par_iter()
        .map(|t| run_trial(data, k, t, params.trial_seed(t), params.max_iterations))
        .collect();

    trials
        .into_iter()
        .reduce(|best, next| if next.inertia < best.inertia { next } else { best })
        .ok_or_else(|| Error::InvalidArgument("restarts must be at least 1".to_string()))
}

fn run_trial(
    data: ArrayView2<'_, f64>,
    k: usize,
    index: usize,
    seed: u64,
    max_iterations: usize,
) -> Trial {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut centroids = kmeans_plus_plus(data, k, &mut rng);
    let mut labels: Vec<usize> = Vec::new();
    let mut iterations = 0;

    while iterations < max_iterations {
        iterations += 1;

        let mut next = assign(data, centroids.view());
        repair_empty_clusters(data, centroids.view(), &mut next, k);

        let converged = next == labels;
        labels = next;
        centroids = compute_centroids(data, &labels, k, centroids.view());
        if converged {
            break;
        }
    }

    let inertia = inertia(data, &labels, centroids.view());
    trace!(trial = index, seed, iterations, inertia, "K-means trial finished");

    Trial {
        index,
        labels,
        inertia,
        iterations,
    }
}

/// K-means++ seeding: first centroid uniform, then proportional to the
/// squared distance from the nearest centroid chosen so far.
fn kmeans_plus_plus(data: ArrayView2<'_, f64>, k: usize, rng: &mut ChaCha8Rng) -> Array2<f64> {
    let n = data.nrows();
    let mut centroids = Array2::zeros((k, data.ncols()));

    let first = rng.gen_range(0..n);
    centroids.row_mut(0).assign(&data.row(first));
    let mut closest: Vec<f64> = (0..n)
        .map(|i| squared_distance(data.row(i), data.row(first)))
        .collect();

    for c in 1..k {
        let total: f64 = closest.iter().sum();
        let pick = if total > 0.0 && total.is_finite() {
            let target = rng.gen::<f64>() * total;
            let mut acc = 0.0;
            closest
                .iter()
                .position(|&d| {
                    acc += d;
                    acc > target
                })
                .unwrap_or_else(|| closest.iter().rposition(|&d| d > 0.0).unwrap_or(0))
        } else {
            // Every entity coincides with a chosen centroid
            rng.gen_range(0..n)
        };

        centroids.row_mut(c).assign(&data.row(pick));
        for (i, d) in closest.iter_mut().enumerate() {
            *d = d.min(squared_distance(data.row(i), data.row(pick)));
        }
    }

    centroids
}

/// Nearest centroid per entity; ties go to the lowest centroid index.
fn assign(data: ArrayView2<'_, f64>, centroids: ArrayView2<'_, f64>) -> Vec<usize> {
    data.rows()
        .into_iter()
        .map(|row| {
            let mut best = 0;
            let mut best_dist = f64::INFINITY;
            for (c, centroid) in centroids.rows().into_iter().enumerate() {
                let dist = squared_distance(row, centroid);
                if dist < best_dist {
                    best_dist = dist;
                    best = c;
                }
            }
            best
        })
        .collect()
}

/// Give every empty cluster a member.
///
/// Each empty cluster (lowest label first) takes the entity farthest from its
/// current centroid among clusters that still have more than one member; ties
/// go to the lowest entity index. With `k < n` a donor always exists.
fn repair_empty_clusters(
    data: ArrayView2<'_, f64>,
    centroids: ArrayView2<'_, f64>,
    labels: &mut [usize],
    k: usize,
) {
    let mut counts = vec![0usize; k];
    for &label in labels.iter() {
        counts[label] += 1;
    }

    let mut distances: Vec<f64> = labels
        .iter()
        .enumerate()
        .map(|(i, &label)| squared_distance(data.row(i), centroids.row(label)))
        .collect();

    for empty in 0..k {
        if counts[empty] > 0 {
            continue;
        }

        let donor = (0..labels.len())
            .filter(|&i| counts[labels[i]] > 1)
            .fold(None, |best: Option<usize>, i| match best {
                Some(b) if distances[b] >= distances[i] => Some(b),
                _ => Some(i),
            });

        let Some(donor) = donor else {
            break;
        };
        trace!(cluster = empty, entity = donor, "Re-seeding empty cluster");
        counts[labels[donor]] -= 1;
        counts[empty] += 1;
        labels[donor] = empty;
        distances[donor] = 0.0;
    }
}

/// Member means per cluster; a cluster without members keeps its previous centroid.
fn compute_centroids(
    data: ArrayView2<'_, f64>,
    labels: &[usize],
    k: usize,
    previous: ArrayView2<'_, f64>,
) -> Array2<f64> {
    let mut sums = Array2::<f64>::zeros((k, data.ncols()));
    let mut counts = vec![0usize; k];

    for (row, &label) in data.rows().into_iter().zip(labels) {
        let mut sum = sums.row_mut(label);
        sum += &row;
        counts[label] += 1;
    }

    for (c, mut sum) in sums.rows_mut().into_iter().enumerate() {
        if counts[c] > 0 {
            sum /= counts[c] as f64;
        } else {
            sum.assign(&previous.row(c));
        }
    }
    sums
}

fn inertia(data: ArrayView2<'_, f64>, labels: &[usize], centroids: ArrayView2<'_, f64>) -> f64 {
    data.rows()
        .into_iter()
        .zip(labels)
        .map(|(row, &label)| squared_distance(row, centroids.row(label)))
        .sum()
}

/// Renumber labels in order of first appearance.
fn canonical_labels(labels: &[usize]) -> Vec<usize> {
    let mut mapping: Vec<Option<usize>> = vec![None; labels.iter().max().map_or(0, |m| m + 1)];
    let mut next = 0;
    labels
        .iter()
        .map(|&label| {
            *mapping[label].get_or_insert_with(|| {
                next += 1;
                next - 1
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clustering::test_support::{
        grouped_features, grouped_features_with_noise, same_partition,
    };
    use ndarray::array;

    #[test]
    fn test_recovers_separated_groups() {
        let groups = [0, 1, 2, 0, 1, 2, 0, 1, 2];
        let features = grouped_features(&groups, 60);

        let assignment = cluster(&features, 3, 10, 42).unwrap();
        assert!(same_partition(assignment.labels(), &groups));
    }

    #[test]
    fn test_three_entities_two_clusters() {
        let features = grouped_features(&[0, 0, 1], 30);
        let assignment = cluster(&features, 2, 5, 7).unwrap();

        assert_eq!(assignment.labels().len(), 3);
        assert_eq!(assignment.labels(), &[0, 0, 1]);
    }

    #[test]
    fn test_k_equal_to_n_rejected() {
        let features = grouped_features(&[0, 1, 2], 30);
        let result = cluster(&features, 3, 5, 42);

        match result {
            Err(Error::InvalidParameter {
                name,
                value,
                min,
                max,
            }) => {
                assert_eq!(name, "k");
                assert_eq!(value, 3);
                assert_eq!(min, 2);
                assert_eq!(max, 2);
            }
            other => panic!("expected InvalidParameter, got {:?}", other),
        }
    }

    #[test]
    fn test_k_below_two_rejected() {
        let features = grouped_features(&[0, 1, 2, 0], 30);
        assert!(matches!(
            cluster(&features, 1, 5, 42),
            Err(Error::InvalidParameter { value: 1, .. })
        ));
    }

    #[test]
    fn test_zero_restarts_rejected() {
        let features = grouped_features(&[0, 1, 2, 0], 30);
        assert!(matches!(
            cluster(&features, 2, 0, 42),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_deterministic_for_same_seed() {
        let features = grouped_features(&[0, 1, 0, 2, 1, 3, 2, 3, 0, 1], 40);

        let first = cluster(&features, 4, 25, 42).unwrap();
        let second = cluster(&features, 4, 25, 42).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.inertia().to_bits(), second.inertia().to_bits());
    }

    #[test]
    fn test_more_restarts_never_worse() {
        let features = grouped_features(&[0, 1, 0, 2, 1, 3, 2, 3, 0, 1, 4, 4], 40);

        let single = cluster(&features, 5, 1, 3).unwrap();
        let many = cluster(&features, 5, 25, 3).unwrap();
        assert!(many.inertia() <= single.inertia());
    }

    #[test]
    fn test_every_label_used_for_all_k() {
        // Duplicated rows make k-means++ pick coincident centroids
        let groups = [0, 0, 0, 0, 0, 0, 1, 2];
        let features = grouped_features_with_noise(&groups, 20, 0.0);
        let n = groups.len();

        for k in 2..n {
            let assignment = cluster(&features, k, 4, 11).unwrap();
            let labels = assignment.labels();
            assert_eq!(labels.len(), n);
            for label in 0..k {
                assert!(labels.contains(&label), "k={} missing label {}", k, label);
            }
            assert!(labels.iter().all(|&l| l < k));
        }
    }

    #[test]
    fn test_iteration_cap_bounds_every_trial() {
        let features = grouped_features(&[0, 1, 2, 0, 3, 0], 30);
        let params = ClusterParams::new(3, 42).with_max_iterations(1);
        assert_eq!(params.max_iterations, 1);

        let first = cluster_with(&features, 4, &params).unwrap();
        assert_eq!(first.iterations(), 1);
        assert!(first.trial() < 3);
        for label in 0..4 {
            assert!(first.labels().contains(&label), "missing label {}", label);
        }

        let second = cluster_with(&features, 4, &params).unwrap();
        assert_eq!(first.labels(), second.labels());
        assert_eq!(first.trial(), second.trial());
    }

    #[test]
    fn test_zero_iteration_cap_rejected() {
        let features = grouped_features(&[0, 1, 2, 0], 30);
        let params = ClusterParams::new(3, 42).with_max_iterations(0);
        assert!(matches!(
            cluster_with(&features, 2, &params),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_rows_sorted_by_cluster_then_ticker() {
        let groups = [1, 0, 1, 0, 2, 2];
        let features = grouped_features(&groups, 30);
        let assignment = cluster(&features, 3, 5, 42).unwrap();

        let rows = assignment.rows();
        assert_eq!(rows.len(), groups.len());
        for pair in rows.windows(2) {
            let ordered = (pair[0].cluster, &pair[0].ticker) < (pair[1].cluster, &pair[1].ticker);
            assert!(ordered);
        }
        // Canonical numbering puts the first ticker in cluster 0
        assert_eq!(assignment.label_of("T0"), Some(0));
        assert_eq!(assignment.members(0), vec!["T0", "T2"]);
    }

    #[test]
    fn test_repair_moves_farthest_member() {
        let data = array![[0.0], [1.0], [5.0], [6.0]];
        let centroids = array![[0.5], [100.0], [200.0]];
        let mut labels = vec![0, 0, 0, 0];

        repair_empty_clusters(data.view(), centroids.view(), &mut labels, 3);

        // Entity 3 is farthest from centroid 0, then entity 2
        assert_eq!(labels, vec![0, 0, 2, 1]);
    }

    #[test]
    fn test_canonical_labels() {
        assert_eq!(canonical_labels(&[2, 2, 0, 1, 0]), vec![0, 0, 1, 2, 1]);
        assert_eq!(canonical_labels(&[]), Vec::<usize>::new());
    }

    #[test]
    fn test_trial_seeds_offset_from_base() {
        let params = ClusterParams::new(3, u64::MAX);
        assert_eq!(params.trial_seed(0), u64::MAX);
        assert_eq!(params.trial_seed(1), 0);
        assert_eq!(params.max_iterations, DEFAULT_MAX_ITERATIONS);
    }
}
