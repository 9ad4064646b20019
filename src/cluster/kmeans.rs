//! K-means clustering.
//!
//! Partitions data into k clusters by minimizing **within-cluster sum of squares**
//! (WCSS), reported as the fit's *inertia*.
//!
//! # The Objective
//!
//! ```text
//! WCSS = Σₖ Σᵢ∈Cₖ ||xᵢ - μₖ||²
//! ```
//!
//! # Lloyd's Algorithm
//!
//! 1. Initialize k centroids via k-means++
//! 2. **Assign**: each point → nearest centroid (ties → lowest centroid index)
//! 3. **Update**: each centroid → mean of assigned points
//! 4. Repeat until no assignment changes, or `max_iter` updates have run
//!
//! WCSS never increases across a step, so the assignments settle.
//!
//! # Empty Clusters
//!
//! An update can leave a centroid with no members. Such a centroid is moved to
//! the record farthest from its nearest live centroid, one empty cluster at a
//! time in index order. With at least k distinct records a converged fit
//! therefore uses every label in `0..k`.
//!
//! ## K-means++ Initialization
//!
//! 1. Choose the first centroid uniformly at random
//! 2. Choose each next centroid with probability proportional to D(x)²
//!    (squared distance to the nearest existing centroid)
//!
//! Records already chosen have D(x)² = 0 and are never picked twice while an
//! unchosen distinct record remains.
//!
//! # Restarts
//!
//! `n_init` independent seedings are run from one RNG stream and the fit with
//! the lowest inertia is kept (the earliest on ties).

use ndarray::{Array2, ArrayView2};
use rand::prelude::*;
use tracing::{debug, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::traits::Clustering;
use super::util::{nearest, squared_euclidean};
use crate::error::{Error, Result};
use crate::prepare::Standardizer;
use crate::util::{check_finite, seeded_rng};

/// K-means clustering algorithm.
#[derive(Debug, Clone)]
pub struct Kmeans {
    /// Number of clusters.
    k: usize,
    /// Maximum centroid updates per run.
    max_iter: usize,
    /// Number of seeded restarts.
    n_init: usize,
    /// Random seed.
    seed: Option<u64>,
}

/// Result of a k-means fit.
#[derive(Debug, Clone, PartialEq)]
pub struct KmeansFit {
    /// Cluster label per input row, in `0..k`.
    pub labels: Vec<usize>,
    /// k × D centroid matrix, in the space the model was fitted in.
    pub centroids: Array2<f64>,
    /// Sum of squared distances from each row to its centroid.
    pub inertia: f64,
    /// Centroid updates performed.
    pub n_iter: usize,
    /// Whether assignments stopped changing before `max_iter`.
    pub converged: bool,
}

impl KmeansFit {
    /// Number of clusters.
    pub fn n_clusters(&self) -> usize {
        self.centroids.nrows()
    }

    /// Member count per cluster.
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0usize; self.n_clusters()];
        for &l in &self.labels {
            sizes[l] += 1;
        }
        sizes
    }

    /// Assign new rows to the nearest fitted centroid.
    pub fn predict(&self, data: ArrayView2<'_, f64>) -> Result<Vec<usize>> {
        if data.ncols() != self.centroids.ncols() {
            return Err(Error::DimensionMismatch {
                expected: self.centroids.ncols(),
                found: data.ncols(),
            });
        }
        Ok(data
            .outer_iter()
            .map(|row| nearest(row, self.centroids.view()).0)
            .collect())
    }

    /// Centroids mapped back to original feature units.
    ///
    /// Only meaningful when the model was fitted on the standardized matrix.
    pub fn destandardized_centroids(&self, standardizer: &Standardizer) -> Result<Array2<f64>> {
        standardizer.inverse_transform(self.centroids.view())
    }
}

impl Kmeans {
    /// Create a new K-means clusterer.
    pub fn new(k: usize) -> Self {
        Self {
            k,
            max_iter: 300,
            n_init: 10,
            seed: None,
        }
    }

    /// Set maximum centroid updates per run.
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Set the number of seeded restarts.
    pub fn with_n_init(mut self, n_init: usize) -> Self {
        self.n_init = n_init;
        self
    }

    /// Set random seed for reproducibility.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    fn validate(&self, data: ArrayView2<'_, f64>) -> Result<()> {
        let (n, d) = data.dim();
        if n == 0 {
            return Err(Error::EmptyInput);
        }
        if d == 0 {
            return Err(Error::InvalidParameter {
                name: "dimension",
                message: "must be at least 1",
            });
        }
        if self.k == 0 || self.k > n {
            return Err(Error::InvalidClusterCount {
                requested: self.k,
                n_items: n,
            });
        }
        if self.max_iter == 0 {
            return Err(Error::InvalidParameter {
                name: "max_iter",
                message: "must be at least 1",
            });
        }
        if self.n_init == 0 {
            return Err(Error::InvalidParameter {
                name: "n_init",
                message: "must be at least 1",
            });
        }
        check_finite(data)
    }

    /// Fit the model, returning labels, centroids and inertia.
    pub fn fit(&self, data: ArrayView2<'_, f64>) -> Result<KmeansFit> {
        self.validate(data)?;

        let mut rng = seeded_rng(self.seed);
        let mut best: Option<KmeansFit> = None;

        for run in 0..self.n_init {
            let centroids = init_centroids(data, self.k, &mut rng);
            let fit = lloyd(data, centroids, self.max_iter);
            debug!(
                k = self.k,
                run,
                inertia = fit.inertia,
                n_iter = fit.n_iter,
                converged = fit.converged,
                "k-means run"
            );
            let better = best.as_ref().map_or(true, |b| fit.inertia < b.inertia);
            if better {
                best = Some(fit);
            }
        }

        let best = best.ok_or(Error::InvalidParameter {
            name: "n_init",
            message: "must be at least 1",
        })?;
        if !best.converged {
            warn!(k = self.k, max_iter = self.max_iter, "k-means stopped before convergence");
        }
        Ok(best)
    }

    /// Run Lloyd iterations from caller-provided centroids (no random seeding).
    pub fn fit_from(&self, data: ArrayView2<'_, f64>, initial: Array2<f64>) -> Result<KmeansFit> {
        self.validate(data)?;
        if initial.nrows() != self.k {
            return Err(Error::DimensionMismatch {
                expected: self.k,
                found: initial.nrows(),
            });
        }
        if initial.ncols() != data.ncols() {
            return Err(Error::DimensionMismatch {
                expected: data.ncols(),
                found: initial.ncols(),
            });
        }
        check_finite(initial.view())?;

        let fit = lloyd(data, initial, self.max_iter);
        if !fit.converged {
            warn!(k = self.k, max_iter = self.max_iter, "k-means stopped before convergence");
        }
        Ok(fit)
    }
}

impl Clustering for Kmeans {
    fn fit_predict(&self, data: ArrayView2<'_, f64>) -> Result<Vec<usize>> {
        self.fit(data).map(|fit| fit.labels)
    }

    fn n_clusters(&self) -> usize {
        self.k
    }
}

/// k-means++ seeding.
fn init_centroids(data: ArrayView2<'_, f64>, k: usize, rng: &mut impl Rng) -> Array2<f64> {
    let (n, d) = data.dim();
    let mut centroids = Array2::zeros((k, d));

    let first = rng.random_range(0..n);
    centroids.row_mut(0).assign(&data.row(first));

    let mut min_dist: Vec<f64> = data
        .outer_iter()
        .map(|row| squared_euclidean(row, centroids.row(0)))
        .collect();

    for c in 1..k {
        let total: f64 = min_dist.iter().sum();
        let selected = if total > 0.0 {
            let threshold = rng.random::<f64>() * total;
            let mut cumsum = 0.0;
            let mut selected = None;
            for (i, &dist) in min_dist.iter().enumerate() {
                if dist <= 0.0 {
                    continue;
                }
                cumsum += dist;
                selected = Some(i);
                if cumsum >= threshold {
                    break;
                }
            }
            selected.unwrap_or(first)
        } else {
            rng.random_range(0..n)
        };

        centroids.row_mut(c).assign(&data.row(selected));
        for (i, row) in data.outer_iter().enumerate() {
            let dist = squared_euclidean(row, centroids.row(c));
            if dist < min_dist[i] {
                min_dist[i] = dist;
            }
        }
    }

    centroids
}

/// Lloyd iterations from `centroids`.
fn lloyd(data: ArrayView2<'_, f64>, mut centroids: Array2<f64>, max_iter: usize) -> KmeansFit {
    let n = data.nrows();
    let mut labels = vec![0usize; n];
    let mut dists = vec![0.0f64; n];
    assign(data, centroids.view(), &mut labels, &mut dists);

    let mut n_iter = 0;
    let mut converged = false;
    while n_iter < max_iter {
        n_iter += 1;
        update_centroids(data, &labels, &mut centroids);
        if !assign(data, centroids.view(), &mut labels, &mut dists) {
            converged = true;
            break;
        }
    }

    KmeansFit {
        labels,
        inertia: dists.iter().sum(),
        centroids,
        n_iter,
        converged,
    }
}

/// Assignment step. Returns whether any label changed.
fn assign(
    data: ArrayView2<'_, f64>,
    centroids: ArrayView2<'_, f64>,
    labels: &mut [usize],
    dists: &mut [f64],
) -> bool {
    #[cfg(feature = "parallel")]
    {
        labels
            .par_iter_mut()
            .zip(dists.par_iter_mut())
            .enumerate()
            .map(|(i, (label, dist))| {
                let (c, d2) = nearest(data.row(i), centroids);
                let changed = *label != c;
                *label = c;
                *dist = d2;
                changed
            })
            .reduce(|| false, |a, b| a || b)
    }

    #[cfg(not(feature = "parallel"))]
    {
        let mut changed = false;
        for (i, (label, dist)) in labels.iter_mut().zip(dists.iter_mut()).enumerate() {
            let (c, d2) = nearest(data.row(i), centroids);
            changed |= *label != c;
            *label = c;
            *dist = d2;
        }
        changed
    }
}

/// Update step: centroid ← member mean, then reseed empty clusters.
fn update_centroids(data: ArrayView2<'_, f64>, labels: &[usize], centroids: &mut Array2<f64>) {
    let (k, d) = centroids.dim();
    let mut sums = Array2::<f64>::zeros((k, d));
    let mut counts = vec![0usize; k];

    for (row, &c) in data.outer_iter().zip(labels) {
        let mut sum = sums.row_mut(c);
        sum += &row;
        counts[c] += 1;
    }

    let mut empty = Vec::new();
    for c in 0..k {
        if counts[c] > 0 {
            let mean = &sums.row(c) / counts[c] as f64;
            centroids.row_mut(c).assign(&mean);
        } else {
            empty.push(c);
        }
    }
    if empty.is_empty() {
        return;
    }

    // Distance from every record to its nearest live centroid.
    let live: Vec<usize> = (0..k).filter(|&c| counts[c] > 0).collect();
    let mut min_dist: Vec<f64> = data
        .outer_iter()
        .map(|row| {
            live.iter()
                .map(|&c| squared_euclidean(row, centroids.row(c)))
                .fold(f64::INFINITY, f64::min)
        })
        .collect();

    for c in empty {
        let (far, far_dist) = min_dist
            .iter()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |acc, (i, &dist)| {
                if dist > acc.1 {
                    (i, dist)
                } else {
                    acc
                }
            });
        if far_dist <= 0.0 {
            // Every record sits on a centroid; nothing left to split.
            break;
        }

        centroids.row_mut(c).assign(&data.row(far));
        debug!(cluster = c, record = far, distance = far_dist.sqrt(), "reseeded empty cluster");

        for (i, row) in data.outer_iter().enumerate() {
            let dist = squared_euclidean(row, centroids.row(c));
            if dist < min_dist[i] {
                min_dist[i] = dist;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::collections::HashSet;

    #[test]
    fn test_kmeans_basic() {
        let data = array![[0.0, 0.0], [0.1, 0.1], [10.0, 10.0], [10.1, 10.1]];

        let labels = Kmeans::new(2).with_seed(42).fit_predict(data.view()).unwrap();

        // Points 0,1 should be in same cluster, points 2,3 in another
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[2], labels[3]);
        assert_ne!(labels[0], labels[2]);
    }

    #[test]
    fn test_kmeans_all_points_assigned() {
        let data = Array2::from_shape_fn((50, 2), |(i, j)| {
            if j == 0 {
                i as f64 * 0.1
            } else {
                (i % 5) as f64
            }
        });

        let fit = Kmeans::new(5).with_seed(123).fit(data.view()).unwrap();

        assert_eq!(fit.labels.len(), data.nrows());
        for &label in &fit.labels {
            assert!(label < 5, "label {} out of range", label);
        }
        assert!(fit.cluster_sizes().iter().all(|&s| s > 0));
    }

    #[test]
    fn test_kmeans_four_corners_k_equals_n() {
        let data = array![[0.0, 0.0], [0.0, 10.0], [10.0, 0.0], [10.0, 10.0]];

        let fit = Kmeans::new(4).with_seed(7).fit(data.view()).unwrap();

        assert_eq!(fit.inertia, 0.0);
        assert!(fit.converged);
        let unique: HashSet<_> = fit.labels.iter().collect();
        assert_eq!(unique.len(), 4);
        for (i, &l) in fit.labels.iter().enumerate() {
            assert_eq!(fit.centroids.row(l), data.row(i));
        }
    }

    #[test]
    fn test_kmeans_deterministic_with_seed() {
        let data = array![[0.0, 0.0], [0.1, 0.1], [3.0, 2.0], [10.0, 10.0], [10.1, 10.1], [5.0, 7.0]];

        let a = Kmeans::new(3).with_seed(42).fit(data.view()).unwrap();
        let b = Kmeans::new(3).with_seed(42).fit(data.view()).unwrap();

        assert_eq!(a, b, "same seed should give same result");
    }

    #[test]
    fn test_kmeans_scaling_invariant() {
        let data = array![[0.0, 0.0], [0.1, 0.1], [10.0, 10.0], [10.1, 10.1]];
        let scaled = &data * 100.0;

        let labels1 = Kmeans::new(2).with_seed(42).fit_predict(data.view()).unwrap();
        let labels2 = Kmeans::new(2).with_seed(42).fit_predict(scaled.view()).unwrap();

        assert_eq!(labels1[0], labels1[1]);
        assert_eq!(labels2[0], labels2[1]);
        assert_eq!(labels1[2], labels1[3]);
        assert_eq!(labels2[2], labels2[3]);
        assert_ne!(labels1[0], labels1[2]);
        assert_ne!(labels2[0], labels2[2]);
    }

    #[test]
    fn test_kmeans_equidistant_goes_to_lowest_index() {
        // Point 0 sits halfway between both initial centroids.
        let data = array![[0.0, 0.0], [-1.0, 0.0], [1.0, 0.0]];
        let initial = array![[-1.0, 0.0], [1.0, 0.0]];

        let fit = Kmeans::new(2).fit_from(data.view(), initial).unwrap();

        assert_eq!(fit.labels, vec![0, 0, 1]);
    }

    #[test]
    fn test_kmeans_reseeds_empty_cluster() {
        let data = array![[0.0, 0.0], [0.0, 1.0], [10.0, 0.0], [10.0, 1.0]];
        // The second centroid starts out of reach of every record.
        let initial = array![[0.0, 0.5], [100.0, 100.0]];

        let fit = Kmeans::new(2).fit_from(data.view(), initial).unwrap();

        assert!(fit.converged);
        assert_eq!(fit.labels, vec![1, 1, 0, 0]);
        assert_eq!(fit.cluster_sizes(), vec![2, 2]);
        assert!((fit.inertia - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_kmeans_restarts_never_worse_than_first_run() {
        let data = Array2::from_shape_fn((40, 2), |(i, j)| ((i * 7 + j * 13) % 11) as f64);

        let single = Kmeans::new(4).with_seed(5).with_n_init(1).fit(data.view()).unwrap();
        let multi = Kmeans::new(4).with_seed(5).with_n_init(10).fit(data.view()).unwrap();

        assert!(multi.inertia <= single.inertia);
    }

    #[test]
    fn test_kmeans_predict_and_destandardize() {
        let raw = array![[1.0, 100.0], [1.2, 110.0], [9.0, 900.0], [9.2, 910.0]];
        let s = Standardizer::fit(raw.view(), &["a", "b"]).unwrap();
        let z = s.transform(raw.view()).unwrap();

        let fit = Kmeans::new(2).with_seed(1).fit(z.view()).unwrap();
        let centers = fit.destandardized_centroids(&s).unwrap();

        let low = fit.labels[0];
        assert!((centers[[low, 0]] - 1.1).abs() < 1e-9);
        assert!((centers[[low, 1]] - 105.0).abs() < 1e-9);
        assert_eq!(fit.predict(z.view()).unwrap(), fit.labels);
    }

    #[test]
    fn test_kmeans_empty_input_error() {
        let data = Array2::<f64>::zeros((0, 2));
        let result = Kmeans::new(2).fit(data.view());
        assert!(matches!(result, Err(Error::EmptyInput)));
    }

    #[test]
    fn test_kmeans_invalid_cluster_count() {
        let data = array![[0.0, 0.0], [1.0, 1.0]];
        assert!(matches!(
            Kmeans::new(5).fit(data.view()),
            Err(Error::InvalidClusterCount { requested: 5, n_items: 2 })
        ));
        assert!(matches!(
            Kmeans::new(0).fit(data.view()),
            Err(Error::InvalidClusterCount { requested: 0, n_items: 2 })
        ));
    }
}
