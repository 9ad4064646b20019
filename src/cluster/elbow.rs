//! Inertia curves for choosing k by the elbow method.
//!
//! The selector runs k-means for every `k` in `1..=max_k` and reports the
//! `(k, inertia)` pairs. Picking the elbow is left to the caller: the curve is
//! a decision aid, not a decision.
//!
//! Random restarts alone do not make the curve monotone. For `k > 1` the
//! selector also runs a warm start from the previous centroids plus the record
//! farthest from them. That start is no worse than the previous fit, and Lloyd
//! steps never increase inertia, so the curve is non-increasing in k.

use ndarray::{Array2, ArrayView2, Axis, Slice};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::kmeans::{Kmeans, KmeansFit};
use super::util::nearest;
use crate::error::{Error, Result};

/// Ordered `(k, inertia)` pairs, `k = 1..=max_k`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InertiaCurve {
    points: Vec<(usize, f64)>,
}

impl InertiaCurve {
    /// All `(k, inertia)` pairs in ascending k.
    pub fn points(&self) -> &[(usize, f64)] {
        &self.points
    }

    /// Inertia recorded for `k`, if it was part of the sweep.
    pub fn inertia(&self, k: usize) -> Option<f64> {
        self.points.iter().find(|(kk, _)| *kk == k).map(|(_, v)| *v)
    }

    /// Number of k values swept.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the curve holds no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Iterate over `(k, inertia)` in ascending k.
    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.points.iter().copied()
    }
}

/// Sweeps k-means over `1..=max_k`.
#[derive(Debug, Clone)]
pub struct ElbowSelector {
    max_k: usize,
    n_init: usize,
    max_iter: usize,
    seed: Option<u64>,
}

impl ElbowSelector {
    /// Sweep `k = 1..=max_k`.
    pub fn new(max_k: usize) -> Self {
        Self {
            max_k,
            n_init: 10,
            max_iter: 300,
            seed: None,
        }
    }

    /// Set restarts per k.
    pub fn with_n_init(mut self, n_init: usize) -> Self {
        self.n_init = n_init;
        self
    }

    /// Set maximum centroid updates per run.
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Set the base seed; run `k` uses `seed + k`.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Compute the inertia curve for `data`.
    pub fn inertia_curve(&self, data: ArrayView2<'_, f64>) -> Result<InertiaCurve> {
        let n = data.nrows();
        if n == 0 {
            return Err(Error::EmptyInput);
        }
        if self.max_k == 0 || self.max_k > n {
            return Err(Error::InvalidClusterCount {
                requested: self.max_k,
                n_items: n,
            });
        }

        let mut points = Vec::with_capacity(self.max_k);
        let mut prev: Option<KmeansFit> = None;

        for k in 1..=self.max_k {
            let mut kmeans = Kmeans::new(k)
                .with_n_init(self.n_init)
                .with_max_iter(self.max_iter);
            if let Some(seed) = self.seed {
                kmeans = kmeans.with_seed(seed.wrapping_add(k as u64));
            }

            let mut fit = kmeans.fit(data)?;
            if let Some(p) = &prev {
                let warm = kmeans.fit_from(data, warm_start(data, p))?;
                if warm.inertia < fit.inertia {
                    fit = warm;
                }
            }

            debug!(k, inertia = fit.inertia, n_iter = fit.n_iter, "elbow step");
            points.push((k, fit.inertia));
            prev = Some(fit);
        }

        Ok(InertiaCurve { points })
    }
}

/// Previous centroids plus the record farthest from all of them.
fn warm_start(data: ArrayView2<'_, f64>, prev: &KmeansFit) -> Array2<f64> {
    let (k, d) = prev.centroids.dim();
    let mut init = Array2::zeros((k + 1, d));
    init.slice_axis_mut(Axis(0), Slice::from(..k))
        .assign(&prev.centroids);

    let (far, _) = data
        .outer_iter()
        .map(|row| nearest(row, prev.centroids.view()).1)
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |acc, (i, dist)| {
            if dist > acc.1 {
                (i, dist)
            } else {
                acc
            }
        });
    init.row_mut(k).assign(&data.row(far));
    init
}
