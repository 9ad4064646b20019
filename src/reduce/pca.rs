//! Principal component analysis.
//!
//! The sample covariance of the centered data is diagonalized with the cyclic
//! Jacobi method:
//!
//! ```text
//! C = Xᶜᵀ Xᶜ / (n - 1) = V Λ Vᵀ
//! ```
//!
//! Columns of `V`, sorted by descending eigenvalue, are the principal
//! directions. Jacobi rotations are exact to machine precision for the small,
//! dense covariance matrices seen here (D = 8 for campaign features), and the
//! result does not depend on any random start.
//!
//! Each direction is sign-normalized so its largest-magnitude component is
//! positive.

use ndarray::{Array1, Array2, ArrayView2, Axis};

use super::Projection;
use crate::error::{Error, Result};
use crate::util::check_finite;

const MAX_SWEEPS: usize = 100;

/// Eigenvalue cutoff for the effective rank, scaled by `max(λ_max, 1)`.
const RANK_TOL: f64 = 1e-10;

/// PCA configuration.
#[derive(Debug, Clone)]
pub struct Pca {
    n_components: usize,
}

/// A fitted PCA projection.
#[derive(Debug, Clone, PartialEq)]
pub struct PcaModel {
    mean: Array1<f64>,
    /// m × D, one direction per row.
    components: Array2<f64>,
    explained_variance: Array1<f64>,
    total_variance: f64,
}

impl Pca {
    /// Keep `n_components` directions.
    pub fn new(n_components: usize) -> Self {
        Self { n_components }
    }

    /// Fit on `data` (rows are records).
    pub fn fit(&self, data: ArrayView2<'_, f64>) -> Result<PcaModel> {
        let (n, d) = data.dim();
        if n == 0 || d == 0 {
            return Err(Error::EmptyInput);
        }
        if self.n_components == 0 {
            return Err(Error::InvalidParameter {
                name: "n_components",
                message: "must be at least 1",
            });
        }
        check_finite(data)?;
        if n < 2 {
            return Err(Error::InsufficientRank {
                requested: self.n_components,
                rank: 0,
            });
        }

        let mean = data.sum_axis(Axis(0)) / n as f64;
        let centered = &data - &mean;
        let cov = centered.t().dot(&centered) / (n - 1) as f64;

        let (values, vectors) = symmetric_eigen(cov);
        let total_variance: f64 = values.iter().map(|v| v.max(0.0)).sum();

        let rank = match values.first() {
            Some(&top) if top > 0.0 => {
                let cutoff = RANK_TOL * top.max(1.0);
                values.iter().filter(|&&v| v > cutoff).count()
            }
            _ => 0,
        };
        if self.n_components > rank {
            return Err(Error::InsufficientRank {
                requested: self.n_components,
                rank,
            });
        }

        let m = self.n_components;
        let mut components = Array2::zeros((m, d));
        for i in 0..m {
            let mut dir = vectors.column(i).to_owned();
            let (_, pivot) = dir.iter().fold((0.0f64, 0.0f64), |(best, val), &x| {
                if x.abs() > best {
                    (x.abs(), x)
                } else {
                    (best, val)
                }
            });
            if pivot < 0.0 {
                dir.mapv_inplace(|x| -x);
            }
            components.row_mut(i).assign(&dir);
        }

        Ok(PcaModel {
            mean,
            components,
            explained_variance: Array1::from_iter(values.iter().take(m).copied()),
            total_variance,
        })
    }
}

impl PcaModel {
    /// Principal directions, one per row, by descending variance.
    pub fn components(&self) -> &Array2<f64> {
        &self.components
    }

    /// Per-column mean removed before projecting.
    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    /// Variance captured by each retained direction.
    pub fn explained_variance(&self) -> &Array1<f64> {
        &self.explained_variance
    }

    /// Fraction of the total variance captured by each retained direction.
    pub fn explained_variance_ratio(&self) -> Array1<f64> {
        if self.total_variance > 0.0 {
            &self.explained_variance / self.total_variance
        } else {
            Array1::zeros(self.explained_variance.len())
        }
    }

    /// Map scores back to the input space.
    pub fn inverse_transform(&self, scores: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        if scores.ncols() != self.components.nrows() {
            return Err(Error::DimensionMismatch {
                expected: self.components.nrows(),
                found: scores.ncols(),
            });
        }
        Ok(scores.dot(&self.components) + &self.mean)
    }
}

impl Projection for PcaModel {
    fn input_dim(&self) -> usize {
        self.components.ncols()
    }

    fn output_dim(&self) -> usize {
        self.components.nrows()
    }

    fn transform(&self, data: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        if data.ncols() != self.input_dim() {
            return Err(Error::DimensionMismatch {
                expected: self.input_dim(),
                found: data.ncols(),
            });
        }
        Ok((&data - &self.mean).dot(&self.components.t()))
    }
}

/// Eigen-decomposition of a symmetric matrix by cyclic Jacobi rotations.
///
/// Returns eigenvalues in descending order and the matching eigenvectors as
/// columns.
fn symmetric_eigen(mut a: Array2<f64>) -> (Array1<f64>, Array2<f64>) {
    let n = a.nrows();
    let mut v = Array2::<f64>::eye(n);
    let scale: f64 = a.iter().map(|x| x * x).sum();

    for _ in 0..MAX_SWEEPS {
        let mut off = 0.0;
        for p in 0..n {
            for q in (p + 1)..n {
                off += a[[p, q]] * a[[p, q]];
            }
        }
        if off <= f64::EPSILON * f64::EPSILON * scale {
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                let apq = a[[p, q]];
                if apq == 0.0 {
                    continue;
                }
                let theta = (a[[q, q]] - a[[p, p]]) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for k in 0..n {
                    let akp = a[[k, p]];
                    let akq = a[[k, q]];
                    a[[k, p]] = c * akp - s * akq;
                    a[[k, q]] = s * akp + c * akq;
                }
                for k in 0..n {
                    let apk = a[[p, k]];
                    let aqk = a[[q, k]];
                    a[[p, k]] = c * apk - s * aqk;
                    a[[q, k]] = s * apk + c * aqk;
                }
                for k in 0..n {
                    let vkp = v[[k, p]];
                    let vkq = v[[k, q]];
                    v[[k, p]] = c * vkp - s * vkq;
                    v[[k, q]] = s * vkp + c * vkq;
                }
            }
        }
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| a[[j, j]].total_cmp(&a[[i, i]]));

    let values = Array1::from_iter(order.iter().map(|&i| a[[i, i]]));
    let vectors = v.select(Axis(1), &order);
    (values, vectors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn sample() -> Array2<f64> {
        array![
            [2.5, 2.4, 0.5],
            [0.5, 0.7, 1.9],
            [2.2, 2.9, 0.1],
            [1.9, 2.2, 1.3],
            [3.1, 3.0, 0.7],
            [2.3, 2.7, 1.1],
            [2.0, 1.6, 0.2],
            [1.0, 1.1, 1.5],
            [1.5, 1.6, 0.9],
            [1.1, 0.9, 1.8],
        ]
    }

    #[test]
    fn eigen_of_diagonalizable_matrix() {
        let m = array![[2.0, 1.0], [1.0, 2.0]];
        let (values, vectors) = symmetric_eigen(m.clone());
        assert!((values[0] - 3.0).abs() < 1e-12);
        assert!((values[1] - 1.0).abs() < 1e-12);

        // M v = λ v
        for i in 0..2 {
            let v = vectors.column(i);
            let mv = m.dot(&v);
            for j in 0..2 {
                assert!((mv[j] - values[i] * v[j]).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn components_are_orthonormal_and_ordered() {
        let model = Pca::new(3).fit(sample().view()).unwrap();
        let c = model.components();
        let gram = c.dot(&c.t());
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((gram[[i, j]] - expected).abs() < 1e-10);
            }
        }
        let ev = model.explained_variance();
        assert!(ev[0] >= ev[1] && ev[1] >= ev[2]);
        assert!((model.explained_variance_ratio().sum() - 1.0).abs() < 1e-10);
    }

    #[test]
    fn full_rank_projection_round_trips() {
        let data = sample();
        let model = Pca::new(3).fit(data.view()).unwrap();
        let scores = model.transform(data.view()).unwrap();
        let back = model.inverse_transform(scores.view()).unwrap();
        for (a, b) in back.iter().zip(data.iter()) {
            assert!((a - b).abs() < 1e-10);
        }
    }

    #[test]
    fn first_direction_follows_the_line() {
        let data = array![[-2.0, -2.0], [-1.0, -1.0], [0.0, 0.0], [1.0, 1.0], [2.0, 2.0]];
        let err = Pca::new(2).fit(data.view()).unwrap_err();
        assert!(matches!(err, Error::InsufficientRank { requested: 2, rank: 1 }));

        let model = Pca::new(1).fit(data.view()).unwrap();
        let dir = model.components().row(0);
        let h = std::f64::consts::FRAC_1_SQRT_2;
        assert!((dir[0] - h).abs() < 1e-12 && (dir[1] - h).abs() < 1e-12);
        assert!((model.explained_variance_ratio()[0] - 1.0).abs() < 1e-12);

        let scores = model.transform(data.view()).unwrap();
        assert!((scores[[4, 0]] - 2.0 * std::f64::consts::SQRT_2).abs() < 1e-12);
    }

    #[test]
    fn rank_cutoff_is_absolute_below_unit_variance() {
        // Variances 0.0133 and 1.2e-11: the second is noise on any scale below 1.
        let e = 3e-6;
        let data = array![[-0.1, -e], [0.1, -e], [-0.1, e], [0.1, e]];
        assert!(matches!(
            Pca::new(2).fit(data.view()),
            Err(Error::InsufficientRank { requested: 2, rank: 1 })
        ));
        assert!(Pca::new(1).fit(data.view()).is_ok());
    }

    #[test]
    fn rejects_bad_requests() {
        let data = sample();
        assert!(matches!(
            Pca::new(0).fit(data.view()),
            Err(Error::InvalidParameter { name: "n_components", .. })
        ));
        assert!(matches!(
            Pca::new(4).fit(data.view()),
            Err(Error::InsufficientRank { requested: 4, rank: 3 })
        ));

        let model = Pca::new(2).fit(data.view()).unwrap();
        let narrow = array![[1.0, 2.0]];
        assert!(matches!(
            model.transform(narrow.view()),
            Err(Error::DimensionMismatch { expected: 3, found: 2 })
        ));
    }
}
