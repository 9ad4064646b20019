//! Clustering for campaign segmentation.
//!
//! ## K-means
//!
//! The classic algorithm: assign each point to the nearest centroid, then
//! update centroids to the mean of their points. Repeat.
//!
//! **Objective**: Minimize within-cluster sum of squares:
//!
//! ```text
//! J = Σ_k Σ_{x ∈ C_k} ||x - μ_k||²
//! ```
//!
//! **Assumptions**:
//! - Clusters are roughly spherical
//! - Clusters have similar sizes
//! - You know k in advance
//!
//! The last assumption is what [`ElbowSelector`] is for: it sweeps k and
//! returns the inertia curve so the caller can pick the point of diminishing
//! returns.
//!
//! The engine only sees an N × D matrix. Standardized features, PCA scores and
//! bottleneck activations all go through the same code.
//!
//! ## Usage
//!
//! ```rust
//! use adcluster::cluster::{Clustering, ElbowSelector, Kmeans};
//! use ndarray::array;
//!
//! let data = array![
//!     [0.0, 0.0],
//!     [0.1, 0.1],
//!     [10.0, 10.0],
//!     [10.1, 10.1],
//! ];
//!
//! let labels = Kmeans::new(2).with_seed(42).fit_predict(data.view()).unwrap();
//! assert_eq!(labels[0], labels[1]);  // First two together
//! assert_ne!(labels[0], labels[2]);  // Separate from last two
//!
//! let curve = ElbowSelector::new(4).with_seed(42).inertia_curve(data.view()).unwrap();
//! assert_eq!(curve.len(), 4);
//! ```

mod elbow;
mod kmeans;
mod traits;
mod util;

pub use elbow::{ElbowSelector, InertiaCurve};
pub use kmeans::{Kmeans, KmeansFit};
pub use traits::Clustering;
