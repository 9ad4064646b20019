//! Dimensionality reduction ahead of clustering and for visualization.
//!
//! Two reducers are provided:
//!
//! - [`Pca`]: linear projection onto the directions of maximal variance.
//! - [`BottleneckNet`]: a dense encoder/decoder trained to reconstruct its
//!   input through a narrow layer; the trained [`Encoder`] is the reducer.
//!
//! Both produce a fitted object implementing [`Projection`], which maps an
//! N × D matrix to N × m. The output goes straight into
//! [`Kmeans`](crate::cluster::Kmeans); nothing downstream depends on which
//! reducer produced it.

mod bottleneck;
mod pca;

pub use bottleneck::{Activation, BottleneckNet, BottleneckParams, Encoder, TrainedBottleneck};
pub use pca::{Pca, PcaModel};

use ndarray::{Array2, ArrayView2};

use crate::error::Result;

/// A fitted reducer: maps rows of width `input_dim` to rows of width `output_dim`.
pub trait Projection {
    /// Width of the rows the projection accepts.
    fn input_dim(&self) -> usize;

    /// Width of the projected rows.
    fn output_dim(&self) -> usize;

    /// Project every row of `data`.
    fn transform(&self, data: ArrayView2<'_, f64>) -> Result<Array2<f64>>;
}
