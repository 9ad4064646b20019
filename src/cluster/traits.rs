use ndarray::ArrayView2;

use crate::error::Result;

/// Common interface for hard clustering algorithms (one label per point).
///
/// Input is any N × D matrix; it does not matter whether the rows are
/// standardized features or the output of a reducer.
pub trait Clustering {
    /// Fit the model and return one cluster label per input row.
    fn fit_predict(&self, data: ArrayView2<'_, f64>) -> Result<Vec<usize>>;

    /// The configured number of clusters.
    fn n_clusters(&self) -> usize;
}
