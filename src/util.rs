//! Helpers shared by the clustering and reduction stages.

use ndarray::ArrayView2;
use rand::prelude::*;

use crate::error::{Error, Result};

/// Seeded RNG when a seed is given, thread RNG otherwise.
pub(crate) fn seeded_rng(seed: Option<u64>) -> Box<dyn RngCore> {
    match seed {
        Some(s) => Box::new(StdRng::seed_from_u64(s)),
        None => Box::new(rand::rng()),
    }
}

/// Reject non-finite entries, reporting the first offending cell.
pub(crate) fn check_finite(data: ArrayView2<'_, f64>) -> Result<()> {
    for ((i, j), x) in data.indexed_iter() {
        if !x.is_finite() {
            return Err(Error::IncompleteRecord {
                record: i,
                column: format!("dim {j}"),
            });
        }
    }
    Ok(())
}
