//! Ad-campaign audience segmentation.
//!
//! `adcluster` turns campaign performance records into customer segments:
//!
//! - [`prepare`](mod@prepare): encode categorical columns and standardize features
//! - [`cluster`]: k-means (k-means++ seeding, Lloyd iterations, restarts) and
//!   the elbow curve used to pick k
//! - [`reduce`]: PCA and a bottleneck network, both usable as the space
//!   k-means runs in
//! - [`pipeline`]: the stages wired together under one configuration

#![forbid(unsafe_code)]

pub mod cluster;
pub mod error;
pub mod pipeline;
pub mod prepare;
pub mod reduce;
mod util;

pub use cluster::{Clustering, ElbowSelector, InertiaCurve, Kmeans, KmeansFit};
pub use error::{Error, Result};
pub use pipeline::{
    Embedding, LabeledRow, ProjectedRow, Reducer, Reduction, Segmentation, SegmentationConfig,
    Segmenter,
};
pub use prepare::{
    prepare, CategoryMaps, GenderMap, PreparedFeatures, RawRecord, Standardizer, FEATURE_NAMES,
};
pub use reduce::{
    Activation, BottleneckNet, BottleneckParams, Encoder, Pca, PcaModel, Projection,
    TrainedBottleneck,
};
