//! End-to-end segmentation: prepare → reduce → cluster.
//!
//! ```text
//! records ─► prepare ─► standardized ─┬────────────────────► k-means ─► labels
//!                                     ├─► PCA ──────────┐      ▲
//!                                     └─► bottleneck ───┴──────┘
//! ```
//!
//! The [`Segmenter`] owns a [`SegmentationConfig`] and runs each stage to
//! completion before the next. The reducer is fitted once by
//! [`Segmenter::reduce`]; the resulting [`Embedding`] feeds both
//! [`Segmenter::inertia_curve`] and [`Segmenter::segment`], so the elbow
//! curve and the final clustering see the same space. The choice of k stays
//! with the caller: [`SegmentationConfig::n_clusters`] fixes it for
//! [`Segmenter::segment`].

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cluster::{ElbowSelector, InertiaCurve, Kmeans, KmeansFit};
use crate::error::{Error, Result};
use crate::prepare::{self, CategoryMaps, PreparedFeatures, RawRecord};
use crate::reduce::{BottleneckNet, BottleneckParams, Pca, PcaModel, Projection, TrainedBottleneck};

/// Space k-means runs in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reduction {
    /// Standardized features as-is.
    None,
    /// Principal components.
    Pca {
        /// Number of components.
        dim: usize,
    },
    /// Bottleneck-network activations.
    Bottleneck(BottleneckParams),
}

/// Pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Category tables for encoding.
    pub category_maps: CategoryMaps,
    /// k for the final clustering.
    pub n_clusters: usize,
    /// Maximum centroid updates per k-means run.
    pub max_iter: usize,
    /// K-means restarts.
    pub n_init: usize,
    /// Seed for k-means, and for the bottleneck when its own `seed` is unset.
    pub seed: Option<u64>,
    /// Clustering space.
    pub reduction: Reduction,
    /// Coordinates produced by [`Segmenter::visualize`].
    pub visualization_dim: usize,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            category_maps: CategoryMaps::default(),
            n_clusters: 5,
            max_iter: 300,
            n_init: 10,
            seed: None,
            reduction: Reduction::None,
            visualization_dim: 2,
        }
    }
}

/// A fitted reducer.
#[derive(Debug, Clone)]
pub enum Reducer {
    /// Standardized rows pass through unchanged.
    Identity {
        /// Row width.
        dim: usize,
    },
    /// Fitted principal directions.
    Pca(PcaModel),
    /// Trained bottleneck network; its encoder is the projection.
    Bottleneck(TrainedBottleneck),
}

impl Reducer {
    /// Final training loss of the bottleneck network.
    pub fn reconstruction_loss(&self) -> Option<f64> {
        match self {
            Reducer::Bottleneck(trained) => Some(trained.final_loss()),
            _ => None,
        }
    }
}

impl Projection for Reducer {
    fn input_dim(&self) -> usize {
        match self {
            Reducer::Identity { dim } => *dim,
            Reducer::Pca(model) => model.input_dim(),
            Reducer::Bottleneck(trained) => trained.encoder().input_dim(),
        }
    }

    fn output_dim(&self) -> usize {
        match self {
            Reducer::Identity { dim } => *dim,
            Reducer::Pca(model) => model.output_dim(),
            Reducer::Bottleneck(trained) => trained.encoder().output_dim(),
        }
    }

    fn transform(&self, data: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        match self {
            Reducer::Identity { dim } => {
                if data.ncols() != *dim {
                    return Err(Error::DimensionMismatch {
                        expected: *dim,
                        found: data.ncols(),
                    });
                }
                Ok(data.to_owned())
            }
            Reducer::Pca(model) => model.transform(data),
            Reducer::Bottleneck(trained) => trained.encoder().transform(data),
        }
    }
}

/// Standardized features mapped into the clustering space, together with the
/// reducer that mapped them.
#[derive(Debug, Clone)]
pub struct Embedding {
    /// One row per record, in input order.
    pub matrix: Array2<f64>,
    /// The fitted reducer.
    pub reducer: Reducer,
}

impl Embedding {
    /// Final bottleneck training loss, when that reducer was used.
    pub fn reconstruction_loss(&self) -> Option<f64> {
        self.reducer.reconstruction_loss()
    }
}

/// One input record's features (original units) and its cluster.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabeledRow {
    /// Encoded features in [`FEATURE_NAMES`](crate::prepare::FEATURE_NAMES) order.
    pub features: Vec<f64>,
    /// Segment id.
    pub cluster: usize,
}

/// Reduced coordinates of one record and its cluster.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectedRow {
    /// Principal-component coordinates of the record.
    pub coords: Vec<f64>,
    /// Segment id.
    pub cluster: usize,
}

/// Result of [`Segmenter::segment`].
#[derive(Debug, Clone)]
pub struct Segmentation {
    /// The k-means fit, in the clustering space.
    pub fit: KmeansFit,
    /// The matrix k-means ran on (standardized or reduced), row order preserved.
    pub embedding: Array2<f64>,
    /// The reducer that produced `embedding`.
    pub reducer: Reducer,
    /// Final bottleneck training loss, when that reducer was used.
    pub reconstruction_loss: Option<f64>,
    /// Per-cluster feature means in original units.
    pub centroids_original_units: Array2<f64>,
}

impl Segmentation {
    /// Cluster labels, one per input record.
    pub fn labels(&self) -> &[usize] {
        &self.fit.labels
    }

    /// Original feature columns plus cluster id, in input order.
    pub fn labeled_rows(&self, prepared: &PreparedFeatures) -> Vec<LabeledRow> {
        prepared
            .raw
            .outer_iter()
            .zip(&self.fit.labels)
            .map(|(row, &cluster)| LabeledRow {
                features: row.to_vec(),
                cluster,
            })
            .collect()
    }

    /// Assign new standardized rows to the fitted segments.
    pub fn predict(&self, standardized: ArrayView2<'_, f64>) -> Result<Vec<usize>> {
        let reduced = self.reducer.transform(standardized)?;
        self.fit.predict(reduced.view())
    }

    /// PCA of the clustering space down to `dim` coordinates, with cluster ids.
    pub fn visualize(&self, dim: usize) -> Result<Vec<ProjectedRow>> {
        let coords = Pca::new(dim).fit(self.embedding.view())?.transform(self.embedding.view())?;
        Ok(coords
            .outer_iter()
            .zip(&self.fit.labels)
            .map(|(row, &cluster)| ProjectedRow {
                coords: row.to_vec(),
                cluster,
            })
            .collect())
    }
}

/// Runs the segmentation stages under one configuration.
#[derive(Debug, Clone, Default)]
pub struct Segmenter {
    config: SegmentationConfig,
}

impl Segmenter {
    /// Create a segmenter for `config`.
    pub fn new(config: SegmentationConfig) -> Self {
        Self { config }
    }

    /// The configuration in use.
    pub fn config(&self) -> &SegmentationConfig {
        &self.config
    }

    /// Encode and standardize raw records.
    pub fn prepare(&self, records: &[RawRecord]) -> Result<PreparedFeatures> {
        prepare::prepare(records, &self.config.category_maps)
    }

    /// Fit the configured reducer once and map the standardized features
    /// into the clustering space.
    pub fn reduce(&self, prepared: &PreparedFeatures) -> Result<Embedding> {
        let standardized = prepared.standardized.view();
        let reducer = match &self.config.reduction {
            Reduction::None => Reducer::Identity {
                dim: standardized.ncols(),
            },
            Reduction::Pca { dim } => {
                let model = Pca::new(*dim).fit(standardized)?;
                info!(
                    dim,
                    explained = model.explained_variance_ratio().sum(),
                    "PCA reduction"
                );
                Reducer::Pca(model)
            }
            Reduction::Bottleneck(params) => {
                let mut params = params.clone();
                if params.seed.is_none() {
                    params.seed = self.config.seed;
                }
                Reducer::Bottleneck(BottleneckNet::new(params).fit(standardized)?)
            }
        };
        let matrix = reducer.transform(standardized)?;
        Ok(Embedding { matrix, reducer })
    }

    fn kmeans(&self, k: usize) -> Kmeans {
        let kmeans = Kmeans::new(k)
            .with_max_iter(self.config.max_iter)
            .with_n_init(self.config.n_init);
        match self.config.seed {
            Some(seed) => kmeans.with_seed(seed),
            None => kmeans,
        }
    }

    /// Elbow curve for `k = 1..=max_k` over an embedding.
    pub fn inertia_curve(&self, embedding: &Embedding, max_k: usize) -> Result<InertiaCurve> {
        let mut selector = ElbowSelector::new(max_k)
            .with_max_iter(self.config.max_iter)
            .with_n_init(self.config.n_init);
        if let Some(seed) = self.config.seed {
            selector = selector.with_seed(seed);
        }
        selector.inertia_curve(embedding.matrix.view())
    }

    /// Cluster an embedding of `prepared` into `n_clusters` segments.
    pub fn segment(&self, prepared: &PreparedFeatures, embedding: Embedding) -> Result<Segmentation> {
        let n = prepared.standardized.nrows();
        if embedding.matrix.nrows() != n {
            return Err(Error::DimensionMismatch {
                expected: n,
                found: embedding.matrix.nrows(),
            });
        }
        let fit = self.kmeans(self.config.n_clusters).fit(embedding.matrix.view())?;

        // Centroids of a reduced space are not in feature units; average the
        // members' standardized rows instead.
        let k = fit.n_clusters();
        let d = prepared.standardized.ncols();
        let mut sums = Array2::<f64>::zeros((k, d));
        let sizes = fit.cluster_sizes();
        for (row, &c) in prepared.standardized.outer_iter().zip(&fit.labels) {
            let mut sum = sums.row_mut(c);
            sum += &row;
        }
        for (mut sum, &size) in sums.outer_iter_mut().zip(&sizes) {
            if size > 0 {
                sum /= size as f64;
            }
        }
        let centroids_original_units = prepared.standardizer.inverse_transform(sums.view())?;

        info!(k, inertia = fit.inertia, sizes = ?sizes, "segmentation done");
        let reconstruction_loss = embedding.reconstruction_loss();
        Ok(Segmentation {
            fit,
            embedding: embedding.matrix,
            reducer: embedding.reducer,
            reconstruction_loss,
            centroids_original_units,
        })
    }

    /// [`Segmentation::visualize`] at the configured `visualization_dim`.
    pub fn visualize(&self, segmentation: &Segmentation) -> Result<Vec<ProjectedRow>> {
        segmentation.visualize(self.config.visualization_dim)
    }

    /// [`prepare`](Self::prepare), [`reduce`](Self::reduce), then
    /// [`segment`](Self::segment).
    pub fn run(&self, records: &[RawRecord]) -> Result<(PreparedFeatures, Segmentation)> {
        let prepared = self.prepare(records)?;
        let embedding = self.reduce(&prepared)?;
        let segmentation = self.segment(&prepared, embedding)?;
        Ok((prepared, segmentation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prepare::FEATURE_NAMES;

    fn records() -> Vec<RawRecord> {
        let brackets = ["30-34", "35-39", "40-44", "45-49"];
        (0..24)
            .map(|i| {
                let heavy = i % 3 == 0;
                let impressions = if heavy { 500_000 + i * 1_000 } else { 5_000 + i * 100 };
                RawRecord {
                    ad_id: format!("{}", 708_000 + i),
                    xyz_campaign_id: if heavy { "1178".into() } else { "916".into() },
                    fb_campaign_id: format!("{}", 103_900 + i),
                    age: Some(brackets[(i % 4) as usize].into()),
                    gender: Some(if i % 2 == 0 { "M".into() } else { "F".into() }),
                    interest: Some(10 + (i % 7)),
                    impressions: Some(impressions),
                    clicks: Some(impressions / 2_000),
                    spent: Some(impressions as f64 * 0.00031),
                    total_conversion: Some(if heavy { 8 } else { 1 + i % 2 }),
                    approved_conversion: Some(if heavy { 3 } else { i % 2 }),
                }
            })
            .collect()
    }

    #[test]
    fn segments_keep_row_order_and_width() {
        let config = SegmentationConfig {
            n_clusters: 3,
            seed: Some(42),
            ..Default::default()
        };
        let (prepared, seg) = Segmenter::new(config).run(&records()).unwrap();

        let rows = seg.labeled_rows(&prepared);
        assert_eq!(rows.len(), 24);
        assert_eq!(rows[5].features, prepared.raw.row(5).to_vec());
        assert_eq!(rows[0].features.len(), FEATURE_NAMES.len());
        assert_eq!(seg.centroids_original_units.dim(), (3, 8));
        assert!(seg.reconstruction_loss.is_none());

        // Heavy-spend records end up apart from light ones.
        assert_ne!(seg.labels()[0], seg.labels()[1]);
        assert_eq!(seg.labels()[0], seg.labels()[3]);
    }

    #[test]
    fn pca_space_and_visualization() {
        let config = SegmentationConfig {
            n_clusters: 2,
            seed: Some(1),
            reduction: Reduction::Pca { dim: 3 },
            ..Default::default()
        };
        let segmenter = Segmenter::new(config);
        let prepared = segmenter.prepare(&records()).unwrap();
        let embedding = segmenter.reduce(&prepared).unwrap();
        assert!(matches!(embedding.reducer, Reducer::Pca(_)));
        let seg = segmenter.segment(&prepared, embedding).unwrap();

        assert_eq!(seg.embedding.dim(), (24, 3));
        assert_eq!(seg.predict(prepared.standardized.view()).unwrap(), seg.labels());

        let viz = segmenter.visualize(&seg).unwrap();
        assert_eq!(viz.len(), 24);
        assert!(viz.iter().all(|r| r.coords.len() == 2));
        assert_eq!(viz[4].cluster, seg.labels()[4]);
    }

    #[test]
    fn bottleneck_space_reports_loss() {
        let params = BottleneckParams {
            bottleneck_dim: 3,
            hidden: vec![6],
            epochs: 20,
            batch_size: 8,
            learning_rate: 0.01,
            seed: Some(5),
            ..Default::default()
        };
        let config = SegmentationConfig {
            n_clusters: 2,
            seed: Some(5),
            reduction: Reduction::Bottleneck(params),
            ..Default::default()
        };
        let (_, seg) = Segmenter::new(config).run(&records()).unwrap();

        assert_eq!(seg.embedding.ncols(), 3);
        assert!(seg.reconstruction_loss.unwrap().is_finite());
        assert_eq!(seg.labels().len(), 24);
    }

    #[test]
    fn bottleneck_falls_back_to_config_seed_and_is_fitted_once() {
        let params = BottleneckParams {
            bottleneck_dim: 3,
            hidden: vec![6],
            epochs: 10,
            batch_size: 8,
            learning_rate: 0.01,
            seed: None,
            ..Default::default()
        };
        let config = SegmentationConfig {
            n_clusters: 3,
            seed: Some(42),
            reduction: Reduction::Bottleneck(params),
            ..Default::default()
        };
        let segmenter = Segmenter::new(config);
        let prepared = segmenter.prepare(&records()).unwrap();

        let first = segmenter.reduce(&prepared).unwrap();
        let second = segmenter.reduce(&prepared).unwrap();
        assert_eq!(first.matrix, second.matrix);
        assert_eq!(first.reconstruction_loss(), second.reconstruction_loss());

        // The curve and the segmentation run on the same embedding.
        let matrix = first.matrix.clone();
        segmenter.inertia_curve(&first, 5).unwrap();
        let a = segmenter.segment(&prepared, first).unwrap();
        let b = segmenter.segment(&prepared, second).unwrap();
        assert_eq!(a.embedding, matrix);
        assert_eq!(a.labels(), b.labels());
        assert_eq!(a.fit, b.fit);
    }

    #[test]
    fn embedding_must_match_records() {
        let segmenter = Segmenter::new(SegmentationConfig {
            n_clusters: 2,
            seed: Some(3),
            ..Default::default()
        });
        let prepared = segmenter.prepare(&records()).unwrap();
        let embedding = Embedding {
            matrix: Array2::zeros((5, 8)),
            reducer: Reducer::Identity { dim: 8 },
        };
        assert!(matches!(
            segmenter.segment(&prepared, embedding),
            Err(Error::DimensionMismatch { expected: 24, found: 5 })
        ));
    }

    #[test]
    fn curve_in_configured_space() {
        let config = SegmentationConfig {
            seed: Some(9),
            reduction: Reduction::Pca { dim: 2 },
            ..Default::default()
        };
        let segmenter = Segmenter::new(config);
        let prepared = segmenter.prepare(&records()).unwrap();
        let embedding = segmenter.reduce(&prepared).unwrap();
        assert_eq!(embedding.matrix.ncols(), 2);
        let curve = segmenter.inertia_curve(&embedding, 6).unwrap();
        assert_eq!(curve.len(), 6);
    }
}
