//! Bottleneck network (dense autoencoder) for nonlinear reduction.
//!
//! # Architecture
//!
//! ```text
//! D → h₁ → h₂ → … → hₖ → m → hₖ → … → h₁ → D
//! └──────── encoder ──────┘ └──── decoder ────┘
//! ```
//!
//! Every encoder layer, the bottleneck included, applies the configured
//! activation. The decoder mirrors the hidden widths and ends in a linear
//! layer so it can reproduce standardized (signed) features.
//!
//! # Training
//!
//! Mean squared reconstruction error, minimized with Adam over shuffled
//! mini-batches for a fixed number of epochs. Weights start Glorot-uniform,
//! biases at zero. Shuffling and initialization draw from one RNG, seeded when
//! [`BottleneckParams::seed`] is set, so seeded training is reproducible.
//!
//! A NaN or infinite batch loss aborts training with
//! [`Error::TrainingDivergence`].
//!
//! After training only the encoder is kept for inference; it implements
//! [`Projection`].

use ndarray::{Array1, Array2, ArrayView2, Axis, Zip};
use rand::prelude::*;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::Projection;
use crate::error::{Error, Result};
use crate::util::seeded_rng;

/// Hidden-layer activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    /// max(0, x)
    Relu,
    /// tanh(x)
    Tanh,
    /// x
    Linear,
}

impl Activation {
    fn apply(self, z: &Array2<f64>) -> Array2<f64> {
        match self {
            Activation::Relu => z.mapv(|x| if x > 0.0 { x } else { 0.0 }),
            Activation::Tanh => z.mapv(f64::tanh),
            Activation::Linear => z.clone(),
        }
    }

    fn derivative(self, z: &Array2<f64>) -> Array2<f64> {
        match self {
            Activation::Relu => z.mapv(|x| if x > 0.0 { 1.0 } else { 0.0 }),
            Activation::Tanh => z.mapv(|x| 1.0 - x.tanh().powi(2)),
            Activation::Linear => Array2::ones(z.raw_dim()),
        }
    }
}

/// Bottleneck network parameters.
///
/// Defaults reproduce the campaign-segmentation network: five bottleneck units
/// behind `[7, 500, 500, 2000]` ReLU layers, 25 epochs of batch size 128.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BottleneckParams {
    /// Width of the bottleneck (the reduced dimensionality).
    pub bottleneck_dim: usize,
    /// Encoder hidden widths, input side first. The decoder mirrors them.
    pub hidden: Vec<usize>,
    /// Activation of every encoder layer and every hidden decoder layer.
    pub activation: Activation,
    /// Passes over the full dataset.
    pub epochs: usize,
    /// Rows per gradient step.
    pub batch_size: usize,
    /// Adam step size.
    pub learning_rate: f64,
    /// Optional RNG seed for reproducibility.
    pub seed: Option<u64>,
}

impl Default for BottleneckParams {
    fn default() -> Self {
        Self {
            bottleneck_dim: 5,
            hidden: vec![7, 500, 500, 2000],
            activation: Activation::Relu,
            epochs: 25,
            batch_size: 128,
            learning_rate: 1e-3,
            seed: None,
        }
    }
}

#[derive(Debug, Clone)]
struct Dense {
    /// input × output
    weights: Array2<f64>,
    bias: Array1<f64>,
    activation: Activation,
}

impl Dense {
    fn new(input: usize, output: usize, activation: Activation, rng: &mut impl Rng) -> Self {
        let limit = (6.0 / (input + output) as f64).sqrt();
        let weights = Array2::from_shape_fn((input, output), |_| rng.random_range(-limit..limit));
        Self {
            weights,
            bias: Array1::zeros(output),
            activation,
        }
    }

    fn pre_activation(&self, x: &Array2<f64>) -> Array2<f64> {
        x.dot(&self.weights) + &self.bias
    }

    fn forward(&self, x: &Array2<f64>) -> Array2<f64> {
        self.activation.apply(&self.pre_activation(x))
    }
}

/// Per-layer values kept from the forward pass for backpropagation.
struct Cache {
    input: Array2<f64>,
    z: Array2<f64>,
}

fn forward(layers: &[Dense], x: Array2<f64>) -> Array2<f64> {
    layers.iter().fold(x, |a, layer| layer.forward(&a))
}

fn forward_train(layers: &[Dense], x: Array2<f64>) -> (Array2<f64>, Vec<Cache>) {
    let mut caches = Vec::with_capacity(layers.len());
    let mut a = x;
    for layer in layers {
        let z = layer.pre_activation(&a);
        let next = layer.activation.apply(&z);
        caches.push(Cache { input: a, z });
        a = next;
    }
    (a, caches)
}

fn backward(layers: &[Dense], caches: &[Cache], mut grad: Array2<f64>) -> Vec<(Array2<f64>, Array1<f64>)> {
    let mut grads = Vec::with_capacity(layers.len());
    for (layer, cache) in layers.iter().zip(caches).rev() {
        let delta = grad * &layer.activation.derivative(&cache.z);
        let grad_w = cache.input.t().dot(&delta);
        let grad_b = delta.sum_axis(Axis(0));
        grad = delta.dot(&layer.weights.t());
        grads.push((grad_w, grad_b));
    }
    grads.reverse();
    grads
}

/// Adam optimizer state, one moment pair per parameter tensor.
struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    eps: f64,
    t: i32,
    m_w: Vec<Array2<f64>>,
    v_w: Vec<Array2<f64>>,
    m_b: Vec<Array1<f64>>,
    v_b: Vec<Array1<f64>>,
}

impl Adam {
    fn new(layers: &[Dense], learning_rate: f64) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-7,
            t: 0,
            m_w: layers.iter().map(|l| Array2::zeros(l.weights.raw_dim())).collect(),
            v_w: layers.iter().map(|l| Array2::zeros(l.weights.raw_dim())).collect(),
            m_b: layers.iter().map(|l| Array1::zeros(l.bias.raw_dim())).collect(),
            v_b: layers.iter().map(|l| Array1::zeros(l.bias.raw_dim())).collect(),
        }
    }

    fn step(&mut self, layers: &mut [Dense], grads: &[(Array2<f64>, Array1<f64>)]) {
        self.t += 1;
        let (b1, b2, eps) = (self.beta1, self.beta2, self.eps);
        let lr = self.learning_rate;
        let bc1 = 1.0 - b1.powi(self.t);
        let bc2 = 1.0 - b2.powi(self.t);

        let update = |m: &mut f64, v: &mut f64, p: &mut f64, g: f64| {
            *m = b1 * *m + (1.0 - b1) * g;
            *v = b2 * *v + (1.0 - b2) * g * g;
            let m_hat = *m / bc1;
            let v_hat = *v / bc2;
            *p -= lr * m_hat / (v_hat.sqrt() + eps);
        };

        for (i, (layer, (grad_w, grad_b))) in layers.iter_mut().zip(grads).enumerate() {
            Zip::from(&mut self.m_w[i])
                .and(&mut self.v_w[i])
                .and(&mut layer.weights)
                .and(grad_w)
                .for_each(|m, v, w, &g| update(m, v, w, g));
            Zip::from(&mut self.m_b[i])
                .and(&mut self.v_b[i])
                .and(&mut layer.bias)
                .and(grad_b)
                .for_each(|m, v, b, &g| update(m, v, b, g));
        }
    }
}

/// Bottleneck network trainer.
#[derive(Debug, Clone, Default)]
pub struct BottleneckNet {
    params: BottleneckParams,
}

impl BottleneckNet {
    /// Create a trainer with the given parameters.
    pub fn new(params: BottleneckParams) -> Self {
        Self { params }
    }

    /// Training parameters.
    pub fn params(&self) -> &BottleneckParams {
        &self.params
    }

    fn validate(&self, data: ArrayView2<'_, f64>) -> Result<()> {
        let p = &self.params;
        if data.nrows() == 0 || data.ncols() == 0 {
            return Err(Error::EmptyInput);
        }
        if p.bottleneck_dim == 0 {
            return Err(Error::InvalidParameter {
                name: "bottleneck_dim",
                message: "must be at least 1",
            });
        }
        if p.bottleneck_dim > data.ncols() {
            return Err(Error::InvalidParameter {
                name: "bottleneck_dim",
                message: "must not exceed the input width",
            });
        }
        if p.hidden.contains(&0) {
            return Err(Error::InvalidParameter {
                name: "hidden",
                message: "layer widths must be at least 1",
            });
        }
        if p.epochs == 0 {
            return Err(Error::InvalidParameter {
                name: "epochs",
                message: "must be at least 1",
            });
        }
        if p.batch_size == 0 {
            return Err(Error::InvalidParameter {
                name: "batch_size",
                message: "must be at least 1",
            });
        }
        if !(p.learning_rate.is_finite() && p.learning_rate > 0.0) {
            return Err(Error::InvalidParameter {
                name: "learning_rate",
                message: "must be a positive finite number",
            });
        }
        Ok(())
    }

    fn build(&self, input_dim: usize, rng: &mut impl Rng) -> Vec<Dense> {
        let p = &self.params;
        let mut widths = Vec::with_capacity(2 * p.hidden.len() + 3);
        widths.push(input_dim);
        widths.extend(&p.hidden);
        widths.push(p.bottleneck_dim);
        widths.extend(p.hidden.iter().rev());
        widths.push(input_dim);

        let n_layers = widths.len() - 1;
        widths
            .windows(2)
            .enumerate()
            .map(|(i, w)| {
                let activation = if i + 1 == n_layers {
                    Activation::Linear
                } else {
                    p.activation
                };
                Dense::new(w[0], w[1], activation, &mut *rng)
            })
            .collect()
    }

    /// Train on `data` (typically standardized features) and return the
    /// fitted network.
    pub fn fit(&self, data: ArrayView2<'_, f64>) -> Result<TrainedBottleneck> {
        self.validate(data)?;
        let p = &self.params;
        let (n, d) = data.dim();

        let mut rng = seeded_rng(p.seed);
        let mut layers = self.build(d, &mut rng);
        let encoder_len = p.hidden.len() + 1;
        let mut adam = Adam::new(&layers, p.learning_rate);

        debug!(
            input_dim = d,
            bottleneck_dim = p.bottleneck_dim,
            layers = layers.len(),
            "training bottleneck network"
        );

        let mut order: Vec<usize> = (0..n).collect();
        let mut loss_history = Vec::with_capacity(p.epochs);

        for epoch in 1..=p.epochs {
            order.shuffle(&mut rng);
            let mut total = 0.0;

            for batch in order.chunks(p.batch_size) {
                let x = data.select(Axis(0), batch);
                let (out, caches) = forward_train(&layers, x.clone());
                let diff = out - &x;
                let loss = diff.iter().map(|e| e * e).sum::<f64>() / diff.len() as f64;
                if !loss.is_finite() {
                    return Err(Error::TrainingDivergence { epoch, loss });
                }

                let grad = diff * (2.0 / x.len() as f64);
                let grads = backward(&layers, &caches, grad);
                adam.step(&mut layers, &grads);
                total += loss * batch.len() as f64;
            }

            let epoch_loss = total / n as f64;
            loss_history.push(epoch_loss);
            info!(epoch, epochs = p.epochs, loss = epoch_loss, "bottleneck epoch");
        }

        let decoder = layers.split_off(encoder_len);
        let trained = TrainedBottleneck {
            encoder: Encoder {
                layers,
                input_dim: d,
                output_dim: p.bottleneck_dim,
            },
            decoder,
            loss_history,
        };
        info!(final_loss = trained.final_loss(), "bottleneck training finished");
        Ok(trained)
    }
}

/// Encoder half of a trained bottleneck network.
#[derive(Debug, Clone)]
pub struct Encoder {
    layers: Vec<Dense>,
    input_dim: usize,
    output_dim: usize,
}

impl Projection for Encoder {
    fn input_dim(&self) -> usize {
        self.input_dim
    }

    fn output_dim(&self) -> usize {
        self.output_dim
    }

    fn transform(&self, data: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        if data.ncols() != self.input_dim {
            return Err(Error::DimensionMismatch {
                expected: self.input_dim,
                found: data.ncols(),
            });
        }
        Ok(forward(&self.layers, data.to_owned()))
    }
}

/// A trained bottleneck network with its training diagnostics.
#[derive(Debug, Clone)]
pub struct TrainedBottleneck {
    encoder: Encoder,
    decoder: Vec<Dense>,
    loss_history: Vec<f64>,
}

impl TrainedBottleneck {
    /// The encoder half.
    pub fn encoder(&self) -> &Encoder {
        &self.encoder
    }

    /// Drop the decoder and keep the encoder.
    pub fn into_encoder(self) -> Encoder {
        self.encoder
    }

    /// Mean reconstruction loss of every epoch, in order.
    pub fn loss_history(&self) -> &[f64] {
        &self.loss_history
    }

    /// Mean reconstruction loss of the last epoch.
    pub fn final_loss(&self) -> f64 {
        self.loss_history.last().copied().unwrap_or(f64::NAN)
    }

    /// Encode then decode `data`.
    pub fn reconstruct(&self, data: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        let codes = self.encoder.transform(data)?;
        Ok(forward(&self.decoder, codes))
    }

    /// Mean squared reconstruction error of `data` under the trained weights.
    pub fn reconstruction_error(&self, data: ArrayView2<'_, f64>) -> Result<f64> {
        let out = self.reconstruct(data)?;
        let diff = out - &data;
        Ok(diff.iter().map(|e| e * e).sum::<f64>() / diff.len().max(1) as f64)
    }
}
