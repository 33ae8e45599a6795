//! Fully connected feed-forward network (multi-layer perceptron) used as Q-function approximator.
//!
//! Hidden layers use ReLU activation, the output layer is linear - one output per action.

use std::f32::consts::{E, PI};

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, Zip};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::prelude::QlError;

/// One dense layer: `output = input · weights + bias`, with `weights` shaped `[input_len, output_len]`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DenseLayer {
    pub weights: Array2<f32>,
    pub bias: Array1<f32>,
}

impl DenseLayer {
    pub fn input_len(&self) -> usize { self.weights.nrows() }
    pub fn output_len(&self) -> usize { self.weights.ncols() }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LayerGradient {
    pub weights: Array2<f32>,
    pub bias: Array1<f32>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MlpConfig {
    pub input_len: usize,
    pub hidden_layers: Vec<usize>,
    pub output_len: usize,
    pub hidden_bias_init: f32,
    /// Standard deviation of the output layer weights
    pub output_weight_std: f32,
    /// The output bias should match the expected Q of an agent losing immediately (`≈ -1/e`
    /// when γ^n = 1/e). The output weights stay small against it, so early batch-mean Q does
    /// not need to travel a long way - which shows up as loss spikes otherwise.
    pub output_bias_init: f32,
}

impl MlpConfig {
    pub fn new(
        input_len: usize,
        hidden_layers: Vec<usize>,
        output_len: usize,
    ) -> Self {
        Self {
            input_len,
            hidden_layers,
            output_len,
            hidden_bias_init: 0.01,
            output_weight_std: 0.001,
            output_bias_init: -1.0 / E,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Mlp {
    layers: Vec<DenseLayer>,
}

impl Mlp {
    pub fn new<R: Rng>(
        config: &MlpConfig,
        rng: &mut R,
    ) -> Self {
        assert!(config.input_len > 0 && config.output_len > 0);

        let mut layers = Vec::with_capacity(config.hidden_layers.len() + 1);
        let mut fan_in = config.input_len;
        for &fan_out in &config.hidden_layers {
            assert!(fan_out > 0, "hidden layer must not be empty");
            // Xavier / Glorot uniform
            let limit = (6.0 / (fan_in + fan_out) as f32).sqrt();
            layers.push(DenseLayer {
                weights: Array2::from_shape_fn((fan_in, fan_out), |_| rng.gen_range(-limit..limit)),
                bias: Array1::from_elem(fan_out, config.hidden_bias_init),
            });
            fan_in = fan_out;
        }
        layers.push(DenseLayer {
            weights: Array2::from_shape_fn((fan_in, config.output_len), |_| config.output_weight_std * gaussian(rng)),
            bias: Array1::from_elem(config.output_len, config.output_bias_init),
        });

        Self { layers }
    }

    pub fn from_layers(layers: Vec<DenseLayer>) -> Self {
        assert!(!layers.is_empty());
        for (a, b) in layers.iter().zip(layers.iter().skip(1)) {
            assert_eq!(a.output_len(), b.input_len(), "layer dimensions do not chain");
        }
        Self { layers }
    }

    /// Deserialized networks are not checked on construction; this validates the layer chain.
    pub fn check_consistency(&self) -> Result<(), QlError> {
        if self.layers.is_empty() {
            return Err(QlError::from("network has no layers"));
        }
        for (i, layer) in self.layers.iter().enumerate() {
            if layer.bias.len() != layer.output_len() {
                return Err(QlError(format!("layer {}: bias length {} != output length {}", i, layer.bias.len(), layer.output_len())));
            }
        }
        for (i, (a, b)) in self.layers.iter().zip(self.layers.iter().skip(1)).enumerate() {
            if a.output_len() != b.input_len() {
                return Err(QlError(format!("layer {} output {} does not feed layer {} input {}", i, a.output_len(), i + 1, b.input_len())));
            }
        }
        Ok(())
    }

    /// Fails on the first NaN or infinite weight or bias, e.g. of a diverged network
    pub fn check_finite(&self) -> Result<(), QlError> {
        for (i, layer) in self.layers.iter().enumerate() {
            if !layer.weights.iter().chain(layer.bias.iter()).all(|v| v.is_finite()) {
                return Err(QlError(format!("layer {} contains non-finite values", i)));
            }
        }
        Ok(())
    }

    pub fn input_len(&self) -> usize { self.layers[0].input_len() }

    pub fn output_len(&self) -> usize { self.layers[self.layers.len() - 1].output_len() }

    pub fn layers(&self) -> &[DenseLayer] { &self.layers }

    pub fn layers_mut(&mut self) -> &mut [DenseLayer] { &mut self.layers }

    /// Output for a batch: `[batch_len, input_len]` -> `[batch_len, output_len]`
    pub fn predict(
        &self,
        input: ArrayView2<f32>,
    ) -> Array2<f32> {
        let mut activation = input.to_owned();
        for (i, layer) in self.layers.iter().enumerate() {
            activation = self.layer_output(i, layer, &activation);
        }
        activation
    }

    /// Activations of all layers, starting with the input itself
    fn forward(
        &self,
        input: ArrayView2<f32>,
    ) -> Vec<Array2<f32>> {
        let mut activations = Vec::with_capacity(self.layers.len() + 1);
        activations.push(input.to_owned());
        for (i, layer) in self.layers.iter().enumerate() {
            let next = self.layer_output(i, layer, &activations[i]);
            activations.push(next);
        }
        activations
    }

    fn layer_output(
        &self,
        idx: usize,
        layer: &DenseLayer,
        input: &Array2<f32>,
    ) -> Array2<f32> {
        let z = input.dot(&layer.weights) + &layer.bias;
        if idx + 1 < self.layers.len() {
            z.mapv_into(|v| v.max(0.0))
        } else {
            z
        }
    }

    /// Loss `½ · mean((Q(s,a) - y)²)` where only the output of the taken action `a` of each
    /// batch row contributes, together with the gradients of all layers.
    pub fn masked_mse_gradients(
        &self,
        input: ArrayView2<f32>,
        actions: &[usize],
        targets: ArrayView1<f32>,
    ) -> (f32, Vec<LayerGradient>) {
        let batch_len = input.nrows();
        assert!(batch_len > 0);
        assert_eq!(actions.len(), batch_len);
        assert_eq!(targets.len(), batch_len);

        let activations = self.forward(input);
        let q = &activations[activations.len() - 1];

        let mut loss = 0.0_f32;
        let mut delta = Array2::<f32>::zeros(q.raw_dim());
        for (row, (&action, &target)) in actions.iter().zip(targets.iter()).enumerate() {
            assert!(action < self.output_len(), "action {} out of range", action);
            let diff = q[[row, action]] - target;
            loss += diff * diff;
            delta[[row, action]] = diff / batch_len as f32;
        }
        loss = 0.5 * loss / batch_len as f32;

        let mut gradients = Vec::with_capacity(self.layers.len());
        for l in (0..self.layers.len()).rev() {
            let a_prev = &activations[l];
            gradients.push(LayerGradient {
                weights: a_prev.t().dot(&delta),
                bias: delta.sum_axis(Axis(0)),
            });
            if l > 0 {
                let mut d = delta.dot(&self.layers[l].weights.t());
                // ReLU derivative
                Zip::from(&mut d).and(a_prev).for_each(|d, &a| {
                    if a <= 0.0 {
                        *d = 0.0
                    }
                });
                delta = d;
            }
        }
        gradients.reverse();

        (loss, gradients)
    }
}

/// Box-Muller transform; N(0,1)
fn gaussian<R: Rng>(rng: &mut R) -> f32 {
    let u1: f32 = rng.gen_range(f32::EPSILON..1.0);
    let u2: f32 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}
