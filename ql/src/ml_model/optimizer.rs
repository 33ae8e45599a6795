use std::fmt::{Display, Formatter};
use std::str::FromStr;

use ndarray::{Array, Dimension, Ix1, Ix2, Zip};
use serde::{Deserialize, Serialize};

use crate::ml_model::mlp::{DenseLayer, LayerGradient};
use crate::prelude::QlError;

const RMSPROP_RHO: f32 = 0.9;
const RMSPROP_EPSILON: f32 = 1e-10;
const ADAM_BETA1: f32 = 0.9;
const ADAM_BETA2: f32 = 0.999;
const ADAM_EPSILON: f32 = 1e-8;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizerKind {
    /// plain (stochastic) gradient descent
    Sgd,
    RmsProp,
    Adam,
}

impl Display for OptimizerKind {
    fn fmt(
        &self,
        f: &mut Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            OptimizerKind::Sgd => f.write_str("SGD"),
            OptimizerKind::RmsProp => f.write_str("RMSProp"),
            OptimizerKind::Adam => f.write_str("Adam"),
        }
    }
}

impl FromStr for OptimizerKind {
    type Err = QlError;

    /// Accepts the usual spellings, case-insensitive, with or without an `Optimizer` suffix
    /// (`adam`, `AdamOptimizer`, `GradientDescent`, `rms_prop`, ...)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name: String = s
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        let name = name.strip_suffix("optimizer").unwrap_or(&name);
        match name {
            "sgd" | "gd" | "gradientdescent" | "stochasticgradientdescent" => Ok(OptimizerKind::Sgd),
            "rmsprop" => Ok(OptimizerKind::RmsProp),
            "adam" => Ok(OptimizerKind::Adam),
            _ => Err(QlError(format!("unknown optimizer '{}'", s.trim()))),
        }
    }
}

#[derive(Clone, Debug)]
struct Moments {
    m_weights: Array<f32, Ix2>,
    m_bias: Array<f32, Ix1>,
    v_weights: Array<f32, Ix2>,
    v_bias: Array<f32, Ix1>,
}

impl Moments {
    fn zeros_like(layer: &DenseLayer) -> Self {
        Self {
            m_weights: Array::zeros(layer.weights.raw_dim()),
            m_bias: Array::zeros(layer.bias.raw_dim()),
            v_weights: Array::zeros(layer.weights.raw_dim()),
            v_bias: Array::zeros(layer.bias.raw_dim()),
        }
    }
}

/// Gradient based parameter update, keeping the per-parameter state RMSProp and Adam require.
#[derive(Clone, Debug)]
pub struct Optimizer {
    kind: OptimizerKind,
    learning_rate: f32,
    moments: Vec<Moments>,
    steps: i32,
}

impl Optimizer {
    pub fn new(
        kind: OptimizerKind,
        learning_rate: f32,
    ) -> Self {
        assert!(learning_rate > 0.0, "learning rate must be positive");
        Self {
            kind,
            learning_rate,
            moments: vec![],
            steps: 0,
        }
    }

    /// [Optimizer::new] for a learning rate from outside, e.g. a checkpoint file
    pub fn try_new(
        kind: OptimizerKind,
        learning_rate: f32,
    ) -> Result<Self, QlError> {
        if !(learning_rate > 0.0 && learning_rate.is_finite()) {
            return Err(QlError(format!("learning rate {} must be positive and finite", learning_rate)));
        }
        Ok(Self::new(kind, learning_rate))
    }

    pub fn kind(&self) -> OptimizerKind { self.kind }

    pub fn learning_rate(&self) -> f32 { self.learning_rate }

    pub fn apply(
        &mut self,
        layers: &mut [DenseLayer],
        gradients: &[LayerGradient],
    ) {
        assert_eq!(layers.len(), gradients.len());
        if self.moments.len() != layers.len() {
            self.moments = layers.iter().map(Moments::zeros_like).collect();
        }
        self.steps = self.steps.saturating_add(1);

        let kind = self.kind;
        let lr = self.learning_rate;
        let t = self.steps;
        for ((layer, gradient), moments) in layers.iter_mut().zip(gradients).zip(self.moments.iter_mut()) {
            update(kind, lr, t, &mut layer.weights, &gradient.weights, &mut moments.m_weights, &mut moments.v_weights);
            update(kind, lr, t, &mut layer.bias, &gradient.bias, &mut moments.m_bias, &mut moments.v_bias);
        }
    }
}

fn update<D: Dimension>(
    kind: OptimizerKind,
    lr: f32,
    t: i32,
    param: &mut Array<f32, D>,
    grad: &Array<f32, D>,
    m: &mut Array<f32, D>,
    v: &mut Array<f32, D>,
) {
    match kind {
        OptimizerKind::Sgd => {
            Zip::from(param).and(grad).for_each(|p, &g| *p -= lr * g);
        }
        OptimizerKind::RmsProp => {
            Zip::from(param).and(grad).and(v).for_each(|p, &g, v| {
                *v = RMSPROP_RHO * *v + (1.0 - RMSPROP_RHO) * g * g;
                *p -= lr * g / (v.sqrt() + RMSPROP_EPSILON);
            });
        }
        OptimizerKind::Adam => {
            let lr_t = lr * (1.0 - ADAM_BETA2.powi(t)).sqrt() / (1.0 - ADAM_BETA1.powi(t));
            Zip::from(param).and(grad).and(m).and(v).for_each(|p, &g, m, v| {
                *m = ADAM_BETA1 * *m + (1.0 - ADAM_BETA1) * g;
                *v = ADAM_BETA2 * *v + (1.0 - ADAM_BETA2) * g * g;
                *p -= lr_t * *m / (v.sqrt() + ADAM_EPSILON);
            });
        }
    }
}
