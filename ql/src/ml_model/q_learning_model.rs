use std::marker::PhantomData;
use std::path::Path;
use std::rc::Rc;

use anyhow::Result;
use ndarray::{Array1, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::ml_model::checkpoint::{read_json, write_json};
use crate::ml_model::mlp::{Mlp, MlpConfig};
use crate::ml_model::model::{DeepQLearningModel, ToFeatureVector};
use crate::ml_model::optimizer::{Optimizer, OptimizerKind};
use crate::prelude::{Action, Environment, QlError};
use crate::util::math::argmax;

#[derive(Serialize)]
struct CheckpointRef<'a> {
    optimizer: OptimizerKind,
    learning_rate: f32,
    network: &'a Mlp,
}

#[derive(Deserialize)]
struct CheckpointData {
    optimizer: OptimizerKind,
    learning_rate: f32,
    network: Mlp,
}

/// Q-learning model backed by a natively computed [Mlp].
///
/// Input: the state's feature vector; output: one Q-value per action (`E::A::ACTION_SPACE`).
pub struct QLearningMlpModel<E> {
    network: Mlp,
    optimizer: Optimizer,
    _phantom: PhantomData<E>,
}

impl<E> Clone for QLearningMlpModel<E> {
    fn clone(&self) -> Self {
        Self {
            network: self.network.clone(),
            optimizer: self.optimizer.clone(),
            _phantom: PhantomData,
        }
    }
}

impl<E> QLearningMlpModel<E>
where
    E: Environment,
    E::S: ToFeatureVector,
{
    pub fn init(
        config: &MlpConfig,
        optimizer: Optimizer,
    ) -> Result<Self> {
        Self::init_with_rng(config, optimizer, &mut rand::thread_rng())
    }

    pub fn init_with_rng<R: Rng>(
        config: &MlpConfig,
        optimizer: Optimizer,
        rng: &mut R,
    ) -> Result<Self> {
        Self::check_output_len(config.output_len)?;
        Ok(Self {
            network: Mlp::new(config, rng),
            optimizer,
            _phantom: PhantomData,
        })
    }

    /// Model with network weights and optimizer settings taken from a checkpoint file
    pub fn load(file: &Path) -> Result<Self> {
        let data: CheckpointData = read_json(file)?;
        data.network.check_consistency()?;
        Self::check_output_len(data.network.output_len())?;
        let optimizer = Optimizer::try_new(data.optimizer, data.learning_rate)?;
        Ok(Self {
            network: data.network,
            optimizer,
            _phantom: PhantomData,
        })
    }

    pub fn network(&self) -> &Mlp { &self.network }

    pub fn optimizer(&self) -> &Optimizer { &self.optimizer }

    fn check_output_len(output_len: usize) -> Result<()> {
        if output_len != E::A::ACTION_SPACE as usize {
            return Err(QlError(format!(
                "network output size {} does not match action space {}",
                output_len,
                E::A::ACTION_SPACE
            ))
            .into());
        }
        Ok(())
    }
}

impl<E> DeepQLearningModel for QLearningMlpModel<E>
where
    E: Environment,
    E::S: ToFeatureVector,
{
    type E = E;

    fn predict_q_values(
        &self,
        state: &E::S,
    ) -> Array1<f32> {
        let input = state.to_feature_vector().insert_axis(Axis(0));
        self.network.predict(input.view()).index_axis_move(Axis(0), 0)
    }

    fn predict_action(
        &self,
        state: &E::S,
    ) -> Result<E::A> {
        let q_values = self.predict_q_values(state);
        let idx = argmax(q_values.iter().copied()).ok_or_else(|| QlError::from("empty Q-value vector"))?;
        E::A::try_from_numeric(idx as u8)
    }

    fn batch_predict_max_future_reward(
        &self,
        states: &[&Rc<E::S>],
    ) -> Array1<f32> {
        let input = E::S::batch_to_feature_matrix(states);
        self.network
            .predict(input.view())
            .map_axis(Axis(1), |row| row.fold(f32::NEG_INFINITY, |m, &v| m.max(v)))
    }

    fn train(
        &mut self,
        state_batch: &[&Rc<E::S>],
        action_batch: &[E::A],
        updated_q_values: &Array1<f32>,
    ) -> Result<f32> {
        if state_batch.len() != action_batch.len() || state_batch.len() != updated_q_values.len() {
            return Err(QlError(format!(
                "batch length mismatch: {} states, {} actions, {} q-values",
                state_batch.len(),
                action_batch.len(),
                updated_q_values.len()
            ))
            .into());
        }
        if state_batch.is_empty() {
            return Err(QlError::from("empty training batch").into());
        }

        let input = E::S::batch_to_feature_matrix(state_batch);
        if input.ncols() != self.network.input_len() {
            return Err(QlError(format!(
                "state feature length {} does not match network input {}",
                input.ncols(),
                self.network.input_len()
            ))
            .into());
        }
        let actions: Vec<usize> = action_batch.iter().map(|a| a.numeric() as usize).collect();

        let (loss, gradients) = self.network.masked_mse_gradients(input.view(), &actions, updated_q_values.view());
        self.optimizer.apply(self.network.layers_mut(), &gradients);
        Ok(loss)
    }

    fn write_checkpoint(
        &self,
        file: &Path,
    ) -> Result<()> {
        // serde_json would write NaN as null, which no longer reads back
        self.network.check_finite()?;
        write_json(
            file,
            &CheckpointRef {
                optimizer: self.optimizer.kind(),
                learning_rate: self.optimizer.learning_rate(),
                network: &self.network,
            },
        )
    }

    fn read_checkpoint(
        &mut self,
        file: &Path,
    ) -> Result<()> {
        let data: CheckpointData = read_json(file)?;
        data.network.check_consistency()?;
        if data.network.input_len() != self.network.input_len() || data.network.output_len() != self.network.output_len() {
            return Err(QlError(format!(
                "checkpoint {} has shape {}->{}, model expects {}->{}",
                file.display(),
                data.network.input_len(),
                data.network.output_len(),
                self.network.input_len(),
                self.network.output_len()
            ))
            .into());
        }
        self.network = data.network;
        // optimizer moments belong to the previous weights
        self.optimizer = Optimizer::new(self.optimizer.kind(), self.optimizer.learning_rate());
        Ok(())
    }
}
