use std::path::Path;
use std::rc::Rc;

use anyhow::Result;
use ndarray::{Array1, Array2};

use crate::prelude::Environment;

/// Generic capability to flatten an object (or a batch of objects) into the numeric input of a Q-network.
pub trait ToFeatureVector {
    /// Number of features produced for a single object.
    ///
    /// E.g. a state, which is represented by a series of four grayscale frames with a frame size of
    /// 40x40 produces `40 * 40 * 4` features.
    fn feature_len(&self) -> usize;

    fn to_feature_vector(&self) -> Array1<f32>;

    /// Produces a matrix with one row per batch element.
    fn batch_to_feature_matrix(batch: &[&Rc<Self>]) -> Array2<f32>
    where
        Self: Sized,
    {
        let feature_len = batch.first().map(|s| s.feature_len()).unwrap_or(0);
        let mut matrix = Array2::<f32>::zeros((batch.len(), feature_len));
        for (mut row, state) in matrix.rows_mut().into_iter().zip(batch.iter()) {
            row.assign(&state.to_feature_vector());
        }
        matrix
    }
}

/// 'Physical' AI model abstraction
pub trait DeepQLearningModel {
    type E: Environment;

    /// Q-value estimation for every action of the action space
    fn predict_q_values(
        &self,
        state: &<Self::E as Environment>::S,
    ) -> Array1<f32>;

    /// Predicts the best action (highest Q-value) based on the current state.
    fn predict_action(
        &self,
        state: &<Self::E as Environment>::S,
    ) -> Result<<Self::E as Environment>::A>;

    /// For each state: `max_a Q(state, a)`
    fn batch_predict_max_future_reward(
        &self,
        states: &[&Rc<<Self::E as Environment>::S>],
    ) -> Array1<f32>;

    /// Performs a single training step using a batch of data.
    ///
    /// # Arguments
    /// * `state_batch` states the actions were taken in
    /// * `action_batch` the action taken in each state
    /// * `updated_q_values` target Q-value for each (state, action) pair
    ///
    /// # Returns
    ///   calculated loss (before the update)
    fn train(
        &mut self,
        state_batch: &[&Rc<<Self::E as Environment>::S>],
        action_batch: &[<Self::E as Environment>::A],
        updated_q_values: &Array1<f32>,
    ) -> Result<f32>;

    fn write_checkpoint(
        &self,
        file: &Path,
    ) -> Result<()>;

    fn read_checkpoint(
        &mut self,
        file: &Path,
    ) -> Result<()>;
}
