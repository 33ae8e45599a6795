use anyhow::Result;

use crate::ml_model::model::DeepQLearningModel;
use crate::prelude::Environment;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlayOutcome {
    pub steps: usize,
    pub reward: f32,
    /// false, if the episode was cut off at `max_steps`
    pub done: bool,
}

/// Plays one episode from a fresh environment, always taking the model's best action.
///
/// `on_step` sees every state after the step, with the action taken and the reward earned.
/// Returning `false` from it stops the episode early.
pub fn play_episode<E, M, F>(
    environment: &mut E,
    model: &M,
    max_steps: usize,
    mut on_step: F,
) -> Result<PlayOutcome>
where
    E: Environment,
    M: DeepQLearningModel<E = E>,
    F: FnMut(&E::S, E::A, f32) -> bool,
{
    environment.reset();
    let mut outcome = PlayOutcome {
        steps: 0,
        reward: 0.0,
        done: false,
    };

    while outcome.steps < max_steps {
        let action = model.predict_action(environment.state())?;
        let (state, reward, done) = environment.step(action);
        outcome.steps += 1;
        outcome.reward += reward;
        outcome.done = done;
        if !on_step(state, action, reward) || done {
            break;
        }
    }
    log::debug!("played episode: {} steps, reward {:.1}", outcome.steps, outcome.reward);
    Ok(outcome)
}
