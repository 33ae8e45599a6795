use std::fmt::{Display, Formatter};
use std::hash::Hash;
use std::rc::Rc;

use anyhow::Result;
use console_engine::screen::Screen;

/// Numeric action id as seen by the Q-network: the index of the action's output neuron
pub type ModelActionType = u8;

pub trait Action: Display + Sized + Clone + Copy + Hash + PartialEq + Eq {
    /// Number of distinct actions = number of network outputs
    const ACTION_SPACE: ModelActionType;

    /// Unique id in `0..Self::ACTION_SPACE`
    fn numeric(&self) -> ModelActionType;

    fn try_from_numeric(value: ModelActionType) -> Result<Self>;

    /// Every action, ordered by id
    fn all() -> Result<Vec<Self>> { (0..Self::ACTION_SPACE).map(Self::try_from_numeric).collect() }
}

/// The world an agent acts in. It owns the current state and moves on by one step per action.
pub trait Environment {
    /// What the agent observes; the model derives its input from it
    type S: Clone + DebugVisualizer;
    type A: Action;

    /// Back to the start of a new episode
    fn reset(&mut self);

    fn state(&self) -> &Self::S;

    /// The current state as a shared copy, as kept in the replay memory
    fn state_as_rc(&self) -> Rc<Self::S> { Rc::new(self.state().clone()) }

    /// Applies `action` for one step and returns `(next state, reward of the step, episode done)`
    fn step(
        &mut self,
        action: Self::A,
    ) -> (&Self::S, f32, bool);

    /// [Self::step] with a shared copy of the next state
    fn step_as_rc(
        &mut self,
        action: Self::A,
    ) -> (Rc<Self::S>, f32, bool) {
        let (state, reward, done) = self.step(action);
        (Rc::new(state.clone()), reward, done)
    }

    /// Mean episode reward over the recent episodes, at which the environment counts as mastered.
    /// A constant for a given environment.
    fn episode_reward_goal_mean(&self) -> f32;
}

/// Human readable views of a state, used in trace logging and console playback
pub trait DebugVisualizer {
    fn one_line_info(&self) -> String;
    fn render_to_console(&self) -> Screen;
}

#[derive(Debug)]
pub struct QlError(pub String);

impl QlError {
    pub fn from(msg: &str) -> Self { QlError(msg.to_string()) }
}

impl Display for QlError {
    fn fmt(
        &self,
        f: &mut Formatter<'_>,
    ) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for QlError {}
