use std::fmt::{Display, Formatter};

use anyhow::Result;
use console_engine::pixel;
use console_engine::screen::Screen;
use ndarray::Array1;

use crate::ml_model::model::ToFeatureVector;
use crate::prelude::{Action, DebugVisualizer, Environment, ModelActionType, QlError};

pub const CORRIDOR_LEN: usize = 5;
const START_POS: usize = CORRIDOR_LEN / 2;
const MAX_STEPS: usize = 20;

const REWARD_EXIT: f32 = 1.0;
const REWARD_TRAP: f32 = -1.0;
const REWARD_STEP: f32 = -0.01;

/// A tiny deterministic test environment.
///
/// One-dimensional corridor of [CORRIDOR_LEN] cells; the walker starts in the middle.
/// - The right end is the exit (+1, done)
/// - The left end is a trap (-1, done)
/// - every other step costs a little; after [MAX_STEPS] the episode ends
///
/// Required model: input len [CORRIDOR_LEN] (one-hot position), output len 3
#[derive(Clone, Debug, Default)]
pub struct CorridorTestEnvironment {
    state: CorridorState,
}

impl CorridorTestEnvironment {
    pub fn new() -> Self { Self::default() }
}

impl Environment for CorridorTestEnvironment {
    type S = CorridorState;
    type A = CorridorAction;

    fn reset(&mut self) { self.state = CorridorState::default(); }

    fn state(&self) -> &Self::S { &self.state }

    fn step(
        &mut self,
        action: Self::A,
    ) -> (&Self::S, f32, bool) {
        self.state.steps += 1;
        self.state.pos = match action {
            CorridorAction::Left => self.state.pos.saturating_sub(1),
            CorridorAction::Stay => self.state.pos,
            CorridorAction::Right => (self.state.pos + 1).min(CORRIDOR_LEN - 1),
        };

        if self.state.pos == CORRIDOR_LEN - 1 {
            (&self.state, REWARD_EXIT, true)
        } else if self.state.pos == 0 {
            (&self.state, REWARD_TRAP, true)
        } else {
            (&self.state, REWARD_STEP, self.state.steps >= MAX_STEPS)
        }
    }

    fn episode_reward_goal_mean(&self) -> f32 { 0.9 }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CorridorState {
    pos: usize,
    steps: usize,
}

impl CorridorState {
    pub fn pos(&self) -> usize { self.pos }

    pub fn steps(&self) -> usize { self.steps }
}

impl Default for CorridorState {
    fn default() -> Self {
        Self {
            pos: START_POS,
            steps: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum CorridorAction {
    Left,
    Stay,
    Right,
}

impl Display for CorridorAction {
    fn fmt(
        &self,
        f: &mut Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            CorridorAction::Left => f.write_str("←"),
            CorridorAction::Stay => f.write_str("o"),
            CorridorAction::Right => f.write_str("→"),
        }
    }
}

impl Action for CorridorAction {
    const ACTION_SPACE: ModelActionType = 3;

    fn numeric(&self) -> ModelActionType {
        match self {
            CorridorAction::Left => 0,
            CorridorAction::Stay => 1,
            CorridorAction::Right => 2,
        }
    }

    fn try_from_numeric(value: ModelActionType) -> Result<Self> {
        match value {
            0 => Ok(CorridorAction::Left),
            1 => Ok(CorridorAction::Stay),
            2 => Ok(CorridorAction::Right),
            _ => Err(QlError(format!("value {} out of range", value)).into()),
        }
    }
}

impl DebugVisualizer for CorridorState {
    fn one_line_info(&self) -> String { format!("Corridor: pos {}, step {}", self.pos, self.steps) }

    fn render_to_console(&self) -> Screen {
        let mut screen = Screen::new_fill(CORRIDOR_LEN as u32, 1, pixel::pxl('.'));
        screen.set_pxl(0, 0, pixel::pxl('x'));
        screen.set_pxl(CORRIDOR_LEN as i32 - 1, 0, pixel::pxl('□'));
        screen.set_pxl(self.pos as i32, 0, pixel::pxl('●'));
        screen
    }
}

impl ToFeatureVector for CorridorState {
    fn feature_len(&self) -> usize { CORRIDOR_LEN }

    fn to_feature_vector(&self) -> Array1<f32> {
        let mut v = Array1::zeros(CORRIDOR_LEN);
        v[self.pos] = 1.0;
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corridor_environment() {
        let mut env = CorridorTestEnvironment::new();
        assert_eq!(env.state().pos(), START_POS);

        let (state, reward, done) = env.step(CorridorAction::Stay);
        assert_eq!(state.pos(), START_POS);
        assert_eq!(reward, REWARD_STEP);
        assert!(!done);

        let (state, reward, done) = env.step(CorridorAction::Right);
        assert_eq!(state.pos(), START_POS + 1);
        assert_eq!(reward, REWARD_STEP);
        assert!(!done);

        let (_, reward, done) = env.step(CorridorAction::Right);
        assert_eq!(reward, REWARD_EXIT);
        assert!(done);

        env.reset();
        env.step(CorridorAction::Left);
        let (state, reward, done) = env.step(CorridorAction::Left);
        assert_eq!(state.pos(), 0);
        assert_eq!(reward, REWARD_TRAP);
        assert!(done);
    }

    #[test]
    fn test_episode_ends_after_max_steps() {
        let mut env = CorridorTestEnvironment::new();
        for _ in 1..MAX_STEPS {
            let (_, _, done) = env.step(CorridorAction::Stay);
            assert!(!done);
        }
        let (_, _, done) = env.step(CorridorAction::Stay);
        assert!(done);
    }

    #[test]
    fn test_feature_vector_is_one_hot() {
        let state = CorridorState::default();
        let v = state.to_feature_vector();
        assert_eq!(v.len(), CORRIDOR_LEN);
        assert_eq!(v.sum(), 1.0);
        assert_eq!(v[START_POS], 1.0);
    }

    #[test]
    fn test_render() {
        let screen = CorridorState::default().render_to_console();
        assert_eq!(screen.get_width(), CORRIDOR_LEN as u32);
    }
}
