use std::fmt::{Display, Formatter};

use anyhow::Result;

use ql::prelude::{Action, Environment, ModelActionType, QlError};

use crate::environment::frame_ring_buffer::FrameRingBuffer;
use crate::environment::preprocessing::{check_downsample_factor, downsample_max};
use crate::game::drawer::{self, FRAME_SIZE_X, FRAME_SIZE_Y};
use crate::game::mechanics::{PaddleControl, PongMechanics, Score, POINTS_TO_WIN};

pub const STATE_NUM_FRAMES: usize = 4;

pub type PongState = FrameRingBuffer<STATE_NUM_FRAMES>;

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum PongAction {
    Stay,
    Up,
    Down,
}

impl Action for PongAction {
    const ACTION_SPACE: ModelActionType = 3;

    fn numeric(&self) -> ModelActionType {
        match self {
            PongAction::Stay => 0,
            PongAction::Up => 1,
            PongAction::Down => 2,
        }
    }

    fn try_from_numeric(value: ModelActionType) -> Result<Self> {
        match value {
            0 => Ok(PongAction::Stay),
            1 => Ok(PongAction::Up),
            2 => Ok(PongAction::Down),
            _ => Err(QlError(format!("value {} out of range", value)).into()),
        }
    }
}

impl Display for PongAction {
    fn fmt(
        &self,
        f: &mut Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            PongAction::Stay => f.write_str("o"),
            PongAction::Up => f.write_str("↑"),
            PongAction::Down => f.write_str("↓"),
        }
    }
}

impl From<PongAction> for PaddleControl {
    fn from(action: PongAction) -> Self {
        match action {
            PongAction::Stay => PaddleControl::None,
            PongAction::Up => PaddleControl::AccelerateUp,
            PongAction::Down => PaddleControl::AccelerateDown,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PongSettings {
    /// Game steps following each agent step, with no action
    pub steps_to_skip: usize,
    pub reward_scale: f32,
    /// Frame size reduction (max-pooling); must divide the frame size
    pub downsample_factor: u32,
    pub points_to_win: u32,
}

impl Default for PongSettings {
    fn default() -> Self {
        Self {
            steps_to_skip: 1,
            reward_scale: 1.0,
            downsample_factor: 4,
            points_to_win: POINTS_TO_WIN,
        }
    }
}

impl PongSettings {
    pub fn validate(&self) -> Result<()> {
        check_downsample_factor(FRAME_SIZE_X, FRAME_SIZE_Y, self.downsample_factor)?;
        if !(self.reward_scale.is_finite() && self.reward_scale > 0.0) {
            return Err(QlError(format!("reward scale {} must be positive", self.reward_scale)).into());
        }
        if self.points_to_win == 0 {
            return Err(QlError::from("points_to_win must be at least 1").into());
        }
        Ok(())
    }

    pub fn frame_size(&self) -> (u32, u32) { (FRAME_SIZE_X / self.downsample_factor, FRAME_SIZE_Y / self.downsample_factor) }

    /// Number of model input features
    pub fn feature_len(&self) -> usize {
        let (x, y) = self.frame_size();
        STATE_NUM_FRAMES * (x * y) as usize
    }
}

/// Pong against a built-in opponent, seen through the most recent [STATE_NUM_FRAMES] frames.
///
/// One environment step performs `1 + steps_to_skip` game steps: the action applies to the first one,
/// the paddle control is released for the others. The rewards (+1 / -1 per point) of all game steps
/// are summed up and scaled.
#[derive(Clone, Debug)]
pub struct PongEnvironment {
    settings: PongSettings,
    mechanics: PongMechanics,
    state: PongState,
}

impl PongEnvironment {
    pub fn new(settings: PongSettings) -> Result<Self> {
        let mechanics = PongMechanics::new(settings.points_to_win);
        Self::with_mechanics(settings, mechanics)
    }

    /// Reproducible games
    pub fn with_seed(
        settings: PongSettings,
        seed: u64,
    ) -> Result<Self> {
        let mechanics = PongMechanics::with_seed(settings.points_to_win, seed);
        Self::with_mechanics(settings, mechanics)
    }

    fn with_mechanics(
        settings: PongSettings,
        mechanics: PongMechanics,
    ) -> Result<Self> {
        settings.validate()?;
        let (x, y) = settings.frame_size();
        let mut env = Self {
            settings,
            mechanics,
            state: PongState::new(x, y),
        };
        env.observe()?;
        Ok(env)
    }

    pub fn settings(&self) -> &PongSettings { &self.settings }

    pub fn mechanics(&self) -> &PongMechanics { &self.mechanics }

    pub fn score(&self) -> Score { self.mechanics.score }

    fn observe(&mut self) -> Result<()> {
        let frame = downsample_max(&drawer::draw(&self.mechanics), self.settings.downsample_factor)?;
        self.state.add(frame);
        Ok(())
    }

    fn try_step(
        &mut self,
        action: PongAction,
    ) -> Result<(f32, bool)> {
        let mut reward_sum = 0.0;
        for sub_step in 0..=self.settings.steps_to_skip {
            let control = match sub_step {
                0 => action.into(),
                _ => PaddleControl::None,
            };
            reward_sum += self.mechanics.time_step(control)?.reward();
            if self.mechanics.finished() {
                break;
            }
        }
        self.observe()?;
        Ok((reward_sum * self.settings.reward_scale, self.mechanics.finished()))
    }
}

impl Environment for PongEnvironment {
    type S = PongState;
    type A = PongAction;

    /// New game; the state shows blank frames before the first observation
    fn reset(&mut self) {
        self.mechanics.reset();
        let (x, y) = self.settings.frame_size();
        self.state = PongState::new(x, y);
        if let Err(e) = self.observe() {
            log::error!("observing the initial game state failed: {}", e);
        }
    }

    fn state(&self) -> &Self::S { &self.state }

    fn step(
        &mut self,
        action: Self::A,
    ) -> (&Self::S, f32, bool) {
        match self.try_step(action) {
            Ok((reward, done)) => (&self.state, reward, done),
            Err(e) => {
                // can't continue a broken game
                log::error!("game step failed: {}", e);
                (&self.state, 0.0, true)
            }
        }
    }

    /// winning by at least half of the points
    fn episode_reward_goal_mean(&self) -> f32 { 0.5 * self.settings.points_to_win as f32 * self.settings.reward_scale }
}
