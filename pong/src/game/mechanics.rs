use std::f32::consts::{FRAC_PI_3, FRAC_PI_6};
use std::fmt::{Display, Formatter};

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::game::algebra_2d::{contact_test_circle_aabb, reflected_vector, AaBB, Circle, Pos2, Vec2};

/// TOP / LEFT corner is 0/0
pub const FIELD_LEN_X: f32 = 160.0;
pub const FIELD_LEN_Y: f32 = 160.0;

pub const POINTS_TO_WIN: u32 = 21;

pub const PADDLE_LEN_X: f32 = 4.0;
pub const PADDLE_LEN_Y: f32 = 16.0;
const AGENT_PADDLE_CENTER_X: f32 = FIELD_LEN_X - 16.0;
const OPPONENT_PADDLE_CENTER_X: f32 = 16.0;

/// pixel per time step
const PADDLE_MAX_SPEED: f32 = 4.0;
/// pixel per time step²
const PADDLE_CONTROL_ACCEL: f32 = 1.0;
/// slow down if not accelerated
const PADDLE_SLOW_DOWN_ACCEL: f32 = 0.5;
/// the opponent just follows the ball, but not faster than that
const OPPONENT_MAX_SPEED: f32 = 2.0;

pub const BALL_RADIUS: f32 = 2.0;
const BALL_SERVE_SPEED: f32 = 2.0;
const BALL_MAX_SPEED: f32 = 4.0;
const BALL_SPEED_UP_PER_HIT: f32 = 0.1;
/// deviation from the horizontal, when the ball is hit with the paddle's outermost edge
const MAX_BOUNCE_ANGLE: f32 = FRAC_PI_3;
const MAX_SERVE_ANGLE: f32 = FRAC_PI_6;
pub const SERVE_DELAY_STEPS: u32 = 20;

/// The ball moves in portions of at most that length, so it can't tunnel through a paddle
const BALL_SUB_STEP_LEN: f32 = 1.0;
// max object distance to detect a collision
const CONTACT_PREDICTION: f32 = 0.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PaddleControl {
    None,
    AccelerateUp,
    AccelerateDown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    /// right paddle, controlled from outside
    Agent,
    /// left paddle, built-in
    Opponent,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StepOutcome {
    pub point_for: Option<Side>,
}

impl StepOutcome {
    /// +1 for a point of the agent, -1 for a point of the opponent
    pub fn reward(&self) -> f32 {
        match self.point_for {
            Some(Side::Agent) => 1.0,
            Some(Side::Opponent) => -1.0,
            None => 0.0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Score {
    pub agent: u32,
    pub opponent: u32,
}

impl Display for Score {
    fn fmt(
        &self,
        f: &mut Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "agent {} : {} opponent", self.agent, self.opponent)
    }
}

#[derive(Clone, Debug)]
pub struct PongMechanics {
    pub agent_paddle: Paddle,
    pub opponent_paddle: Paddle,
    pub ball: Ball,
    pub score: Score,
    /// time steps until the ball gets served; the ball is not in play meanwhile
    pub serve_countdown: u32,
    points_to_win: u32,
    finished: bool,
    rng: StdRng,
}

impl PongMechanics {
    pub fn new(points_to_win: u32) -> Self { Self::with_rng(points_to_win, StdRng::from_entropy()) }

    pub fn with_seed(
        points_to_win: u32,
        seed: u64,
    ) -> Self {
        Self::with_rng(points_to_win, StdRng::seed_from_u64(seed))
    }

    fn with_rng(
        points_to_win: u32,
        mut rng: StdRng,
    ) -> Self {
        assert!(points_to_win > 0);
        let first_receiver = match rng.gen_bool(0.5) {
            true => Side::Agent,
            false => Side::Opponent,
        };
        let ball = Ball::served_towards(first_receiver, &mut rng);
        Self {
            agent_paddle: Paddle::initial(AGENT_PADDLE_CENTER_X),
            opponent_paddle: Paddle::initial(OPPONENT_PADDLE_CENTER_X),
            ball,
            score: Score::default(),
            serve_countdown: SERVE_DELAY_STEPS,
            points_to_win,
            finished: false,
            rng,
        }
    }

    /// Starts a new game; the random sequence continues
    pub fn reset(&mut self) {
        let rng = self.rng.clone();
        *self = Self::with_rng(self.points_to_win, rng);
    }

    pub fn finished(&self) -> bool { self.finished }

    pub fn points_to_win(&self) -> u32 { self.points_to_win }

    pub fn ball_in_play(&self) -> bool { self.serve_countdown == 0 }

    /// physically move one time step forward
    pub fn time_step(
        &mut self,
        control: PaddleControl,
    ) -> Result<StepOutcome> {
        if self.finished {
            return Ok(StepOutcome::default());
        }

        self.agent_paddle.process_input(control);
        self.agent_paddle.proceed();
        self.move_opponent();

        if self.serve_countdown > 0 {
            self.serve_countdown -= 1;
            return Ok(StepOutcome::default());
        }

        self.proceed_ball()?;
        Ok(self.check_point())
    }

    fn move_opponent(&mut self) {
        let target_y = if self.ball_in_play() && self.ball.direction.x < 0.0 {
            self.ball.shape.center.y
        } else {
            FIELD_LEN_Y / 2.0
        };
        let paddle = &mut self.opponent_paddle;
        paddle.speed = (target_y - paddle.shape.center().y).clamp(-OPPONENT_MAX_SPEED, OPPONENT_MAX_SPEED);
        paddle.proceed();
    }

    fn proceed_ball(&mut self) -> Result<()> {
        let sub_steps = (self.ball.speed / BALL_SUB_STEP_LEN).ceil().max(1.0);
        let sub_step_len = self.ball.speed / sub_steps;

        for _ in 0..sub_steps as usize {
            self.ball.shape.center += self.ball.direction * sub_step_len;
            self.ball.reflect_at_walls();
            if self.ball.bounce_off(&self.agent_paddle)? {
                log::trace!("agent hit the ball: {:?}", self.ball);
            }
            self.ball.bounce_off(&self.opponent_paddle)?;
        }
        Ok(())
    }

    fn check_point(&mut self) -> StepOutcome {
        let x = self.ball.shape.center.x;
        let r = self.ball.shape.radius;
        let point_for = if x - r > FIELD_LEN_X {
            Some(Side::Opponent)
        } else if x + r < 0.0 {
            Some(Side::Agent)
        } else {
            None
        };

        if let Some(side) = point_for {
            match side {
                Side::Agent => self.score.agent += 1,
                Side::Opponent => self.score.opponent += 1,
            }
            log::trace!("point for {:?}, score: {:?}", side, self.score);

            if self.score.agent >= self.points_to_win || self.score.opponent >= self.points_to_win {
                self.finished = true;
            } else {
                // the side, which lost the point, receives the next serve
                let receiver = match side {
                    Side::Agent => Side::Opponent,
                    Side::Opponent => Side::Agent,
                };
                self.ball = Ball::served_towards(receiver, &mut self.rng);
                self.serve_countdown = SERVE_DELAY_STEPS;
            }
        }
        StepOutcome { point_for }
    }
}

#[derive(Clone, Debug)]
pub struct Paddle {
    pub shape: AaBB,
    /// positive = downwards
    pub speed: f32,
}

impl Paddle {
    fn initial(center_x: f32) -> Self {
        Paddle {
            shape: AaBB::from_center(Pos2::new(center_x, FIELD_LEN_Y / 2.0), PADDLE_LEN_X, PADDLE_LEN_Y),
            speed: 0.0,
        }
    }

    /// calculate new paddle speed based on input or slow-down
    pub fn process_input(
        &mut self,
        control: PaddleControl,
    ) {
        self.speed = match control {
            PaddleControl::None => decrease_speed(self.speed, PADDLE_SLOW_DOWN_ACCEL),
            PaddleControl::AccelerateUp => accelerate(self.speed, -PADDLE_CONTROL_ACCEL, PADDLE_MAX_SPEED),
            PaddleControl::AccelerateDown => accelerate(self.speed, PADDLE_CONTROL_ACCEL, PADDLE_MAX_SPEED),
        }
    }

    /// physically move one time step forward; a paddle bumping into a wall stops there
    pub fn proceed(&mut self) {
        let potential_pos = self.shape.translate(Vec2::new(0.0, self.speed));

        if potential_pos.min.y <= 0.0 {
            self.shape = potential_pos.translate(Vec2::new(0.0, -potential_pos.min.y));
            self.speed = 0.0;
        } else if potential_pos.max.y >= FIELD_LEN_Y {
            self.shape = potential_pos.translate(Vec2::new(0.0, FIELD_LEN_Y - potential_pos.max.y));
            self.speed = 0.0;
        } else {
            self.shape = potential_pos;
        }
    }
}

/// A ball is a perfect round 2D structure
#[derive(Clone, Debug)]
pub struct Ball {
    pub shape: Circle,
    /// normalized
    pub direction: Vec2,
    /// pixel per time step
    pub speed: f32,
}

impl Ball {
    fn served_towards<R: Rng>(
        receiver: Side,
        rng: &mut R,
    ) -> Self {
        let angle = rng.gen_range(-MAX_SERVE_ANGLE..MAX_SERVE_ANGLE);
        let dir_x = match receiver {
            Side::Agent => 1.0,
            Side::Opponent => -1.0,
        };
        Ball {
            shape: Circle {
                center: Pos2::new(FIELD_LEN_X / 2.0, FIELD_LEN_Y / 2.0),
                radius: BALL_RADIUS,
            },
            direction: Vec2::new(dir_x * angle.cos(), angle.sin()),
            speed: BALL_SERVE_SPEED,
        }
    }

    /// top and bottom walls; the sides are open
    fn reflect_at_walls(&mut self) {
        let r = self.shape.radius;
        let y = self.shape.center.y;
        if y - r < 0.0 && self.direction.y < 0.0 {
            self.shape.center.y = 2.0 * r - y;
            self.direction = reflected_vector(self.direction, Vec2::new(0.0, 1.0));
        } else if y + r > FIELD_LEN_Y && self.direction.y > 0.0 {
            self.shape.center.y = 2.0 * (FIELD_LEN_Y - r) - y;
            self.direction = reflected_vector(self.direction, Vec2::new(0.0, -1.0));
        }
    }

    /// Returns true, if the ball was hit by the paddle.
    ///
    /// A hit on the paddle's front face sends the ball back with an angle depending on the hit
    /// position (center = straight) and speeds it up. Top or bottom face contacts just reflect.
    fn bounce_off(
        &mut self,
        paddle: &Paddle,
    ) -> Result<bool> {
        let contact = match contact_test_circle_aabb(&self.shape, &paddle.shape, CONTACT_PREDICTION)? {
            None => return Ok(false),
            Some(c) => c,
        };
        let normal = Vec2::new(contact.normal2.x, contact.normal2.y);
        if self.direction.dot(&normal) >= 0.0 {
            // already on the way out
            return Ok(false);
        }

        if normal.x.abs() >= normal.y.abs() {
            let offset = ((self.shape.center.y - paddle.shape.center().y) / (paddle.shape.half_extents().y + self.shape.radius))
                .clamp(-1.0, 1.0);
            let angle = offset * MAX_BOUNCE_ANGLE;
            let dir_x = normal.x.signum();
            self.direction = Vec2::new(dir_x * angle.cos(), angle.sin());
            self.speed = (self.speed + BALL_SPEED_UP_PER_HIT).min(BALL_MAX_SPEED);
            self.shape.center.x = match dir_x > 0.0 {
                true => paddle.shape.max.x + self.shape.radius,
                false => paddle.shape.min.x - self.shape.radius,
            };
        } else {
            self.direction = reflected_vector(self.direction, normal).normalize();
            if contact.dist < 0.0 {
                self.shape.center += normal * -contact.dist;
            }
        }
        Ok(true)
    }
}

pub trait Assert {
    fn assert(&self);
}

impl Assert for Paddle {
    fn assert(&self) {
        assert!(self.shape.min.y >= 0.0);
        assert!(self.shape.max.y <= FIELD_LEN_Y);
    }
}

impl Assert for Ball {
    fn assert(&self) {
        assert!(self.shape.center.y - self.shape.radius >= 0.0);
        assert!(self.shape.center.y + self.shape.radius <= FIELD_LEN_Y);
        assert!((self.direction.norm() - 1.0).abs() < 0.001);
    }
}

fn granulate_speed(speed: f32) -> f32 { (speed * 1000.0).round() / 1000.0 }

/// speed: LEN per TP
/// break_acceleration: LEN per TP²  (a positive amount)
fn decrease_speed(
    speed: f32,
    break_acceleration: f32,
) -> f32 {
    assert!(break_acceleration >= 0.0);
    if speed > 0.0 {
        granulate_speed(speed - break_acceleration).max(0.0)
    } else if speed < 0.0 {
        granulate_speed(speed + break_acceleration).min(0.0)
    } else {
        0.0
    }
}

/// positive or negative speed and acceleration
fn accelerate(
    speed: f32,
    acceleration: f32,
    speed_limit_abs: f32,
) -> f32 {
    assert!(!speed_limit_abs.is_sign_negative());
    granulate_speed((speed + acceleration).clamp(-speed_limit_abs, speed_limit_abs))
}
