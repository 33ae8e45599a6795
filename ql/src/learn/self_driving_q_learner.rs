use std::fmt::{Display, Formatter};
use std::rc::Rc;
use std::str::FromStr;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::Result;
use ndarray::Array1;
use rand::distributions::WeightedIndex;
use rand::prelude::Distribution;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::learn::metrics::{MetricsRecorder, MetricsSample};
use crate::learn::replay_buffer::ReplayBuffer;
use crate::ml_model::checkpoint::CheckpointStore;
use crate::ml_model::model::DeepQLearningModel;
use crate::prelude::{Action, DebugVisualizer, Environment, QlError};
use crate::util::distribution::{frequency_line, reward_histogram_line};
use crate::util::format;
use crate::util::immutable::Immutable;
use crate::util::math::{argmax, relative_spread, softmax};

/// How the agent picks an action when it does not explore randomly
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionSelection {
    /// action with the highest predicted Q-value
    Greedy,
    /// sampled from the distribution softmax(Q)
    Softmax,
}

impl Display for ActionSelection {
    fn fmt(
        &self,
        f: &mut Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            ActionSelection::Greedy => f.write_str("greedy"),
            ActionSelection::Softmax => f.write_str("softmax"),
        }
    }
}

impl FromStr for ActionSelection {
    type Err = QlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "greedy" | "argmax" | "epsilon_greedy" | "epsilon-greedy" => Ok(ActionSelection::Greedy),
            "softmax" | "boltzmann" | "epsilon_softmax" | "epsilon-softmax" | "bayesian" | "epsilon-bayesian" => Ok(ActionSelection::Softmax),
            other => Err(QlError(format!("unknown action selection '{}'", other))),
        }
    }
}

/// Reduction of the exploration rate 𝜀 from `epsilon_max` down to `epsilon_min`
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EpsilonDecay {
    /// linear, by `(epsilon_max - epsilon_min) / steps` after every step
    PerStep { steps: f64 },
    /// linear over episodes: `𝜀 = epsilon_max * (1 - e / episodes)` after the 0-based episode `e`,
    /// so the first two episodes run with `epsilon_max`
    PerEpisode { episodes: usize },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Parameter {
    /// Discount rate; (0 < 𝛾 <= 1) represents the value of future rewards. The bigger, the more farsighted the agent becomes
    pub gamma: f32,
    /// Maximum epsilon greedy parameter
    pub epsilon_max: f64,
    /// Minimum epsilon greedy parameter
    pub epsilon_min: f64,
    pub epsilon_decay: EpsilonDecay,
    // Number of steps to take only random actions and observe output
    pub epsilon_pure_random_steps: usize,
    pub action_selection: ActionSelection,
    pub batch_size: usize,
    // Always train on the most recent step, in addition to the random samples
    pub include_most_recent: bool,
    pub max_steps_per_episode: usize,
    // Maximum replay length
    pub history_buffer_len: usize,
    // Train the model after n actions
    pub update_after_actions: usize,
    // After how many steps the target network is synchronized; 0 = no separate target network
    pub update_target_network_after_num_steps: usize,
    // this determines directly the number of recent goal-achieving episodes required to consider the learning task done
    pub episode_reward_history_buffer_len: usize,
    pub stats_after_steps: usize,
    // Interval of the training curve samples; 0 = no samples
    pub metrics_after_steps: usize,
    // Percentage of total reward goal, which any single episode needs to reach (regardless of the average reward)
    pub lowest_episode_reward_goal_threshold_pct: f32,
    // 0 = only when solved or at the end of `learn_episodes`
    pub checkpoint_after_episodes: usize,
}

impl Parameter {
    fn epsilon_interval(&self) -> f64 { self.epsilon_max - self.epsilon_min }

    /// 𝜀 for the episode following the 0-based episode `finished`; `None` for a per-step decay
    pub fn epsilon_after_episode(
        &self,
        finished: usize,
    ) -> Option<f64> {
        match self.epsilon_decay {
            EpsilonDecay::PerEpisode { episodes } => {
                let remaining = 1.0 - finished as f64 / episodes as f64;
                Some(f64::max(self.epsilon_max * remaining, self.epsilon_min))
            }
            EpsilonDecay::PerStep { .. } => None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| -> Result<()> { Err(QlError(msg).into()) };
        if !(self.gamma > 0.0 && self.gamma <= 1.0) {
            return fail(format!("gamma {} must be in (0, 1]", self.gamma));
        }
        if !(0.0 <= self.epsilon_min && self.epsilon_min <= self.epsilon_max && self.epsilon_max <= 1.0) {
            return fail(format!(
                "epsilon range invalid: 0 <= {} <= {} <= 1 does not hold",
                self.epsilon_min, self.epsilon_max
            ));
        }
        match self.epsilon_decay {
            EpsilonDecay::PerStep { steps } if !(steps > 0.0) => return fail("epsilon decay steps must be positive".to_string()),
            EpsilonDecay::PerEpisode { episodes } if episodes == 0 => return fail("epsilon decay episodes must be positive".to_string()),
            _ => (),
        }
        if self.batch_size == 0 {
            return fail("batch_size must be at least 1".to_string());
        }
        if self.history_buffer_len <= self.batch_size {
            return fail(format!(
                "history_buffer_len {} must exceed batch_size {}",
                self.history_buffer_len, self.batch_size
            ));
        }
        if self.update_after_actions == 0 || self.max_steps_per_episode == 0 || self.episode_reward_history_buffer_len == 0 {
            return fail("update_after_actions, max_steps_per_episode and episode_reward_history_buffer_len must be positive".to_string());
        }
        Ok(())
    }
}

impl Default for Parameter {
    fn default() -> Self {
        Self {
            gamma: 0.99,
            epsilon_max: 1.0,
            epsilon_min: 0.1,
            epsilon_decay: EpsilonDecay::PerStep { steps: 1_000_000.0 },
            epsilon_pure_random_steps: 50_000,
            action_selection: ActionSelection::Greedy,
            batch_size: 32,
            include_most_recent: false,
            max_steps_per_episode: 10_000,
            history_buffer_len: 1_000_000,
            update_after_actions: 4,
            update_target_network_after_num_steps: 10_000,
            episode_reward_history_buffer_len: 100,
            stats_after_steps: 25_000,
            metrics_after_steps: 100,
            lowest_episode_reward_goal_threshold_pct: 0.9,
            checkpoint_after_episodes: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EpisodeSummary {
    pub episode: usize,
    pub steps: usize,
    pub reward: f32,
}

/// A self-driving Q learning algorithm.
/// It's directly connected to a (Game-) Environment and drives the speed of the steps in that environment with it's response.
///
/// Loop per step: pick an action (𝜀-random or from the model), apply it, store the transition in the
/// replay memory and - every `update_after_actions` steps - train the model on a random batch of
/// stored transitions against `r + 𝛾 · max_a' Q_target(s', a')` (just `r` for terminal steps).
pub struct SelfDrivingQLearner<E, M>
where
    E: Environment,
    M: DeepQLearningModel<E = E> + Clone,
{
    environment: Arc<RwLock<E>>,
    param: Immutable<Parameter>,
    rng: StdRng,
    model: M,
    // "target_model"
    stabilized_model: Option<M>,
    checkpoint_store: Option<CheckpointStore>,
    replay_buffer: ReplayBuffer<Rc<E::S>, E::A>,
    metrics: MetricsRecorder,
    episode_reward_goal_mean: f32,
    step_count: usize,
    episode_count: usize,
    running_reward: f32,
    ///  Epsilon greedy parameter
    epsilon: f64,
}

impl<E, M> SelfDrivingQLearner<E, M>
where
    E: Environment,
    M: DeepQLearningModel<E = E> + Clone,
{
    pub fn new(
        environment: Arc<RwLock<E>>,
        param: Parameter,
        model: M,
    ) -> Result<Self> {
        param.validate()?;
        let replay_buffer = ReplayBuffer::new(param.history_buffer_len, param.episode_reward_history_buffer_len);
        let epsilon = param.epsilon_max;
        let stabilized_model = match param.update_target_network_after_num_steps {
            0 => None,
            _ => Some(model.clone()),
        };
        let episode_reward_goal_mean = read_lock(&environment)?.episode_reward_goal_mean();

        Ok(Self {
            environment,
            param: Immutable::new(param),
            rng: StdRng::from_entropy(),
            model,
            stabilized_model,
            checkpoint_store: None,
            replay_buffer,
            metrics: MetricsRecorder::new(),
            episode_reward_goal_mean,
            step_count: 0,
            episode_count: 0,
            running_reward: 0.0,
            epsilon,
        })
    }

    pub fn with_checkpoint_store(
        mut self,
        store: CheckpointStore,
    ) -> Self {
        self.checkpoint_store = Some(store);
        self
    }

    /// Reproducible exploration and batch sampling
    pub fn with_seed(
        mut self,
        seed: u64,
    ) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Continue from a model checkpoint written at `step`, e.g. the last one of [CheckpointStore::checkpoints].
    /// Step counting goes on from there, so later checkpoints sort after the restored one.
    pub fn restore_checkpoint(
        &mut self,
        file: &std::path::Path,
        step: usize,
    ) -> Result<()> {
        self.model.read_checkpoint(file)?;
        if self.stabilized_model.is_some() {
            self.stabilized_model = Some(self.model.clone());
        }
        self.step_count = step;
        log::info!("restored model from checkpoint {}", file.display());
        Ok(())
    }

    pub fn model(&self) -> &M { &self.model }

    pub fn metrics(&self) -> &[MetricsSample] { self.metrics.samples() }

    pub fn step_count(&self) -> usize { self.step_count }

    pub fn episode_count(&self) -> usize { self.episode_count }

    pub fn epsilon(&self) -> f64 { self.epsilon }

    pub fn running_reward(&self) -> f32 { self.running_reward }

    pub fn solved(&self) -> bool {
        self.replay_buffer.episode_reward_count() >= self.param.episode_reward_history_buffer_len
            && self.running_reward >= self.episode_reward_goal_mean
            && self.replay_buffer.min_episode_reward()
                >= self.episode_reward_goal_mean * self.param.lowest_episode_reward_goal_threshold_pct
    }

    pub fn learn_till_mastered(&mut self) -> Result<()> {
        while !self.solved() {
            self.learn_episode()?;
        }
        Ok(())
    }

    /// Learns `episodes` episodes (or less, when solved before) and writes a final checkpoint
    pub fn learn_episodes(
        &mut self,
        episodes: usize,
    ) -> Result<Vec<EpisodeSummary>> {
        let mut summaries = Vec::with_capacity(episodes);
        for _ in 0..episodes {
            summaries.push(self.learn_episode()?);
            if self.solved() {
                log::info!("solved at episode {}", self.episode_count);
                return Ok(summaries);
            }
        }
        log::info!("reached {} episodes", format::count(self.episode_count));
        self.write_checkpoint()?;
        Ok(summaries)
    }

    pub fn learn_episode(&mut self) -> Result<EpisodeSummary> {
        write_lock(&self.environment)?.reset();

        let mut state = read_lock(&self.environment)?.state_as_rc();
        log::trace!("started learning episode {}", self.episode_count);

        let mut episode_reward: f32 = 0.0;
        let mut episode_steps: usize = 0;

        for _ in 0..self.param.max_steps_per_episode {
            self.step_count += 1;
            episode_steps += 1;

            let action = self.choose_action(&state)?;

            if let EpsilonDecay::PerStep { steps } = self.param.epsilon_decay {
                // Decay probability of taking random action
                self.epsilon = f64::max(self.epsilon - self.param.epsilon_interval() / steps, self.param.epsilon_min);
            }

            log::trace!("{}", state.one_line_info());
            // Apply the sampled action in our environment
            let (state_next, reward, done) = write_lock(&self.environment)?.step_as_rc(action);
            log::trace!("step with action {} resulted in reward: {:.2}, done: {}", action, reward, done);

            episode_reward += reward;
            self.metrics.record_reward(reward);

            // Save actions and states in replay buffer
            self.replay_buffer.add(action, state, Rc::clone(&state_next), reward, done);
            state = state_next;

            // Update every n-th step, once the replay buffer is beyond batch size
            if self.step_count % self.param.update_after_actions == 0 && self.replay_buffer.len() > self.param.batch_size {
                let (loss, mean_q) = self.train_on_replay_batch()?;
                if !loss.is_finite() {
                    log::warn!("training diverged at step {}: batch loss {}", format::count(self.step_count), loss);
                }
                self.metrics.record_training(loss, mean_q);
            }

            if self.param.update_target_network_after_num_steps > 0
                && self.step_count % self.param.update_target_network_after_num_steps == 0
            {
                // update the target network with new weights
                self.stabilized_model = Some(self.model.clone());
                log::debug!("target network updated at step {}", format::count(self.step_count));
            }

            if self.param.metrics_after_steps > 0 && self.step_count % self.param.metrics_after_steps == 0 {
                let sample = self.metrics.take_sample(self.step_count, self.episode_count, self.epsilon);
                log::debug!(
                    "episode: {}, step: {}, batch loss: {:.3e}, mean batch Q: {:.3e}, reward: {:.1}, reward avg: {:.2}",
                    sample.episode + 1,
                    sample.step,
                    sample.loss.unwrap_or(f32::NAN),
                    sample.mean_q.unwrap_or(f32::NAN),
                    sample.reward_sum,
                    sample.reward_moving_avg
                );
            }

            if self.param.stats_after_steps > 0 && self.step_count % self.param.stats_after_steps == 0 {
                self.learning_update_log();
            }

            if done {
                break;
            }
        }

        // Update running reward to check condition for solving
        self.replay_buffer.add_episode_reward(episode_reward);
        self.running_reward = self.replay_buffer.avg_episode_reward();
        self.episode_count += 1;

        if let Some(epsilon) = self.param.epsilon_after_episode(self.episode_count - 1) {
            self.epsilon = epsilon;
        }

        log::debug!(
            "episode {} finished after {} steps with reward {:.1}",
            self.episode_count,
            episode_steps,
            episode_reward
        );

        if self.param.checkpoint_after_episodes > 0 && self.episode_count % self.param.checkpoint_after_episodes == 0 {
            self.write_checkpoint()?;
        }

        if self.solved() {
            self.write_checkpoint()?;
            self.learning_update_log();
        }

        Ok(EpisodeSummary {
            episode: self.episode_count,
            steps: episode_steps,
            reward: episode_reward,
        })
    }

    fn write_checkpoint(&self) -> Result<()> {
        if let Some(store) = &self.checkpoint_store {
            let path = store.save(&self.model, self.step_count)?;
            log::info!("saved checkpoint {}", path.display());
        }
        Ok(())
    }

    fn choose_action(
        &mut self,
        state: &E::S,
    ) -> Result<E::A> {
        // Use epsilon-greedy for exploration
        if self.step_count < self.param.epsilon_pure_random_steps || self.epsilon > self.rng.gen_range(0_f64..1_f64) {
            // Take random action
            let a = self.rng.gen_range(0..E::A::ACTION_SPACE);
            return E::A::try_from_numeric(a);
        }

        match self.param.action_selection {
            ActionSelection::Greedy => self.model.predict_action(state),
            ActionSelection::Softmax => {
                let q_values = self.model.predict_q_values(state).to_vec();
                log::trace!("Q*: {:?}, std(Q*)/max(Q*): {:.3e}", q_values, relative_spread(&q_values));
                let idx = sample_softmax(&q_values, &mut self.rng)?;
                E::A::try_from_numeric(idx as u8)
            }
        }
    }

    /// Returns (loss, mean updated Q-value)
    fn train_on_replay_batch(&mut self) -> Result<(f32, f32)> {
        // Get indices of samples for replay buffers
        let indices = self
            .replay_buffer
            .sample_indices(&mut self.rng, self.param.batch_size, self.param.include_most_recent);
        let replay_samples = self.replay_buffer.get_many(&indices);

        // Build the updated Q-values for the sampled future states
        // Use the target model for stability
        let target_model = self.stabilized_model.as_ref().unwrap_or(&self.model);
        let max_future_rewards = target_model.batch_predict_max_future_reward(&replay_samples.state_next);

        let updated_q_values = bellman_targets(&replay_samples.reward, &replay_samples.done, &max_future_rewards, self.param.gamma);
        let mean_q = updated_q_values.mean().unwrap_or(0.0);

        let loss = self.model.train(&replay_samples.state, &replay_samples.action, &updated_q_values)?;
        Ok((loss, mean_q))
    }

    fn learning_update_log(&self) {
        let episode_rewards = self.replay_buffer.episode_rewards();
        let reward_distribution = reward_histogram_line(&episode_rewards, 1.0);
        let total_actions = self.replay_buffer.actions().len();
        let action_distribution_line = frequency_line(self.replay_buffer.actions().iter().copied());

        log::info!(
            "\n\
    episode: {}, steps: {}, 𝛾={:.4}, 𝜀={:.2}, reward_goal: {{mean >= {:.1}, low >= {:.1}}}, current_rewards: {{mean: {:.1}, low: {:.1}}}\n\
    reward_distribution: {}\n\
    action_distribution (of last {}): {}",
            format::count(self.episode_count),
            format::count(self.step_count),
            self.param.gamma,
            self.epsilon,
            self.episode_reward_goal_mean,
            self.episode_reward_goal_mean * self.param.lowest_episode_reward_goal_threshold_pct,
            self.replay_buffer.avg_episode_reward(),
            self.replay_buffer.min_episode_reward(),
            reward_distribution,
            format::count(total_actions),
            action_distribution_line
        );
    }
}

/// Q value = reward + discount factor * expected future reward.
/// For terminal steps the updated Q-value is exactly the reward (see deepmind paper).
fn bellman_targets(
    reward: &[f32],
    done: &[bool],
    max_future_reward: &Array1<f32>,
    gamma: f32,
) -> Array1<f32> {
    reward
        .iter()
        .zip(done.iter())
        .zip(max_future_reward.iter())
        .map(|((&reward, &done), &future)| if done { reward } else { reward + gamma * future })
        .collect()
}

/// Index drawn from softmax(Q)
fn sample_softmax<R: Rng>(
    q_values: &[f32],
    rng: &mut R,
) -> Result<usize> {
    match WeightedIndex::new(softmax(q_values)) {
        Ok(distribution) => Ok(distribution.sample(rng)),
        // non-finite Q-values; fall back to the best guess
        Err(_) => argmax(q_values.iter().copied()).ok_or_else(|| QlError::from("empty Q-value vector").into()),
    }
}

fn read_lock<E>(environment: &RwLock<E>) -> Result<RwLockReadGuard<'_, E>> {
    environment.read().map_err(|_| QlError::from("environment lock poisoned").into())
}

fn write_lock<E>(environment: &RwLock<E>) -> Result<RwLockWriteGuard<'_, E>> {
    environment.write().map_err(|_| QlError::from("environment lock poisoned").into())
}
