use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use anyhow::Result;
use rand::rngs::StdRng;
use rand::SeedableRng;

use pong::environment::pong_environment::{PongAction, PongEnvironment, PongSettings};
use ql::learn::metrics::MetricsSample;
use ql::learn::self_driving_q_learner::{EpisodeSummary, EpsilonDecay, Parameter, SelfDrivingQLearner};
use ql::ml_model::checkpoint::CheckpointStore;
use ql::ml_model::mlp::MlpConfig;
use ql::ml_model::optimizer::{Optimizer, OptimizerKind};
use ql::ml_model::q_learning_model::QLearningMlpModel;
use ql::prelude::Action;
use ql::util::format;

use crate::run_notes::Hyperparameters;

pub type PongModel = QLearningMlpModel<PongEnvironment>;

pub const CHECKPOINT_BASE_NAME: &str = "pong";
pub const HIDDEN_LAYERS: [usize; 1] = [256];
/// A game has no step limit of its own
pub const MAX_STEPS_PER_EPISODE: usize = 100_000;
pub const METRICS_AFTER_STEPS: usize = 25;

/// Everything a training run needs, derived from the hyperparameters of a run note
#[derive(Clone, Debug, PartialEq)]
pub struct ExperimentConfig {
    pub parameter: Parameter,
    pub optimizer: OptimizerKind,
    pub learning_rate: f32,
    pub settings: PongSettings,
    pub hidden_layers: Vec<usize>,
    pub episodes: usize,
    /// reproducible games and exploration
    pub seed: Option<u64>,
}

impl ExperimentConfig {
    /// Training on every step against the online network, epsilon annealed linearly over all episodes,
    /// a checkpoint after each episode.
    pub fn from_notes(h: &Hyperparameters) -> Self {
        let parameter = Parameter {
            gamma: h.gamma,
            epsilon_max: h.epsilon,
            epsilon_min: h.epsilon_min,
            epsilon_decay: EpsilonDecay::PerEpisode { episodes: h.episodes },
            epsilon_pure_random_steps: 0,
            action_selection: h.action_selection,
            batch_size: h.batch_size,
            include_most_recent: true,
            max_steps_per_episode: MAX_STEPS_PER_EPISODE,
            history_buffer_len: h.replay_memory,
            update_after_actions: 1,
            update_target_network_after_num_steps: 0,
            metrics_after_steps: METRICS_AFTER_STEPS,
            checkpoint_after_episodes: 1,
            ..Parameter::default()
        };
        let settings = PongSettings {
            steps_to_skip: h.steps_to_skip,
            reward_scale: h.reward_scale,
            ..PongSettings::default()
        };

        Self {
            parameter,
            optimizer: h.optimizer,
            learning_rate: h.learning_rate,
            settings,
            hidden_layers: HIDDEN_LAYERS.to_vec(),
            episodes: h.episodes,
            seed: None,
        }
    }

    pub fn optimizer(&self) -> Optimizer { Optimizer::new(self.optimizer, self.learning_rate) }

    pub fn mlp_config(&self) -> MlpConfig {
        MlpConfig::new(self.settings.feature_len(), self.hidden_layers.clone(), PongAction::ACTION_SPACE as usize)
    }

    pub fn init_model(&self) -> Result<PongModel> {
        match self.seed {
            Some(seed) => PongModel::init_with_rng(&self.mlp_config(), self.optimizer(), &mut StdRng::seed_from_u64(seed)),
            None => PongModel::init(&self.mlp_config(), self.optimizer()),
        }
    }

    pub fn environment(&self) -> Result<PongEnvironment> {
        match self.seed {
            Some(seed) => PongEnvironment::with_seed(self.settings.clone(), seed),
            None => PongEnvironment::new(self.settings.clone()),
        }
    }
}

/// Result of [train]
#[derive(Debug)]
pub struct TrainingReport {
    pub summaries: Vec<EpisodeSummary>,
    pub metrics: Vec<MetricsSample>,
    /// step count at the end, continuing the one of a resumed checkpoint
    pub steps: usize,
    pub latest_checkpoint: Option<PathBuf>,
}

impl TrainingReport {
    pub fn total_reward(&self) -> f32 { self.summaries.iter().map(|s| s.reward).sum() }
}

/// Runs the configured number of episodes. With `resume`, training continues from the latest checkpoint of the
/// store (if there is one).
pub fn train(
    config: &ExperimentConfig,
    checkpoint_store: Option<CheckpointStore>,
    resume: bool,
) -> Result<TrainingReport> {
    let environment = Arc::new(RwLock::new(config.environment()?));
    let mut learner = SelfDrivingQLearner::new(environment, config.parameter.clone(), config.init_model()?)?;
    if let Some(seed) = config.seed {
        learner = learner.with_seed(seed);
    }

    if let Some(store) = &checkpoint_store {
        if resume {
            match store.checkpoints()?.pop() {
                Some((step, file)) => learner.restore_checkpoint(&file, step)?,
                None => log::warn!("no checkpoint to resume from in {}", store.dir().display()),
            }
        }
    }
    let store_for_report = checkpoint_store.clone();
    if let Some(store) = checkpoint_store {
        learner = learner.with_checkpoint_store(store);
    }

    log::info!(
        "training {} episodes, {} input features, hidden layers {:?}, optimizer {} (learning rate {})",
        format::count(config.episodes),
        format::count(config.settings.feature_len()),
        config.hidden_layers,
        config.optimizer,
        config.learning_rate
    );
    let summaries = learner.learn_episodes(config.episodes)?;

    let latest_checkpoint = match &store_for_report {
        Some(store) => store.latest()?,
        None => None,
    };
    Ok(TrainingReport {
        summaries,
        metrics: learner.metrics().to_vec(),
        steps: learner.step_count(),
        latest_checkpoint,
    })
}

#[cfg(test)]
mod tests {
    use crate::run_notes::RunNotes;

    use super::*;

    #[test]
    fn test_from_notes() {
        let notes: RunNotes = "\
lr = 0.001
optimizer = RMSProp
gamma = 0.99
batch_size = 16
replay_memory = 500
reward_scale = 0.5
epsilon = 0.8
epsilon_min = 0.05
n_steps_to_skip = 3
episodes = 40
"
        .parse()
        .unwrap();
        let config = ExperimentConfig::from_notes(&notes.hyperparameters().unwrap());

        assert_eq!(config.optimizer, OptimizerKind::RmsProp);
        assert_eq!(config.learning_rate, 0.001);
        assert_eq!(config.episodes, 40);
        assert_eq!(config.parameter.gamma, 0.99);
        assert_eq!(config.parameter.batch_size, 16);
        assert_eq!(config.parameter.history_buffer_len, 500);
        assert_eq!(config.parameter.epsilon_max, 0.8);
        assert_eq!(config.parameter.epsilon_min, 0.05);
        assert_eq!(config.parameter.epsilon_decay, EpsilonDecay::PerEpisode { episodes: 40 });
        assert_eq!(config.settings.steps_to_skip, 3);
        assert_eq!(config.settings.reward_scale, 0.5);
        assert!(config.parameter.validate().is_ok());
    }

    #[test]
    fn test_model_matches_environment() {
        let mut config = ExperimentConfig::from_notes(&Hyperparameters::default());
        config.settings.downsample_factor = 8;
        config.hidden_layers = vec![8];
        let model = config.init_model().unwrap();

        assert_eq!(model.network().input_len(), config.settings.feature_len());
        assert_eq!(model.network().output_len(), 3);
        assert_eq!(model.optimizer().kind(), OptimizerKind::Sgd);
        assert!(config.environment().is_ok());
    }
}
