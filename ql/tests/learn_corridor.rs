use std::sync::{Arc, RwLock};

use anyhow::Result;

use common::corridor_model;
use ql::learn::greedy_player::play_episode;
use ql::learn::self_driving_q_learner::{ActionSelection, EpsilonDecay, Parameter, SelfDrivingQLearner};
use ql::ml_model::checkpoint::CheckpointStore;
use ql::prelude::Environment;
use ql::test::corridor_test_environment::{CorridorAction, CorridorTestEnvironment, CORRIDOR_LEN};

mod common;

fn corridor_parameter() -> Parameter {
    Parameter {
        gamma: 0.9,
        epsilon_max: 1.0,
        epsilon_min: 0.0,
        epsilon_decay: EpsilonDecay::PerEpisode { episodes: 250 },
        epsilon_pure_random_steps: 100,
        action_selection: ActionSelection::Greedy,
        batch_size: 16,
        include_most_recent: true,
        max_steps_per_episode: 50,
        history_buffer_len: 2_000,
        update_after_actions: 1,
        update_target_network_after_num_steps: 50,
        episode_reward_history_buffer_len: 20,
        stats_after_steps: 1_000,
        metrics_after_steps: 25,
        lowest_episode_reward_goal_threshold_pct: 0.5,
        checkpoint_after_episodes: 100,
    }
}

#[test]
fn test_learn_corridor() -> Result<()> {
    let environment = Arc::new(RwLock::new(CorridorTestEnvironment::new()));
    let checkpoint_dir = tempfile::tempdir()?;
    let store = CheckpointStore::new(checkpoint_dir.path(), "corridor", 3)?;

    let mut learner = SelfDrivingQLearner::new(Arc::clone(&environment), corridor_parameter(), corridor_model()?)?
        .with_seed(42)
        .with_checkpoint_store(store.clone());
    assert!(!learner.solved());

    let summaries = learner.learn_episodes(300)?;
    assert!(!summaries.is_empty());
    assert_eq!(learner.episode_count(), summaries.len());
    assert!(learner.epsilon() < 1.0);
    assert!(!learner.metrics().is_empty());
    assert!(learner.metrics().iter().any(|m| m.loss.is_some()));
    assert!(store.latest()?.is_some());
    assert!(store.checkpoints()?.len() <= 3);

    let mut env = CorridorTestEnvironment::new();
    let mut actions = vec![];
    let outcome = play_episode(&mut env, learner.model(), 50, |_, action, _| {
        actions.push(action);
        true
    })?;
    assert!(outcome.done);
    assert!(outcome.reward >= env.episode_reward_goal_mean(), "greedy play: {:?}", actions);
    assert_eq!(actions, vec![CorridorAction::Right; CORRIDOR_LEN / 2]);
    Ok(())
}

#[test]
fn test_play_episode_stops_on_callback() -> Result<()> {
    let model = corridor_model()?;
    let mut env = CorridorTestEnvironment::new();
    let outcome = play_episode(&mut env, &model, 50, |_, _, _| false)?;
    assert_eq!(outcome.steps, 1);
    Ok(())
}

#[test]
fn test_invalid_parameter_is_rejected() -> Result<()> {
    let environment = Arc::new(RwLock::new(CorridorTestEnvironment::new()));
    let mut param = corridor_parameter();
    param.history_buffer_len = param.batch_size;
    assert!(SelfDrivingQLearner::new(environment, param, corridor_model()?).is_err());
    Ok(())
}
