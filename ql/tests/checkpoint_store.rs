use std::rc::Rc;

use anyhow::Result;
use ndarray::Array1;

use common::corridor_model;
use ql::ml_model::checkpoint::CheckpointStore;
use ql::ml_model::model::DeepQLearningModel;
use ql::ml_model::optimizer::{Optimizer, OptimizerKind};
use ql::ml_model::q_learning_model::QLearningMlpModel;
use ql::ml_model::mlp::MlpConfig;
use ql::test::corridor_test_environment::{CorridorAction, CorridorState, CorridorTestEnvironment, CORRIDOR_LEN};

mod common;

fn assert_close(
    actual: &Array1<f32>,
    expected: &Array1<f32>,
) {
    assert_eq!(actual.len(), expected.len());
    for (a, e) in actual.iter().zip(expected.iter()) {
        assert!((a - e).abs() < 1e-5, "{} != {}", actual, expected);
    }
}

#[test]
fn test_keeps_most_recent_checkpoints() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = CheckpointStore::new(dir.path().join("nested"), "model", 2)?;
    assert_eq!(store.latest()?, None);

    let model = corridor_model()?;
    for step in [5, 100, 20] {
        store.save(&model, step)?;
    }

    let steps: Vec<usize> = store.checkpoints()?.into_iter().map(|(step, _)| step).collect();
    assert_eq!(steps, vec![20, 100]);
    assert_eq!(store.latest()?, Some(store.path_for(100)));
    Ok(())
}

#[test]
fn test_checkpoint_restores_trained_model() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = CheckpointStore::new(dir.path(), "model", 5)?;

    let mut model = corridor_model()?;
    let state = Rc::new(CorridorState::default());
    for _ in 0..20 {
        model.train(&[&state], &[CorridorAction::Right], &Array1::from(vec![1.0]))?;
    }
    let trained_q = model.predict_q_values(&state);
    let file = store.save(&model, 20)?;

    let mut restored = corridor_model()?;
    assert_ne!(restored.predict_q_values(&state), trained_q);
    restored.read_checkpoint(&file)?;
    assert_close(&restored.predict_q_values(&state), &trained_q);

    let loaded = QLearningMlpModel::<CorridorTestEnvironment>::load(&file)?;
    assert_close(&loaded.predict_q_values(&state), &trained_q);
    assert_eq!(loaded.optimizer().kind(), model.optimizer().kind());
    Ok(())
}

#[test]
fn test_rejects_invalid_store() {
    let dir = tempfile::tempdir().unwrap();
    assert!(CheckpointStore::new(dir.path(), "", 5).is_err());
    assert!(CheckpointStore::new(dir.path(), "model", 0).is_err());
}

#[test]
fn test_diverged_model_is_not_saved() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = CheckpointStore::new(dir.path(), "model", 5)?;
    let mut model = QLearningMlpModel::<CorridorTestEnvironment>::init(
        &MlpConfig::new(CORRIDOR_LEN, vec![16], 3),
        Optimizer::new(OptimizerKind::Sgd, 1e30),
    )?;

    let state = Rc::new(CorridorState::default());
    for _ in 0..10 {
        if !model.predict_q_values(&state).iter().all(|q| q.is_finite()) {
            break;
        }
        model.train(&[&state], &[CorridorAction::Right], &Array1::from(vec![1.0]))?;
    }
    assert!(!model.predict_q_values(&state).iter().all(|q| q.is_finite()));

    assert!(store.save(&model, 10).is_err());
    assert_eq!(store.latest()?, None);
    Ok(())
}

#[test]
fn test_rejects_checkpoint_with_invalid_learning_rate() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = CheckpointStore::new(dir.path(), "model", 5)?;
    let file = store.save(&corridor_model()?, 1)?;

    let mut data: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&file)?)?;
    data["learning_rate"] = serde_json::json!(-1.0);
    std::fs::write(&file, data.to_string())?;

    assert!(QLearningMlpModel::<CorridorTestEnvironment>::load(&file).is_err());
    Ok(())
}
