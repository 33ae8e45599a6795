use anyhow::Result;

use pong_ql::experiment::{self, ExperimentConfig, PongModel, CHECKPOINT_BASE_NAME};
use pong_ql::plot::plot_training_curves;
use pong_ql::run_notes::{RunNotes, SAMPLE_NOTES_PATH};
use ql::ml_model::checkpoint::{CheckpointStore, DEFAULT_MAX_TO_KEEP};
use ql::ml_model::optimizer::OptimizerKind;

/// The sample note, cut down to a quick run of single point games
fn quick_config(episodes: usize) -> Result<ExperimentConfig> {
    let mut notes = RunNotes::read(&SAMPLE_NOTES_PATH)?;
    notes.set(&format!("episodes = {}", episodes))?;
    notes.set("n_steps_to_skip=2")?;
    let mut config = ExperimentConfig::from_notes(&notes.hyperparameters()?);
    config.settings.downsample_factor = 8;
    config.settings.points_to_win = 1;
    config.hidden_layers = vec![16];
    config.parameter.metrics_after_steps = 5;
    config.seed = Some(11);
    Ok(config)
}

#[test]
fn test_train_and_plot() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = CheckpointStore::new(dir.path().join("checkpoints"), CHECKPOINT_BASE_NAME, DEFAULT_MAX_TO_KEEP)?;
    let config = quick_config(2)?;
    assert_eq!(config.optimizer, OptimizerKind::Adam);
    assert_eq!(config.settings.steps_to_skip, 2);

    let report = experiment::train(&config, Some(store.clone()), false)?;

    assert_eq!(report.summaries.len(), 2);
    for s in &report.summaries {
        assert!(s.reward == 1.0 || s.reward == -1.0, "{:?}", s);
    }
    assert_eq!(report.steps, report.summaries.iter().map(|s| s.steps).sum::<usize>());
    assert!(!report.metrics.is_empty());

    let checkpoint = report.latest_checkpoint.expect("checkpoint written");
    assert_eq!(checkpoint, store.path_for(report.steps));
    let model = PongModel::load(&checkpoint)?;
    assert_eq!(model.network().input_len(), config.settings.feature_len());

    let plot_file = dir.path().join("curves.svg");
    plot_training_curves(&report.metrics, &plot_file)?;
    assert!(plot_file.is_file());
    Ok(())
}

#[test]
fn test_resume_continues_step_count() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = CheckpointStore::new(dir.path(), CHECKPOINT_BASE_NAME, 2)?;
    let config = quick_config(1)?;

    let first = experiment::train(&config, Some(store.clone()), false)?;
    let second = experiment::train(&config, Some(store.clone()), true)?;

    assert_eq!(second.steps, first.steps + second.summaries[0].steps);
    assert_eq!(second.latest_checkpoint, Some(store.path_for(second.steps)));
    assert!(store.checkpoints()?.len() <= 2);
    Ok(())
}

#[test]
fn test_training_without_store() -> Result<()> {
    let report = experiment::train(&quick_config(1)?, None, false)?;
    assert_eq!(report.summaries.len(), 1);
    assert_eq!(report.latest_checkpoint, None);
    Ok(())
}
