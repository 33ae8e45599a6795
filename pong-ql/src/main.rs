use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};

use pong::environment::pong_environment::{PongEnvironment, PongSettings};
use pong_ql::experiment::{self, ExperimentConfig, PongModel, CHECKPOINT_BASE_NAME};
use pong_ql::plot::plot_training_curves;
use pong_ql::playback::step_view;
use pong_ql::run_notes::RunNotes;
use ql::learn::greedy_player::play_episode;
use ql::ml_model::checkpoint::{CheckpointStore, DEFAULT_MAX_TO_KEEP};
use ql::prelude::QlError;
use ql::util::format;

#[derive(Parser)]
#[command(name = "pong-ql", version, about = "Deep Q-learning Pong, driven by run notes")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Shows a run note and the hyperparameters read from it
    Notes { file: PathBuf },
    /// Trains an agent with the hyperparameters of a run note
    Train {
        #[arg(long)]
        notes: PathBuf,
        #[arg(long, default_value = "checkpoints")]
        checkpoint_dir: PathBuf,
        /// continue from the latest checkpoint
        #[arg(long)]
        resume: bool,
        /// SVG file for the training curves
        #[arg(long)]
        plot: Option<PathBuf>,
        /// overrides a note value, e.g. `--set episodes=20`
        #[arg(long = "set", value_name = "KEY=VALUE")]
        overrides: Vec<String>,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Plays games in the console with the latest checkpoint, always taking the best action
    Play {
        #[arg(long, default_value = "checkpoints")]
        checkpoint_dir: PathBuf,
        #[arg(long, default_value_t = 1)]
        games: usize,
        #[arg(long, default_value_t = 0)]
        steps_to_skip: usize,
        /// pause between two rendered frames
        #[arg(long, default_value_t = 20)]
        frame_delay_ms: u64,
    },
}

fn main() -> Result<()> {
    ql::log::init_logging();

    match Cli::parse().command {
        Command::Notes { file } => show_notes(file),
        Command::Train {
            notes,
            checkpoint_dir,
            resume,
            plot,
            overrides,
            seed,
        } => train(notes, checkpoint_dir, resume, plot, overrides, seed),
        Command::Play {
            checkpoint_dir,
            games,
            steps_to_skip,
            frame_delay_ms,
        } => play(checkpoint_dir, games, steps_to_skip, Duration::from_millis(frame_delay_ms)),
    }
}

fn show_notes(file: PathBuf) -> Result<()> {
    let notes = RunNotes::read(&file)?;
    println!("{}", notes);
    println!("---");
    println!("{}", notes.hyperparameters()?);
    Ok(())
}

fn train(
    notes_file: PathBuf,
    checkpoint_dir: PathBuf,
    resume: bool,
    plot: Option<PathBuf>,
    overrides: Vec<String>,
    seed: Option<u64>,
) -> Result<()> {
    let mut notes = RunNotes::read(&notes_file)?;
    for assignment in &overrides {
        notes.set(assignment)?;
    }
    let hyperparameters = notes.hyperparameters()?;
    log::info!("hyperparameters:\n{}", hyperparameters);

    let mut config = ExperimentConfig::from_notes(&hyperparameters);
    config.seed = seed;
    let store = CheckpointStore::new(checkpoint_dir, CHECKPOINT_BASE_NAME, DEFAULT_MAX_TO_KEEP)?;

    let report = experiment::train(&config, Some(store), resume)?;
    log::info!(
        "trained {} episodes in {} steps, total reward {:.1}",
        report.summaries.len(),
        format::count(report.steps),
        report.total_reward()
    );
    if let Some(checkpoint) = &report.latest_checkpoint {
        log::info!("latest checkpoint: {}", checkpoint.display());
    }

    if let Some(file) = plot {
        plot_training_curves(&report.metrics, &file)?;
    }
    Ok(())
}

fn play(
    checkpoint_dir: PathBuf,
    games: usize,
    steps_to_skip: usize,
    frame_delay: Duration,
) -> Result<()> {
    let store = CheckpointStore::new(checkpoint_dir, CHECKPOINT_BASE_NAME, DEFAULT_MAX_TO_KEEP)?;
    let checkpoint = store
        .latest()?
        .ok_or_else(|| QlError(format!("no checkpoint found in {}", store.dir().display())))?;
    let model = PongModel::load(&checkpoint)?;
    log::info!("playing with {}", checkpoint.display());

    let settings = PongSettings {
        steps_to_skip,
        ..PongSettings::default()
    };
    if model.network().input_len() != settings.feature_len() {
        return Err(QlError(format!(
            "checkpoint expects {} input features, the environment provides {}",
            model.network().input_len(),
            settings.feature_len()
        ))
        .into());
    }
    let mut environment = PongEnvironment::new(settings)?;

    for game in 1..=games {
        let outcome = play_episode(&mut environment, &model, experiment::MAX_STEPS_PER_EPISODE, |state, action, reward| {
            println!("{}", step_view(state, action, reward));
            thread::sleep(frame_delay);
            true
        })?;
        println!(
            "game {}/{}: {} after {} steps (reward {:.1})",
            game,
            games,
            environment.score(),
            format::count(outcome.steps),
            outcome.reward
        );
    }
    Ok(())
}
