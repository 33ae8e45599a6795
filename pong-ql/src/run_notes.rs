use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Context;
use lazy_static::lazy_static;

use ql::learn::self_driving_q_learner::ActionSelection;
use ql::ml_model::optimizer::OptimizerKind;

use crate::expr;

pub const LEARNING_RATE: &str = "learning_rate";
pub const OPTIMIZER: &str = "optimizer";
pub const GAMMA: &str = "gamma";
pub const BATCH_SIZE: &str = "batch_size";
pub const REPLAY_MEMORY: &str = "replay_memory";
pub const REWARD_SCALE: &str = "reward_scale";
pub const EPSILON: &str = "epsilon";
pub const EPSILON_MIN: &str = "epsilon_min";
pub const ACTION_SELECTION: &str = "action_selection";
pub const STEPS_TO_SKIP: &str = "steps_to_skip";
pub const EPISODES: &str = "episodes";

lazy_static! {
    /// alternative spellings found in older notes
    static ref KEY_ALIASES: Vec<(&'static str, &'static str)> = vec![
        ("lr", LEARNING_RATE),
        ("discount", GAMMA),
        ("discount_factor", GAMMA),
        ("replay_memory_size", REPLAY_MEMORY),
        ("replay_memory_capacity", REPLAY_MEMORY),
        ("memory", REPLAY_MEMORY),
        ("epsilon0", EPSILON),
        ("epsilon_max", EPSILON),
        ("epsilon_start", EPSILON),
        ("epsilon_final", EPSILON_MIN),
        ("n_steps_to_skip", STEPS_TO_SKIP),
        ("step_skip", STEPS_TO_SKIP),
        ("frame_skip", STEPS_TO_SKIP),
        ("max_episodes", EPISODES),
        ("num_episodes", EPISODES),
        ("exploration", ACTION_SELECTION),
        ("action_sampling", ACTION_SELECTION),
    ];
    /// The note of the reference run
    pub static ref SAMPLE_NOTES_PATH: PathBuf = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("notes/pong_run.txt");
}

#[derive(Debug, Clone, PartialEq)]
pub enum NotesError {
    MissingSeparator { line: usize },
    EmptyKey { line: usize },
    DuplicateKey { key: String, line: usize },
    InvalidValue { key: String, value: String, reason: String },
    OutOfRange { key: String, value: String, reason: String },
}

impl Display for NotesError {
    fn fmt(
        &self,
        f: &mut Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            NotesError::MissingSeparator { line } => write!(f, "line {}: expected 'key = value'", line),
            NotesError::EmptyKey { line } => write!(f, "line {}: empty key", line),
            NotesError::DuplicateKey { key, line } => write!(f, "line {}: duplicate key '{}'", line, key),
            NotesError::InvalidValue { key, value, reason } => write!(f, "invalid value '{}' for '{}': {}", value, key, reason),
            NotesError::OutOfRange { key, value, reason } => write!(f, "value '{}' for '{}' out of range: {}", value, key, reason),
        }
    }
}

impl std::error::Error for NotesError {}

/// One `key = value` line of a note
#[derive(Debug, Clone, PartialEq)]
pub struct NoteEntry {
    /// normalized, aliases resolved
    pub key: String,
    pub value: String,
    /// 1-based; 0 for entries not read from a note
    pub line: usize,
}

impl NoteEntry {
    pub fn parse_line(
        text: &str,
        line: usize,
    ) -> Result<Self, NotesError> {
        let (key, value) = text.split_once('=').ok_or(NotesError::MissingSeparator { line })?;
        let key = canonical_key(key);
        if key.is_empty() {
            return Err(NotesError::EmptyKey { line });
        }
        Ok(NoteEntry {
            key,
            value: value.trim().to_string(),
            line,
        })
    }
}

/// trimmed, lower case, spaces and dashes replaced by underscores, aliases resolved
pub fn canonical_key(key: &str) -> String {
    let normalized: String = key
        .trim()
        .chars()
        .map(|c| match c {
            ' ' | '-' => '_',
            c => c.to_ascii_lowercase(),
        })
        .collect();
    match KEY_ALIASES.iter().find(|(alias, _)| *alias == normalized) {
        Some((_, key)) => key.to_string(),
        None => normalized,
    }
}

/// Experiment note: a block of `key = value` lines, followed by free commentary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunNotes {
    entries: Vec<NoteEntry>,
    commentary: String,
}

impl RunNotes {
    pub fn parse(text: &str) -> Result<Self, NotesError> {
        let lines: Vec<&str> = text.lines().collect();
        let mut notes = RunNotes::default();

        for (idx, &line) in lines.iter().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            if !trimmed.contains('=') {
                notes.commentary = lines[idx..].join("\n").trim_end().to_string();
                break;
            }
            let entry = NoteEntry::parse_line(trimmed, idx + 1)?;
            if notes.get(&entry.key).is_some() {
                return Err(NotesError::DuplicateKey {
                    key: entry.key,
                    line: idx + 1,
                });
            }
            notes.entries.push(entry);
        }
        Ok(notes)
    }

    pub fn read(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading notes {}", path.display()))?;
        let notes = Self::parse(&text).with_context(|| format!("parsing notes {}", path.display()))?;
        Ok(notes)
    }

    pub fn entries(&self) -> &[NoteEntry] { &self.entries }

    pub fn commentary(&self) -> &str { &self.commentary }

    pub fn get(
        &self,
        key: &str,
    ) -> Option<&str> {
        let key = canonical_key(key);
        self.entries.iter().find(|e| e.key == key).map(|e| e.value.as_str())
    }

    /// Overrides (or adds) a value by a `key=value` assignment
    pub fn set(
        &mut self,
        assignment: &str,
    ) -> Result<(), NotesError> {
        let entry = NoteEntry::parse_line(assignment, 0)?;
        match self.entries.iter_mut().find(|e| e.key == entry.key) {
            Some(existing) => existing.value = entry.value,
            None => self.entries.push(entry),
        }
        Ok(())
    }

    pub fn hyperparameters(&self) -> Result<Hyperparameters, NotesError> {
        let mut h = Hyperparameters::default();

        if let Some(v) = self.get(LEARNING_RATE) {
            h.learning_rate = number(LEARNING_RATE, v)? as f32;
        }
        if let Some(v) = self.get(OPTIMIZER) {
            h.optimizer = parsed(OPTIMIZER, v)?;
        }
        if let Some(v) = self.get(GAMMA) {
            h.gamma = number(GAMMA, v)? as f32;
        }
        if let Some(v) = self.get(BATCH_SIZE) {
            h.batch_size = whole_number(BATCH_SIZE, v)?;
        }
        if let Some(v) = self.get(REPLAY_MEMORY) {
            h.replay_memory = whole_number(REPLAY_MEMORY, v)?;
        }
        if let Some(v) = self.get(REWARD_SCALE) {
            h.reward_scale = number(REWARD_SCALE, v)? as f32;
        }
        if let Some(v) = self.get(EPSILON) {
            h.epsilon = number(EPSILON, v)?;
        }
        if let Some(v) = self.get(EPSILON_MIN) {
            h.epsilon_min = number(EPSILON_MIN, v)?;
        }
        if let Some(v) = self.get(ACTION_SELECTION) {
            h.action_selection = parsed(ACTION_SELECTION, v)?;
        }
        if let Some(v) = self.get(STEPS_TO_SKIP) {
            h.steps_to_skip = whole_number(STEPS_TO_SKIP, v)?;
        }
        if let Some(v) = self.get(EPISODES) {
            h.episodes = whole_number(EPISODES, v)?;
        }

        h.validate()?;
        Ok(h)
    }
}

impl FromStr for RunNotes {
    type Err = NotesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> { Self::parse(s) }
}

impl Display for RunNotes {
    fn fmt(
        &self,
        f: &mut Formatter<'_>,
    ) -> std::fmt::Result {
        for e in &self.entries {
            writeln!(f, "{} = {}", e.key, e.value)?;
        }
        if !self.commentary.is_empty() {
            if !self.entries.is_empty() {
                writeln!(f)?;
            }
            writeln!(f, "{}", self.commentary)?;
        }
        Ok(())
    }
}

/// Typed view of the well-known note keys
#[derive(Debug, Clone, PartialEq)]
pub struct Hyperparameters {
    pub learning_rate: f32,
    pub optimizer: OptimizerKind,
    pub gamma: f32,
    pub batch_size: usize,
    pub replay_memory: usize,
    pub reward_scale: f32,
    pub epsilon: f64,
    pub epsilon_min: f64,
    pub action_selection: ActionSelection,
    pub steps_to_skip: usize,
    pub episodes: usize,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            optimizer: OptimizerKind::Sgd,
            gamma: (-1.0_f32 / 120.0).exp(),
            batch_size: 10,
            replay_memory: 1000,
            reward_scale: 1.0,
            epsilon: 0.9,
            epsilon_min: 0.0,
            action_selection: ActionSelection::Softmax,
            steps_to_skip: 1,
            episodes: 100,
        }
    }
}

impl Hyperparameters {
    pub fn validate(&self) -> Result<(), NotesError> {
        let out_of_range = |key: &str, value: String, reason: &str| {
            Err(NotesError::OutOfRange {
                key: key.to_string(),
                value,
                reason: reason.to_string(),
            })
        };

        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return out_of_range(LEARNING_RATE, self.learning_rate.to_string(), "must be positive and finite");
        }
        if !(self.gamma > 0.0 && self.gamma <= 1.0) {
            return out_of_range(GAMMA, self.gamma.to_string(), "must be in (0, 1]");
        }
        if self.batch_size == 0 {
            return out_of_range(BATCH_SIZE, self.batch_size.to_string(), "must be at least 1");
        }
        if self.replay_memory <= self.batch_size {
            return out_of_range(REPLAY_MEMORY, self.replay_memory.to_string(), "must exceed the batch size");
        }
        if !(self.reward_scale > 0.0 && self.reward_scale.is_finite()) {
            return out_of_range(REWARD_SCALE, self.reward_scale.to_string(), "must be positive and finite");
        }
        if !(0.0..=1.0).contains(&self.epsilon) {
            return out_of_range(EPSILON, self.epsilon.to_string(), "must be in [0, 1]");
        }
        if !(0.0 <= self.epsilon_min && self.epsilon_min <= self.epsilon) {
            return out_of_range(EPSILON_MIN, self.epsilon_min.to_string(), "must be in [0, epsilon]");
        }
        if self.episodes == 0 {
            return out_of_range(EPISODES, self.episodes.to_string(), "must be at least 1");
        }
        Ok(())
    }
}

impl Display for Hyperparameters {
    fn fmt(
        &self,
        f: &mut Formatter<'_>,
    ) -> std::fmt::Result {
        writeln!(f, "{} = {}", LEARNING_RATE, self.learning_rate)?;
        writeln!(f, "{} = {}", OPTIMIZER, self.optimizer)?;
        writeln!(f, "{} = {:.6}", GAMMA, self.gamma)?;
        writeln!(f, "{} = {}", BATCH_SIZE, self.batch_size)?;
        writeln!(f, "{} = {}", REPLAY_MEMORY, self.replay_memory)?;
        writeln!(f, "{} = {}", REWARD_SCALE, self.reward_scale)?;
        writeln!(f, "{} = {}", EPSILON, self.epsilon)?;
        writeln!(f, "{} = {}", EPSILON_MIN, self.epsilon_min)?;
        writeln!(f, "{} = {}", ACTION_SELECTION, self.action_selection)?;
        writeln!(f, "{} = {}", STEPS_TO_SKIP, self.steps_to_skip)?;
        write!(f, "{} = {}", EPISODES, self.episodes)
    }
}

/// The value without a trailing `# remark`
fn strip_hash_remark(value: &str) -> &str {
    match value.find('#') {
        Some(idx) => value[..idx].trim_end(),
        None => value,
    }
}

/// `"0.9 (annealed linearly)"` => `"0.9"`; `None` if there is no such remark
fn strip_parenthesized_remark(value: &str) -> Option<&str> {
    if !value.ends_with(')') {
        return None;
    }
    let mut depth = 0_i32;
    for (idx, c) in value.char_indices().rev() {
        match c {
            ')' => depth += 1,
            '(' => {
                depth -= 1;
                if depth == 0 {
                    // `exp(...)` is a call, not a remark
                    let before = &value[..idx];
                    let prefix = before.trim_end();
                    return match prefix.is_empty() || prefix.len() == before.len() {
                        true => None,
                        false => Some(prefix),
                    };
                }
            }
            _ => (),
        }
    }
    None
}

/// Parses `value` as a whole, or - failing that - without its trailing remark
fn with_remark_fallback<T, E: Display>(
    key: &str,
    value: &str,
    parse: impl Fn(&str) -> Result<T, E>,
) -> Result<T, NotesError> {
    let value = strip_hash_remark(value);
    match parse(value) {
        Ok(v) => Ok(v),
        Err(e) => match strip_parenthesized_remark(value).map(&parse) {
            Some(Ok(v)) => Ok(v),
            _ => Err(NotesError::InvalidValue {
                key: key.to_string(),
                value: value.to_string(),
                reason: e.to_string(),
            }),
        },
    }
}

fn number(
    key: &str,
    value: &str,
) -> Result<f64, NotesError> {
    with_remark_fallback(key, value, expr::eval)
}

fn whole_number(
    key: &str,
    value: &str,
) -> Result<usize, NotesError> {
    let v = number(key, value)?;
    if v < 0.0 || v.fract() != 0.0 || v > u32::MAX as f64 {
        return Err(NotesError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: "not a non-negative whole number".to_string(),
        });
    }
    Ok(v as usize)
}

fn parsed<T>(
    key: &str,
    value: &str,
) -> Result<T, NotesError>
where
    T: FromStr,
    T::Err: Display,
{
    with_remark_fallback(key, value, |s: &str| s.parse::<T>())
}
