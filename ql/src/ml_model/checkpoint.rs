use std::fs;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::ml_model::model::DeepQLearningModel;
use crate::prelude::QlError;

pub const DEFAULT_MAX_TO_KEEP: usize = 5;
const CHECKPOINT_EXTENSION: &str = "json";

/// A directory of numbered model checkpoints `<base_name>-<step>.json`.
/// Only the `max_to_keep` most recent ones survive a [CheckpointStore::save].
#[derive(Clone, Debug)]
pub struct CheckpointStore {
    dir: PathBuf,
    base_name: String,
    max_to_keep: usize,
}

impl CheckpointStore {
    pub fn new(
        dir: impl Into<PathBuf>,
        base_name: &str,
        max_to_keep: usize,
    ) -> Result<Self> {
        let dir = dir.into();
        if base_name.is_empty() || base_name.contains(std::path::MAIN_SEPARATOR) {
            return Err(QlError(format!("invalid checkpoint base name '{}'", base_name)).into());
        }
        if max_to_keep == 0 {
            return Err(QlError::from("max_to_keep must be at least 1").into());
        }
        fs::create_dir_all(&dir).with_context(|| format!("creating checkpoint directory {}", dir.display()))?;
        Ok(Self {
            dir,
            base_name: base_name.to_owned(),
            max_to_keep,
        })
    }

    pub fn dir(&self) -> &Path { &self.dir }

    pub fn path_for(
        &self,
        step: usize,
    ) -> PathBuf {
        self.dir.join(format!("{}-{}.{}", self.base_name, step, CHECKPOINT_EXTENSION))
    }

    pub fn save<M: DeepQLearningModel>(
        &self,
        model: &M,
        step: usize,
    ) -> Result<PathBuf> {
        let path = self.path_for(step);
        model.write_checkpoint(&path)?;
        log::debug!("wrote checkpoint {}", path.display());
        self.prune()?;
        Ok(path)
    }

    /// All checkpoints of this store, ascending by step
    pub fn checkpoints(&self) -> Result<Vec<(usize, PathBuf)>> {
        let dir = self
            .dir
            .to_str()
            .ok_or_else(|| QlError(format!("checkpoint directory {} is not valid UTF-8", self.dir.display())))?;
        let pattern = format!(
            "{}/{}-*.{}",
            glob::Pattern::escape(dir),
            glob::Pattern::escape(&self.base_name),
            CHECKPOINT_EXTENSION
        );

        let prefix = format!("{}-", self.base_name);
        let mut result = vec![];
        for entry in glob::glob(&pattern)? {
            let path = entry?;
            let step = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.strip_prefix(&prefix))
                .and_then(|s| s.parse::<usize>().ok());
            if let Some(step) = step {
                result.push((step, path));
            }
        }
        result.sort_by_key(|(step, _)| *step);
        Ok(result)
    }

    pub fn latest(&self) -> Result<Option<PathBuf>> {
        Ok(self.checkpoints()?.pop().map(|(_, path)| path))
    }

    fn prune(&self) -> Result<()> {
        let checkpoints = self.checkpoints()?;
        let surplus = checkpoints.len().saturating_sub(self.max_to_keep);
        for (_, path) in checkpoints.into_iter().take(surplus) {
            fs::remove_file(&path).with_context(|| format!("removing old checkpoint {}", path.display()))?;
            log::trace!("removed checkpoint {}", path.display());
        }
        Ok(())
    }
}

/// Writes to a temporary sibling file first, then renames it over `file`.
pub fn write_json<T: Serialize>(
    file: &Path,
    value: &T,
) -> Result<()> {
    let tmp_file = file.with_extension("tmp");
    {
        let mut writer = BufWriter::new(File::create(&tmp_file).with_context(|| format!("creating {}", tmp_file.display()))?);
        serde_json::to_writer(&mut writer, value)?;
        writer.flush()?;
    }
    fs::rename(&tmp_file, file).with_context(|| format!("renaming {} to {}", tmp_file.display(), file.display()))?;
    Ok(())
}

pub fn read_json<T: DeserializeOwned>(file: &Path) -> Result<T> {
    let reader = BufReader::new(File::open(file).with_context(|| format!("opening checkpoint {}", file.display()))?);
    let value = serde_json::from_reader(reader).with_context(|| format!("parsing checkpoint {}", file.display()))?;
    Ok(value)
}
