//! Single-event checkpoint: enough to re-run the in-flight event after a kill.

use crate::common::RunConfig;
use crate::domain::{EventError, EventResult, InitialCondition};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub config: RunConfig,
    pub initial_condition: InitialCondition,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointManager {
    path: PathBuf,
}

impl CheckpointManager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the checkpoint atomically: the record is written to a sibling
    /// temporary file which is then renamed over the target.
    pub fn save(&self, config: &RunConfig, ic: &InitialCondition) -> EventResult<()> {
        let write_error = |reason: String| {
            EventError::io_system(
                "IO.CHECKPOINT_WRITE",
                format!(
                    "failed to write checkpoint '{}': {}",
                    self.path.display(),
                    reason
                ),
            )
        };
        let record = CheckpointRecord {
            config: config.clone(),
            initial_condition: ic.clone(),
        };
        let content =
            serde_json::to_vec(&record).map_err(|source| write_error(source.to_string()))?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(|source| write_error(source.to_string()))?;
        let mut temp =
            NamedTempFile::new_in(dir).map_err(|source| write_error(source.to_string()))?;
        temp.write_all(&content)
            .and_then(|()| temp.as_file().sync_all())
            .map_err(|source| write_error(source.to_string()))?;
        temp.persist(&self.path)
            .map_err(|source| write_error(source.error.to_string()))?;
        debug!(path = %self.path.display(), event = ic.index, "checkpoint saved");
        Ok(())
    }

    /// Remove the checkpoint; a checkpoint that does not exist is already clear.
    pub fn clear(&self) -> EventResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(source) if source.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(EventError::io_system(
                "IO.CHECKPOINT_CLEAR",
                format!(
                    "failed to remove checkpoint '{}': {}",
                    self.path.display(),
                    source
                ),
            )),
        }
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }
}

/// Read a checkpoint; the run it records must have been writing to `path`.
pub fn load(path: &Path) -> EventResult<CheckpointRecord> {
    let content = fs::read(path).map_err(|source| {
        EventError::io_system(
            "IO.CHECKPOINT_READ",
            format!("failed to read checkpoint '{}': {}", path.display(), source),
        )
    })?;
    let record: CheckpointRecord = serde_json::from_slice(&content).map_err(|source| {
        EventError::input_validation(
            "INPUT.CHECKPOINT_FORMAT",
            format!("checkpoint '{}' is malformed: {}", path.display(), source),
        )
    })?;

    match record.config.checkpoint.as_deref() {
        Some(recorded) if recorded == path => Ok(record),
        recorded => Err(EventError::input_validation(
            "INPUT.CHECKPOINT_PATH",
            format!(
                "checkpoint was written for '{}' but loaded from '{}'",
                recorded.map_or_else(|| "<none>".into(), |p| p.display().to_string()),
                path.display()
            ),
        )),
    }
}
