use crate::domain::{EventError, EventResult, Field2d};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryFrame {
    pub index: u64,
    pub time: f64,
    pub fields: BTreeMap<String, Field2d>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HistoryArchive {
    pub frames: Vec<HistoryFrame>,
}

impl HistoryArchive {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Free-streaming frames first, then hydro frames renumbered to follow the
/// highest free-streaming index.
pub fn merge_history(freestream: HistoryArchive, hydro: HistoryArchive) -> HistoryArchive {
    let offset = freestream
        .frames
        .iter()
        .map(|frame| frame.index + 1)
        .max()
        .unwrap_or(0);
    let mut frames = freestream.frames;
    frames.extend(hydro.frames.into_iter().map(|mut frame| {
        frame.index += offset;
        frame
    }));
    frames.sort_by_key(|frame| frame.index);
    HistoryArchive { frames }
}

pub fn read_history(path: &Path) -> EventResult<HistoryArchive> {
    let content = fs::read_to_string(path).map_err(|source| {
        EventError::io_system(
            "IO.HISTORY_READ",
            format!("failed to read history '{}': {}", path.display(), source),
        )
    })?;
    serde_json::from_str(&content).map_err(|source| {
        EventError::invariant(
            "INVARIANT.HISTORY_FORMAT",
            format!("history '{}' is malformed: {}", path.display(), source),
        )
    })
}

pub fn write_history(path: &Path, archive: &HistoryArchive) -> EventResult<()> {
    let write_error = |reason: String| {
        EventError::io_system(
            "IO.HISTORY_WRITE",
            format!("failed to write history '{}': {}", path.display(), reason),
        )
    };
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| write_error(source.to_string()))?;
    }
    let content =
        serde_json::to_string(archive).map_err(|source| write_error(source.to_string()))?;
    fs::write(path, content).map_err(|source| write_error(source.to_string()))
}
