//! Per-process run context: working directory and rank-based output paths.

use crate::common::RunConfig;
use crate::domain::{EventError, EventResult};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[derive(Debug)]
pub struct RunContext {
    work_dir: PathBuf,
    rank: Option<String>,
    _temp_dir: Option<TempDir>,
}

impl RunContext {
    /// Build the context for a fresh run, reading the rank variable (if any)
    /// from the process environment.
    pub fn from_config(config: &RunConfig) -> EventResult<Self> {
        Self::with_rank_lookup(config, |name| std::env::var(name).ok())
    }

    pub fn with_rank_lookup(
        config: &RunConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> EventResult<Self> {
        let rank = match &config.rankvar {
            Some(variable) => {
                let raw = lookup(variable).ok_or_else(|| {
                    EventError::input_validation(
                        "INPUT.RANKVAR_UNSET",
                        format!("rank variable '{variable}' is not set"),
                    )
                })?;
                let value = raw.trim().parse::<u64>().map_err(|_| {
                    EventError::input_validation(
                        "INPUT.RANKVAR_VALUE",
                        format!("rank variable '{variable}' has non-integer value '{raw}'"),
                    )
                })?;
                Some(format_rank(&config.rankfmt, value)?)
            }
            None => None,
        };
        Self::with_rank(config, rank)
    }

    /// Context for a resumed checkpoint: its paths were already rewritten
    /// when the checkpoint was written.
    pub fn resumed(config: &RunConfig) -> EventResult<Self> {
        Self::with_rank(config, None)
    }

    fn with_rank(config: &RunConfig, rank: Option<String>) -> EventResult<Self> {
        let (work_dir, temp_dir) = match &config.tmpdir {
            Some(root) => {
                let dir = match &rank {
                    Some(rank) => root.join(rank),
                    None => root.clone(),
                };
                fs::create_dir_all(&dir).map_err(|source| {
                    EventError::io_system(
                        "IO.WORK_DIR",
                        format!(
                            "failed to create working directory '{}': {}",
                            dir.display(),
                            source
                        ),
                    )
                })?;
                (dir, None)
            }
            None => {
                let temp = tempfile::Builder::new()
                    .prefix("run-events-")
                    .tempdir()
                    .map_err(|source| {
                        EventError::io_system(
                            "IO.WORK_DIR",
                            format!("failed to create temporary working directory: {source}"),
                        )
                    })?;
                (temp.path().to_path_buf(), Some(temp))
            }
        };

        Ok(Self {
            work_dir,
            rank,
            _temp_dir: temp_dir,
        })
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn rank(&self) -> Option<&str> {
        self.rank.as_deref()
    }

    /// `dir/stem.ext` becomes `dir/stem_<rank>.ext`; unchanged without a rank.
    pub fn rank_path(&self, path: &Path) -> PathBuf {
        let Some(rank) = &self.rank else {
            return path.to_path_buf();
        };
        let stem = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = match path.extension() {
            Some(extension) => format!("{stem}_{rank}.{}", extension.to_string_lossy()),
            None => format!("{stem}_{rank}"),
        };
        path.with_file_name(name)
    }

    /// Rewrite every per-instance output path of `config` for this rank.
    pub fn apply_to(&self, config: &mut RunConfig) {
        config.results = self.rank_path(&config.results);
        for path in [
            &mut config.logfile,
            &mut config.checkpoint,
            &mut config.particles,
        ]
        .into_iter()
        .flatten()
        {
            *path = self.rank_path(path);
        }
        if let Some(history_dir) = &mut config.history_dir {
            if let Some(rank) = &self.rank {
                *history_dir = history_dir.join(rank);
            }
        }
    }
}

/// Format a rank with a `{}`, `{:N}` or `{:0N}` placeholder.
pub fn format_rank(template: &str, rank: u64) -> EventResult<String> {
    let invalid = || {
        EventError::input_validation(
            "INPUT.CONFIG_RANKFMT",
            format!("unsupported rank format '{template}'"),
        )
    };
    let open = template.find('{').ok_or_else(invalid)?;
    let close = template[open..].find('}').ok_or_else(invalid)? + open;
    let spec = &template[open + 1..close];

    let formatted = match spec.strip_prefix(':') {
        None if spec.is_empty() => rank.to_string(),
        None => return Err(invalid()),
        Some(width) => {
            let zero_pad = width.starts_with('0');
            let width = width
                .trim_start_matches('0')
                .trim_end_matches('d')
                .parse::<usize>()
                .map_err(|_| invalid())?;
            if zero_pad {
                format!("{rank:0width$}")
            } else {
                format!("{rank:width$}")
            }
        }
    };

    Ok(format!(
        "{}{}{}",
        &template[..open],
        formatted,
        &template[close + 1..]
    ))
}
