mod traits;

pub use traits::{StageInvoker, SubprocessInvoker};

use crate::domain::{EventError, StageKind};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageInvocation {
    pub stage: StageKind,
    pub program: OsString,
    pub args: Vec<String>,
    pub work_dir: PathBuf,
}

impl StageInvocation {
    pub fn new(stage: StageKind, program: impl Into<OsString>, work_dir: &Path) -> Self {
        Self {
            stage,
            program: program.into(),
            args: Vec::new(),
            work_dir: work_dir.to_path_buf(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// `key=value` argument as understood by the hydro and sampler stages.
    pub fn setting(self, key: &str, value: impl std::fmt::Display) -> Self {
        self.arg(format!("{key}={value}"))
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.to_string_lossy().into_owned())
            .chain(self.args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StageOutput {
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StageExecutionError {
    #[error("{stage} stage '{program}' could not be started: {reason}")]
    Spawn {
        stage: StageKind,
        program: String,
        reason: String,
    },
    #[error("{stage} stage '{program}' failed with {}:\n{output}", describe_exit(.exit_code))]
    NonZeroExit {
        stage: StageKind,
        program: String,
        exit_code: Option<i32>,
        output: String,
    },
}

impl StageExecutionError {
    pub fn stage(&self) -> StageKind {
        match self {
            Self::Spawn { stage, .. } | Self::NonZeroExit { stage, .. } => *stage,
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Spawn { .. } => None,
            Self::NonZeroExit { exit_code, .. } => *exit_code,
        }
    }

    pub fn output(&self) -> &str {
        match self {
            Self::Spawn { .. } => "",
            Self::NonZeroExit { output, .. } => output,
        }
    }
}

impl From<StageExecutionError> for EventError {
    fn from(error: StageExecutionError) -> Self {
        EventError::stage_failure(error.stage().failure_placeholder(), error.to_string())
    }
}

fn describe_exit(exit_code: &Option<i32>) -> String {
    exit_code.map_or_else(
        || "termination by signal".to_string(),
        |code| format!("exit code {code}"),
    )
}
