use super::{StageExecutionError, StageInvocation, StageOutput};
use crate::domain::EventResult;
use std::process::{Command, Stdio};
use tracing::{debug, error, info};

/// Single entry point through which every external program is run.
pub trait StageInvoker {
    fn invoke(&self, invocation: &StageInvocation) -> EventResult<StageOutput>;
}

impl<T> StageInvoker for &T
where
    T: StageInvoker + ?Sized,
{
    fn invoke(&self, invocation: &StageInvocation) -> EventResult<StageOutput> {
        (**self).invoke(invocation)
    }
}

/// Blocking child-process invoker; no retries.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubprocessInvoker;

impl StageInvoker for SubprocessInvoker {
    fn invoke(&self, invocation: &StageInvocation) -> EventResult<StageOutput> {
        let program = invocation.program.to_string_lossy().into_owned();
        info!(
            stage = %invocation.stage,
            command = %invocation.command_line(),
            "running stage"
        );

        let output = Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(&invocation.work_dir)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| StageExecutionError::Spawn {
                stage: invocation.stage,
                program: program.clone(),
                reason: source.to_string(),
            })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            error!(
                stage = %invocation.stage,
                exit_code = ?output.status.code(),
                "stage failed, captured output:\n{}",
                combined
            );
            return Err(StageExecutionError::NonZeroExit {
                stage: invocation.stage,
                program,
                exit_code: output.status.code(),
                output: combined,
            }
            .into());
        }

        debug!(stage = %invocation.stage, "stage output:\n{}", combined);
        Ok(StageOutput { output: combined })
    }
}
