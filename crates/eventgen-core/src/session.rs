//! Wiring of one process run: context, initial-condition sequence, runner and
//! event loop.

use crate::checkpoint::{self, CheckpointRecord};
use crate::common::RunConfig;
use crate::context::RunContext;
use crate::domain::{EventResult, InitialCondition};
use crate::event_loop::{EventLoop, RunSummary};
use crate::initial::{GeneratorSource, InitialConditionSequence};
use crate::results::ResultsWriter;
use crate::runner::EventRunner;
use crate::stages::StageInvoker;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tracing::info;

/// Where the averaged initial condition is kept in averaging mode.
pub const AVERAGED_IC_FILE: &str = "averaged_ic.json";

#[derive(Debug)]
pub struct RunSession {
    config: RunConfig,
    context: RunContext,
    resumed: Option<InitialCondition>,
}

impl RunSession {
    /// Validate `config`, resolve the rank from the environment and rewrite
    /// the output paths for it.
    pub fn fresh(mut config: RunConfig) -> EventResult<Self> {
        config.validate()?;
        let context = RunContext::from_config(&config)?;
        context.apply_to(&mut config);
        Ok(Self {
            config,
            context,
            resumed: None,
        })
    }

    /// Re-run the event recorded in the checkpoint at `path`.
    pub fn resume(path: &Path) -> EventResult<Self> {
        let CheckpointRecord {
            config,
            initial_condition,
        } = checkpoint::load(path)?;
        config.validate()?;
        let context = RunContext::resumed(&config)?;
        Ok(Self {
            config,
            context,
            resumed: Some(initial_condition),
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn context(&self) -> &RunContext {
        &self.context
    }

    pub fn is_resumed(&self) -> bool {
        self.resumed.is_some()
    }

    pub fn execute<I: StageInvoker>(
        self,
        invoker: I,
        shutdown: Arc<AtomicBool>,
    ) -> EventResult<RunSummary> {
        let config = &self.config;
        let work_dir = self.context.work_dir();
        info!(
            results = %config.results.display(),
            work_dir = %work_dir.display(),
            rank = self.context.rank().unwrap_or("-"),
            system = config.system.as_deref().unwrap_or("unspecified"),
            nevents = ?config.nevents,
            "run starting"
        );

        let results = ResultsWriter::open(&config.results)?;
        let mut event_loop = EventLoop::new(config, results, shutdown);
        let averaged_path = work_dir.join(AVERAGED_IC_FILE);
        let sequence = match self.resumed {
            Some(ic) => {
                info!(
                    checkpoint = ?config.checkpoint,
                    event = ic.index,
                    "resuming checkpointed event"
                );
                event_loop = event_loop.resuming();
                InitialConditionSequence::resumed(ic)
            }
            None => {
                let source = GeneratorSource::new(&invoker, config, work_dir);
                let sequence = match config.nevents {
                    Some(count) => InitialConditionSequence::counted(source, count),
                    None => InitialConditionSequence::unbounded(source),
                };
                if config.avg_ic {
                    sequence.averaging(config.avg_ic_events, Some(averaged_path.as_path()))
                } else {
                    sequence
                }
            }
        };

        let runner = EventRunner::new(&invoker, config, work_dir)?;
        event_loop.run(sequence, runner)
    }
}
