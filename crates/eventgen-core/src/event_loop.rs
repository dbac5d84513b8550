//! Sequential event loop: checkpoint, run, record, and the partial-failure
//! policy that decides when a run is broken rather than unlucky.

use crate::checkpoint::CheckpointManager;
use crate::common::RunConfig;
use crate::domain::{EventResult, InitialCondition};
use crate::observables::ResultsRecord;
use crate::results::ResultsWriter;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, warn};

/// Failures tolerated regardless of rate.
pub const ABORT_MIN_FAILURES: u64 = 3;
/// Failure fraction above which a run with enough failures is abandoned.
pub const ABORT_FAILURE_RATE: f64 = 0.5;

pub trait EventProcessor {
    fn process(&mut self, ic: &InitialCondition, event_number: u64) -> EventResult<ResultsRecord>;
}

impl<P> EventProcessor for &mut P
where
    P: EventProcessor + ?Sized,
{
    fn process(
        &mut self,
        ic: &InitialCondition,
        event_number: u64,
    ) -> EventResult<ResultsRecord> {
        (**self).process(ic, event_number)
    }
}

pub fn failure_threshold_exceeded(failed: u64, attempted: u64) -> bool {
    attempted > 0
        && failed > ABORT_MIN_FAILURES
        && failed as f64 / attempted as f64 > ABORT_FAILURE_RATE
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    pub attempted: u64,
    pub completed: u64,
    pub stopped: u64,
    pub failed: u64,
    /// The failure threshold ended the run early.
    pub aborted: bool,
    /// A shutdown request ended the run early.
    pub interrupted: bool,
}

impl RunSummary {
    /// Stopped events are valid outcomes, so only failures count against a run.
    pub fn succeeded(&self) -> bool {
        self.attempted > self.failed
    }
}

pub struct EventLoop<'a> {
    config: &'a RunConfig,
    results: ResultsWriter,
    checkpoint: Option<CheckpointManager>,
    shutdown: Arc<AtomicBool>,
    resumed: bool,
}

impl<'a> EventLoop<'a> {
    pub fn new(config: &'a RunConfig, results: ResultsWriter, shutdown: Arc<AtomicBool>) -> Self {
        Self {
            config,
            results,
            checkpoint: config.checkpoint.as_deref().map(CheckpointManager::new),
            shutdown,
            resumed: false,
        }
    }

    /// Mark the sequence as a resumed checkpoint event.
    pub fn resuming(mut self) -> Self {
        self.resumed = true;
        self
    }

    pub fn results(&self) -> &ResultsWriter {
        &self.results
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    fn clear_checkpoint(&self) -> EventResult<()> {
        match &self.checkpoint {
            Some(checkpoint) => checkpoint.clear(),
            None => Ok(()),
        }
    }

    /// Drive every initial condition of `events` through `processor`.
    ///
    /// Only errors that compromise the whole run are returned: invariant
    /// violations, initial-condition generation failures, and results or
    /// checkpoint I/O. Per-event failures are counted in the summary.
    pub fn run<E, P>(&mut self, events: E, mut processor: P) -> EventResult<RunSummary>
    where
        E: IntoIterator<Item = EventResult<InitialCondition>>,
        P: EventProcessor,
    {
        let mut summary = RunSummary::default();
        for ic in events {
            if self.shutdown_requested() {
                warn!(attempted = summary.attempted, "shutdown requested, ending run");
                summary.interrupted = true;
                break;
            }
            let ic = ic?;
            let event_number = summary.attempted + 1;
            if let Some(checkpoint) = &self.checkpoint {
                checkpoint.save(self.config, &ic)?;
            }
            summary.attempted = event_number;
            info!(event = event_number, index = ic.index, "starting event");

            match processor.process(&ic, event_number) {
                Ok(record) => {
                    self.results.append(&record)?;
                    self.clear_checkpoint()?;
                    summary.completed += 1;
                    info!(
                        event = event_number,
                        written = self.results.written(),
                        "event completed"
                    );
                }
                Err(stop) if stop.is_stop() => {
                    self.clear_checkpoint()?;
                    summary.stopped += 1;
                    info!(
                        event = event_number,
                        reason = stop.placeholder(),
                        "event stopped: {}",
                        stop.message()
                    );
                }
                Err(fatal) if fatal.category().aborts_run() => {
                    error!(event = event_number, "{}", fatal.diagnostic_line());
                    return Err(fatal);
                }
                Err(failure) if self.shutdown_requested() => {
                    // Most likely the stage was killed by the same signal.
                    summary.attempted -= 1;
                    summary.interrupted = true;
                    warn!(
                        event = event_number,
                        "event interrupted by shutdown, checkpoint kept: {}",
                        failure.diagnostic_line()
                    );
                    break;
                }
                Err(failure) => {
                    summary.failed += 1;
                    error!(
                        event = event_number,
                        index = ic.index,
                        failures = summary.failed,
                        "event failed: {}",
                        failure.diagnostic_line()
                    );
                    if self.resumed {
                        warn!("resumed event failed, checkpoint kept for inspection");
                    } else {
                        self.clear_checkpoint()?;
                    }
                    if failure_threshold_exceeded(summary.failed, summary.attempted) {
                        error!(
                            failed = summary.failed,
                            attempted = summary.attempted,
                            "too many failures, aborting run"
                        );
                        summary.aborted = true;
                        break;
                    }
                }
            }
        }

        info!(
            attempted = summary.attempted,
            completed = summary.completed,
            stopped = summary.stopped,
            failed = summary.failed,
            "run finished"
        );
        Ok(summary)
    }
}
