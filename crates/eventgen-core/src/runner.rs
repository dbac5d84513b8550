//! One event from initial condition to results record.
//!
//! ```text
//! Intake -> CoarseProbe -> RefineRun -> Particlize -> [Afterburn] -> ObservableExtract -> Done
//!    \___________\_____________\____________\_____________\_______________\--> Stopped | Failed
//! ```

use crate::bridge::{
    FREESTREAM_INPUT, FREESTREAM_OUTPUTS, HYDRO_INPUTS, SURFACE_FILE, load_freestream_output,
    merge_history, read_history, write_freestream_input, write_history,
};
use crate::common::RunConfig;
use crate::domain::{EventError, EventResult, InitialCondition, StageKind};
use crate::event_loop::EventProcessor;
use crate::observables::ResultsRecord;
use crate::particles::{
    AFTERBURNER_INPUT, AFTERBURNER_OUTPUT, Oversampled, Particlizer, SAMPLER_OUTPUT,
    append_particle_list,
};
use crate::sizer::{GridSizer, HYDRO_HISTORY_FILE};
use crate::stages::{StageInvocation, StageInvoker};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::cell::Cell;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const FREESTREAM_HISTORY_FILE: &str = "fs_history.json";

/// Files the stages exchange through the working directory.
pub fn transient_files() -> impl Iterator<Item = &'static str> {
    [
        FREESTREAM_INPUT,
        SURFACE_FILE,
        SAMPLER_OUTPUT,
        AFTERBURNER_INPUT,
        AFTERBURNER_OUTPUT,
        FREESTREAM_HISTORY_FILE,
        HYDRO_HISTORY_FILE,
    ]
    .into_iter()
    .chain(FREESTREAM_OUTPUTS)
    .chain(HYDRO_INPUTS)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStage {
    Intake,
    CoarseProbe,
    RefineRun,
    Particlize,
    Afterburn,
    ObservableExtract,
    Done,
    Stopped,
    Failed,
}

impl EventStage {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Intake => "INTAKE",
            Self::CoarseProbe => "COARSE_PROBE",
            Self::RefineRun => "REFINE_RUN",
            Self::Particlize => "PARTICLIZE",
            Self::Afterburn => "AFTERBURN",
            Self::ObservableExtract => "OBSERVABLE_EXTRACT",
            Self::Done => "DONE",
            Self::Stopped => "STOPPED",
            Self::Failed => "FAILED",
        }
    }
}

impl Display for EventStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

fn transient_matcher() -> EventResult<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in transient_files() {
        let glob = Glob::new(&globset::escape(pattern)).map_err(|source| {
            EventError::internal(
                "INTERNAL.TRANSIENT_GLOB",
                format!("invalid transient file pattern '{pattern}': {source}"),
            )
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|source| {
        EventError::internal(
            "INTERNAL.TRANSIENT_GLOB",
            format!("failed to build transient file patterns: {source}"),
        )
    })
}

pub struct EventRunner<'a, I> {
    invoker: I,
    config: &'a RunConfig,
    work_dir: &'a Path,
    transient: GlobSet,
    stage: Cell<EventStage>,
}

impl<'a, I: StageInvoker> EventRunner<'a, I> {
    pub fn new(invoker: I, config: &'a RunConfig, work_dir: &'a Path) -> EventResult<Self> {
        Ok(Self {
            invoker,
            config,
            work_dir,
            transient: transient_matcher()?,
            stage: Cell::new(EventStage::Done),
        })
    }

    /// Stage the most recent event ended in.
    pub fn stage(&self) -> EventStage {
        self.stage.get()
    }

    /// Run `ic` through every stage. Stops come back as `EventStopped` errors.
    pub fn run_event(&self, ic: &InitialCondition) -> EventResult<ResultsRecord> {
        self.stage.set(EventStage::Intake);
        debug!(event = ic.index, stage = %EventStage::Intake, "event stage");
        let outcome = self.drive(ic);
        let last = self.stage.get();
        match &outcome {
            Ok(_) => self.enter(ic, EventStage::Done),
            Err(error) if error.is_stop() => {
                info!(
                    event = ic.index,
                    during = %last,
                    reason = error.placeholder(),
                    "event stopped"
                );
                self.stage.set(EventStage::Stopped);
            }
            Err(error) => {
                warn!(
                    event = ic.index,
                    during = %last,
                    reason = error.placeholder(),
                    "event failed"
                );
                self.stage.set(EventStage::Failed);
            }
        }
        outcome
    }

    fn enter(&self, ic: &InitialCondition, next: EventStage) {
        debug!(event = ic.index, from = %self.stage.get(), to = %next, "event stage");
        self.stage.set(next);
    }

    fn drive(&self, ic: &InitialCondition) -> EventResult<ResultsRecord> {
        self.clean_work_dir()?;
        self.intake(ic)?;
        let record_history = self.config.history_dir.is_some();

        self.freestream(ic, record_history)?;
        let fields = load_freestream_output(self.work_dir, ic.grid_n())?;

        self.enter(ic, EventStage::CoarseProbe);
        let sizer = GridSizer::new(&self.invoker, self.config, self.work_dir);
        let (_, probe_radius) = sizer.probe(&fields)?;

        self.enter(ic, EventStage::RefineRun);
        let (grid, surface) = sizer.refine(&fields, probe_radius, record_history)?;
        info!(
            event = ic.index,
            probe_radius,
            cells = grid.cells(),
            elements = surface.len(),
            "hydro finished"
        );
        if let Some(dir) = &self.config.history_dir {
            self.archive_history(ic, dir)?;
        }

        self.enter(ic, EventStage::Particlize);
        let particlizer = Particlizer::new(&self.invoker, self.config, self.work_dir);
        let event_plane = particlizer.event_plane()?;
        let set = match particlizer.oversample()? {
            Oversampled::Particles(set) => set,
            Oversampled::AfterburnerInput {
                nsamples,
                nparticles,
                ..
            } => {
                self.enter(ic, EventStage::Afterburn);
                debug!(event = ic.index, nsamples, nparticles, "afterburner input ready");
                particlizer.afterburn(nsamples)?
            }
        };

        self.enter(ic, EventStage::ObservableExtract);
        let record = ResultsRecord::compute(ic.total_density(), &set, &event_plane);
        if let Some(path) = &self.config.particles {
            append_particle_list(path, ic.index, &set)?;
        }
        info!(
            event = ic.index,
            nsamples = record.nsamples,
            dnch_deta = record.dnch_deta,
            "observables extracted"
        );
        Ok(record)
    }

    fn intake(&self, ic: &InitialCondition) -> EventResult<()> {
        let expected = self.config.generator_cells();
        if ic.grid_n() != expected {
            return Err(EventError::invariant(
                "INVARIANT.GRID_SHAPE",
                format!(
                    "initial condition {} is {}x{}, the run grid is {}x{}",
                    ic.index,
                    ic.grid_n(),
                    ic.grid_n(),
                    expected,
                    expected
                ),
            ));
        }
        Ok(())
    }

    fn freestream(&self, ic: &InitialCondition, record_history: bool) -> EventResult<()> {
        write_freestream_input(ic, self.work_dir)?;
        let invocation = StageInvocation::new(
            StageKind::FreeStream,
            &self.config.programs.freestream,
            self.work_dir,
        )
        .arg(FREESTREAM_INPUT)
        .setting("grid_n", ic.grid_n())
        .setting("grid_step", self.config.grid_step)
        .setting("tau_fs", self.config.tau_fs);
        let invocation = if record_history {
            invocation.setting("history", FREESTREAM_HISTORY_FILE)
        } else {
            invocation
        };
        self.invoker.invoke(&invocation)?;
        Ok(())
    }

    fn archive_history(&self, ic: &InitialCondition, dir: &Path) -> EventResult<PathBuf> {
        let freestream = read_history(&self.work_dir.join(FREESTREAM_HISTORY_FILE))?;
        let hydro = read_history(&self.work_dir.join(HYDRO_HISTORY_FILE))?;
        let archive = merge_history(freestream, hydro);
        let path = dir.join(format!("event_{}.json", ic.index));
        write_history(&path, &archive)?;
        debug!(event = ic.index, frames = archive.len(), path = %path.display(), "history archived");
        Ok(path)
    }

    /// Remove what earlier events left in the working directory.
    fn clean_work_dir(&self) -> EventResult<()> {
        let clean_error = |path: &Path, source: std::io::Error| {
            EventError::io_system(
                "IO.WORK_DIR",
                format!("failed to clean '{}': {}", path.display(), source),
            )
        };
        let entries = fs::read_dir(self.work_dir).map_err(|e| clean_error(self.work_dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| clean_error(self.work_dir, e))?;
            let path = entry.path();
            if !path.is_file() || !self.transient.is_match(entry.file_name()) {
                continue;
            }
            if self.is_run_output(&path) {
                warn!(path = %path.display(), "run output shares a stage file name, keeping it");
                continue;
            }
            fs::remove_file(&path).map_err(|e| clean_error(&path, e))?;
        }
        Ok(())
    }

    fn is_run_output(&self, path: &Path) -> bool {
        let Ok(path) = fs::canonicalize(path) else {
            return false;
        };
        let config = self.config;
        [
            Some(&config.results),
            config.checkpoint.as_ref(),
            config.particles.as_ref(),
            config.logfile.as_ref(),
        ]
        .into_iter()
        .flatten()
        .filter_map(|output| fs::canonicalize(output).ok())
        .any(|output| output == path)
    }
}

impl<I: StageInvoker> EventProcessor for EventRunner<'_, I> {
    fn process(&mut self, ic: &InitialCondition, event_number: u64) -> EventResult<ResultsRecord> {
        debug!(event_number, index = ic.index, "event runner");
        self.run_event(ic)
    }
}

#[cfg(test)]
mod tests {
    use super::{EventRunner, EventStage, FREESTREAM_HISTORY_FILE};
    use crate::bridge::{
        FREESTREAM_OUTPUTS, FreezeoutSurface, HistoryArchive, HistoryFrame, SURFACE_FILE,
        SurfaceElement, read_history, write_history, write_surface,
    };
    use crate::common::RunConfig;
    use crate::domain::{EventErrorCategory, EventResult, Field2d, InitialCondition, StageKind};
    use crate::particles::{SAMPLER_OUTPUT, read_particle_lists};
    use crate::serialization::write_f64_artifact;
    use crate::sizer::HYDRO_HISTORY_FILE;
    use crate::stages::{StageInvocation, StageInvoker, StageOutput};
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::fs;
    use tempfile::TempDir;

    /// Every stage succeeds with a small, fixed physics answer.
    #[derive(Default)]
    struct Physics {
        empty_surface: bool,
        stages: RefCell<Vec<StageKind>>,
    }

    fn setting<'a>(invocation: &'a StageInvocation, key: &str) -> Option<&'a str> {
        invocation
            .args
            .iter()
            .find_map(|arg| arg.strip_prefix(key)?.strip_prefix('='))
    }

    impl StageInvoker for Physics {
        fn invoke(&self, invocation: &StageInvocation) -> EventResult<StageOutput> {
            self.stages.borrow_mut().push(invocation.stage);
            let dir = &invocation.work_dir;
            match invocation.stage {
                StageKind::FreeStream => {
                    let n = setting(invocation, "grid_n")
                        .and_then(|n| n.parse::<usize>().ok())
                        .expect("freestream should be told the grid size");
                    for name in FREESTREAM_OUTPUTS {
                        write_f64_artifact(&dir.join(name), &vec![1.0; n * n])?;
                    }
                    if let Some(name) = setting(invocation, "history") {
                        write_history(&dir.join(name), &frames(2))?;
                    }
                }
                StageKind::Hydro => {
                    let elements = if self.empty_surface {
                        Vec::new()
                    } else {
                        vec![SurfaceElement::at(5.0, 3.0, 0.0)]
                    };
                    write_surface(&dir.join(SURFACE_FILE), &FreezeoutSurface { elements })?;
                    if let Some(name) = setting(invocation, "history") {
                        write_history(&dir.join(name), &frames(3))?;
                    }
                }
                StageKind::Sampler => {
                    let nsamples = setting(invocation, "nsamples")
                        .and_then(|n| n.parse::<usize>().ok())
                        .expect("sampler should be told the oversample count");
                    let text = "# 2\n211 1 0 0 0 0 1.2 0.8 0 0.1\n-211 -1 0 0 0 0 1.2 0 0.8 0\n"
                        .repeat(nsamples);
                    fs::write(dir.join(SAMPLER_OUTPUT), text).expect("samples should be written");
                }
                other => panic!("unexpected stage {other}"),
            }
            Ok(StageOutput::default())
        }
    }

    fn frames(count: u64) -> HistoryArchive {
        HistoryArchive {
            frames: (0..count)
                .map(|index| HistoryFrame {
                    index,
                    time: index as f64,
                    fields: BTreeMap::from([("e".to_string(), Field2d::zeros(1))]),
                })
                .collect(),
        }
    }

    fn small_config(temp: &TempDir) -> RunConfig {
        let mut config = RunConfig::new(temp.path().join("results.dat"));
        config.grid_max = 0.5;
        config.grid_step = 0.1;
        config.event_plane.target_pions = 4;
        config.event_plane.batch = 1;
        config.sampling.min_samples = 2;
        config.sampling.min_particles = 1;
        config.sampling.batch = 2;
        config
    }

    fn ic(config: &RunConfig) -> InitialCondition {
        InitialCondition::new(7, Field2d::from_fn(config.generator_cells(), |_, _| 2.0), 0.1)
    }

    #[test]
    fn event_walks_every_stage_to_done() {
        let temp = TempDir::new().expect("tempdir should be created");
        let work = temp.path().join("work");
        fs::create_dir(&work).expect("work dir should be created");
        let mut config = small_config(&temp);
        config.particles = Some(temp.path().join("particles.jsonl"));
        let physics = Physics::default();

        let runner = EventRunner::new(&physics, &config, &work).expect("runner should build");
        let record = runner.run_event(&ic(&config)).expect("event should complete");
        assert_eq!(runner.stage(), EventStage::Done);
        assert_eq!(record.nsamples, 2);
        assert!((record.initial_entropy - 2.0).abs() < 1.0e-9);
        assert_eq!(
            *physics.stages.borrow(),
            vec![
                StageKind::FreeStream,
                StageKind::Hydro,
                StageKind::Hydro,
                StageKind::Sampler,
                StageKind::Sampler,
                StageKind::Sampler,
            ]
        );
        let lists = read_particle_lists(&temp.path().join("particles.jsonl"))
            .expect("particle list should be readable");
        let groups = lists
            .iter()
            .map(|entry| (entry.event, entry.sample, entry.particles.len()))
            .collect::<Vec<_>>();
        assert_eq!(groups, vec![(7, 0, 2), (7, 1, 2)]);
    }

    #[test]
    fn empty_surface_stops_in_coarse_probe() {
        let temp = TempDir::new().expect("tempdir should be created");
        let config = small_config(&temp);
        let physics = Physics {
            empty_surface: true,
            ..Physics::default()
        };

        let runner =
            EventRunner::new(&physics, &config, temp.path()).expect("runner should build");
        let error = runner.run_event(&ic(&config)).expect_err("event should stop");
        assert_eq!(error.category(), EventErrorCategory::EventStopped);
        assert_eq!(error.placeholder(), "RUN.EMPTY_SURFACE");
        assert_eq!(runner.stage(), EventStage::Stopped);
        assert_eq!(physics.stages.borrow().len(), 2);
    }

    #[test]
    fn wrong_grid_is_an_invariant_violation() {
        let temp = TempDir::new().expect("tempdir should be created");
        let config = small_config(&temp);
        let physics = Physics::default();

        let runner =
            EventRunner::new(&physics, &config, temp.path()).expect("runner should build");
        let error = runner
            .run_event(&InitialCondition::new(0, Field2d::zeros(4), 0.1))
            .expect_err("mismatched grid should fail");
        assert_eq!(error.category(), EventErrorCategory::InvariantViolation);
        assert_eq!(runner.stage(), EventStage::Failed);
        assert!(physics.stages.borrow().is_empty());
    }

    #[test]
    fn history_of_both_stages_is_archived() {
        let temp = TempDir::new().expect("tempdir should be created");
        let work = temp.path().join("work");
        fs::create_dir(&work).expect("work dir should be created");
        let mut config = small_config(&temp);
        config.history_dir = Some(temp.path().join("history"));
        let physics = Physics::default();

        EventRunner::new(&physics, &config, &work)
            .expect("runner should build")
            .run_event(&ic(&config))
            .expect("event should complete");
        let archive = read_history(&temp.path().join("history").join("event_7.json"))
            .expect("history should be archived");
        let indices = archive.frames.iter().map(|f| f.index).collect::<Vec<_>>();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn run_outputs_in_the_work_dir_survive_cleanup() {
        let temp = TempDir::new().expect("tempdir should be created");
        let mut config = small_config(&temp);
        config.particles = Some(temp.path().join("particles.dat"));
        config.checkpoint = Some(temp.path().join(SURFACE_FILE));
        fs::write(&config.results, "records").expect("results should be written");
        fs::write(temp.path().join("particles.dat"), "particles").expect("list should be written");
        fs::write(temp.path().join(SURFACE_FILE), "checkpoint").expect("file should be written");
        let physics = Physics {
            empty_surface: true,
            ..Physics::default()
        };

        let runner =
            EventRunner::new(&physics, &config, temp.path()).expect("runner should build");
        runner.clean_work_dir().expect("cleanup should succeed");
        assert_eq!(fs::read_to_string(&config.results).expect("results kept"), "records");
        assert!(temp.path().join("particles.dat").exists());
        assert_eq!(
            fs::read_to_string(temp.path().join(SURFACE_FILE)).expect("checkpoint kept"),
            "checkpoint"
        );
    }

    #[test]
    fn leftovers_of_earlier_events_are_removed() {
        let temp = TempDir::new().expect("tempdir should be created");
        let config = small_config(&temp);
        for name in ["surface.dat", "ed.dat", FREESTREAM_HISTORY_FILE, HYDRO_HISTORY_FILE] {
            fs::write(temp.path().join(name), "stale").expect("leftover should be written");
        }
        fs::write(temp.path().join("notes.txt"), "keep").expect("file should be written");
        fs::write(temp.path().join("events.dat"), "keep").expect("file should be written");
        let physics = Physics {
            empty_surface: true,
            ..Physics::default()
        };

        let runner =
            EventRunner::new(&physics, &config, temp.path()).expect("runner should build");
        let _ = runner.run_event(&ic(&config));
        assert!(!temp.path().join("ed.dat").exists());
        assert!(!temp.path().join(HYDRO_HISTORY_FILE).exists());
        assert!(!temp.path().join(FREESTREAM_HISTORY_FILE).exists());
        assert!(temp.path().join("notes.txt").exists());
        assert!(temp.path().join("events.dat").exists());
    }
}
