//! Validated run configuration.
//!
//! Every recognised option lives here with its default; the checkpoint stores
//! the whole structure so a resumed event runs with exactly the settings it
//! was started with.

use crate::domain::{EventError, EventResult};
use crate::grid::generator_cells;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CentralityDefinition {
    #[default]
    Entropy,
    Npart,
    Impact,
}

impl CentralityDefinition {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Entropy => "entropy",
            Self::Npart => "npart",
            Self::Impact => "impact",
        }
    }
}

impl Display for CentralityDefinition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

impl FromStr for CentralityDefinition {
    type Err = EventError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        match token.trim().to_ascii_lowercase().as_str() {
            "entropy" => Ok(Self::Entropy),
            "npart" => Ok(Self::Npart),
            "impact" | "b" => Ok(Self::Impact),
            other => Err(EventError::input_validation(
                "INPUT.CONFIG_CENTRALITY_DEF",
                format!(
                    "unknown centrality definition '{other}' (expected entropy, npart or impact)"
                ),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CentralitySelection {
    pub definition: CentralityDefinition,
    pub low: f64,
    pub high: f64,
}

impl Default for CentralitySelection {
    fn default() -> Self {
        Self {
            definition: CentralityDefinition::Entropy,
            low: 0.0,
            high: 100.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagePrograms {
    pub generator: String,
    pub freestream: String,
    pub hydro: String,
    pub sampler: String,
    pub afterburner: String,
}

impl Default for StagePrograms {
    fn default() -> Self {
        Self {
            generator: "trento".to_string(),
            freestream: "freestream".to_string(),
            hydro: "osu-hydro".to_string(),
            sampler: "frzout-sample".to_string(),
            afterburner: "afterburner".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplingConfig {
    pub min_samples: u64,
    pub max_samples: u64,
    pub min_particles: u64,
    pub batch: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            min_samples: 10,
            max_samples: 1000,
            min_particles: 100_000,
            batch: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EventPlaneConfig {
    pub target_pions: u64,
    pub pt_min: f64,
    pub y_max: f64,
    pub max_batches: u64,
    pub batch: u64,
}

impl Default for EventPlaneConfig {
    fn default() -> Self {
        Self {
            target_pions: 1_000_000,
            pt_min: 0.3,
            y_max: 1.0,
            max_batches: 200,
            batch: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub results: PathBuf,
    pub nevents: Option<u64>,
    pub rankvar: Option<String>,
    pub rankfmt: String,
    pub tmpdir: Option<PathBuf>,
    pub system: Option<String>,
    pub avg_ic: bool,
    pub avg_ic_events: u64,
    pub afterburner: bool,
    pub norm: f64,
    pub centrality: CentralitySelection,
    pub nucleon_width: f64,
    pub tau_fs: f64,
    pub trento_args: String,
    pub grid_step: f64,
    pub grid_max: f64,
    pub hydro_args: String,
    pub tswitch: f64,
    pub logfile: Option<PathBuf>,
    pub checkpoint: Option<PathBuf>,
    pub particles: Option<PathBuf>,
    pub history_dir: Option<PathBuf>,
    pub programs: StagePrograms,
    pub sampling: SamplingConfig,
    pub event_plane: EventPlaneConfig,
}

impl RunConfig {
    pub fn new(results: impl Into<PathBuf>) -> Self {
        Self {
            results: results.into(),
            nevents: None,
            rankvar: None,
            rankfmt: "{}".to_string(),
            tmpdir: None,
            system: None,
            avg_ic: false,
            avg_ic_events: 1000,
            afterburner: false,
            norm: 1.0,
            centrality: CentralitySelection::default(),
            nucleon_width: 0.5,
            tau_fs: 0.5,
            trento_args: String::new(),
            grid_step: 0.1,
            grid_max: 15.0,
            hydro_args: String::new(),
            tswitch: 0.150,
            logfile: None,
            checkpoint: None,
            particles: None,
            history_dir: None,
            programs: StagePrograms::default(),
            sampling: SamplingConfig::default(),
            event_plane: EventPlaneConfig::default(),
        }
    }

    pub fn validate(&self) -> EventResult<()> {
        require_positive("grid-step", self.grid_step)?;
        require_positive("grid-max", self.grid_max)?;
        require_positive("tswitch", self.tswitch)?;
        require_positive("norm", self.norm)?;
        require_positive("nucleon-width", self.nucleon_width)?;
        if !(self.tau_fs >= 0.0 && self.tau_fs.is_finite()) {
            return Err(EventError::input_validation(
                "INPUT.CONFIG_TAU_FS",
                format!("tau-fs must be non-negative, got {}", self.tau_fs),
            ));
        }

        if self.nevents == Some(0) {
            return Err(EventError::input_validation(
                "INPUT.CONFIG_NEVENTS",
                "nevents must be positive when given",
            ));
        }
        if self.avg_ic && self.avg_ic_events == 0 {
            return Err(EventError::input_validation(
                "INPUT.CONFIG_AVG_IC",
                "avg-ic-events must be positive in averaging mode",
            ));
        }

        let centrality = self.centrality;
        if !(0.0..=100.0).contains(&centrality.low)
            || !(0.0..=100.0).contains(&centrality.high)
            || centrality.low >= centrality.high
        {
            return Err(EventError::input_validation(
                "INPUT.CONFIG_CENTRALITY",
                format!(
                    "centrality bounds must satisfy 0 <= low < high <= 100, got {}-{}",
                    centrality.low, centrality.high
                ),
            ));
        }

        let sampling = self.sampling;
        if sampling.batch == 0
            || sampling.max_samples == 0
            || sampling.min_samples > sampling.max_samples
        {
            return Err(EventError::input_validation(
                "INPUT.CONFIG_SAMPLING",
                format!(
                    "oversampling bounds must satisfy 0 < batch and min-samples ({}) <= max-samples ({})",
                    sampling.min_samples, sampling.max_samples
                ),
            ));
        }

        let event_plane = self.event_plane;
        if event_plane.batch == 0 || event_plane.max_batches == 0 {
            return Err(EventError::input_validation(
                "INPUT.CONFIG_EVENT_PLANE",
                "event-plane batch size and batch limit must be positive",
            ));
        }
        require_positive("event-plane y window", event_plane.y_max)?;

        if !self.rankfmt.contains('{') || !self.rankfmt.contains('}') {
            return Err(EventError::input_validation(
                "INPUT.CONFIG_RANKFMT",
                format!("rankfmt '{}' must contain a '{{}}' placeholder", self.rankfmt),
            ));
        }

        Ok(())
    }

    /// Cell count of every initial condition this run accepts.
    pub fn generator_cells(&self) -> usize {
        generator_cells(self.grid_max, self.grid_step)
    }

    pub fn trento_args_list(&self) -> Vec<String> {
        split_args(&self.trento_args)
    }

    pub fn hydro_args_list(&self) -> Vec<String> {
        split_args(&self.hydro_args)
    }
}

fn split_args(source: &str) -> Vec<String> {
    source.split_whitespace().map(str::to_string).collect()
}

fn require_positive(name: &str, value: f64) -> EventResult<()> {
    if value > 0.0 && value.is_finite() {
        return Ok(());
    }
    Err(EventError::input_validation(
        "INPUT.CONFIG_RANGE",
        format!("{name} must be a positive number, got {value}"),
    ))
}
