pub mod errors;

pub use errors::{EventError, EventErrorCategory, EventResult};

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    Generator,
    FreeStream,
    Hydro,
    Sampler,
    Afterburner,
}

impl StageKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Generator => "GENERATOR",
            Self::FreeStream => "FREESTREAM",
            Self::Hydro => "HYDRO",
            Self::Sampler => "SAMPLER",
            Self::Afterburner => "AFTERBURNER",
        }
    }

    pub const fn failure_placeholder(self) -> &'static str {
        match self {
            Self::Generator => "RUN.GENERATOR_STAGE",
            Self::FreeStream => "RUN.FREESTREAM_STAGE",
            Self::Hydro => "RUN.HYDRO_STAGE",
            Self::Sampler => "RUN.SAMPLER_STAGE",
            Self::Afterburner => "RUN.AFTERBURNER_STAGE",
        }
    }
}

impl Display for StageKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

/// Square row-major field; `data[row * n + column]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field2d {
    n: usize,
    data: Vec<f64>,
}

impl Field2d {
    pub fn zeros(n: usize) -> Self {
        Self {
            n,
            data: vec![0.0; n * n],
        }
    }

    pub fn from_vec(n: usize, data: Vec<f64>) -> EventResult<Self> {
        if data.len() != n * n {
            return Err(EventError::invariant(
                "INVARIANT.FIELD_SHAPE",
                format!(
                    "field of {} values cannot be shaped as {}x{}",
                    data.len(),
                    n,
                    n
                ),
            ));
        }
        Ok(Self { n, data })
    }

    pub fn from_fn(n: usize, mut value: impl FnMut(usize, usize) -> f64) -> Self {
        let mut data = Vec::with_capacity(n * n);
        for row in 0..n {
            for column in 0..n {
                data.push(value(row, column));
            }
        }
        Self { n, data }
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn get(&self, row: usize, column: usize) -> f64 {
        self.data[row * self.n + column]
    }

    pub fn set(&mut self, row: usize, column: usize, value: f64) {
        self.data[row * self.n + column] = value;
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }

    pub fn sum(&self) -> f64 {
        self.data.iter().sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialCondition {
    pub index: u64,
    pub matter_density: Field2d,
    #[serde(default)]
    pub ncoll_density: Option<Field2d>,
    pub grid_step: f64,
    #[serde(default)]
    pub psi2: Option<f64>,
    #[serde(default)]
    pub multiplicity: Option<f64>,
}

impl InitialCondition {
    pub fn new(index: u64, matter_density: Field2d, grid_step: f64) -> Self {
        Self {
            index,
            matter_density,
            ncoll_density: None,
            grid_step,
            psi2: None,
            multiplicity: None,
        }
    }

    pub fn grid_n(&self) -> usize {
        self.matter_density.n()
    }

    /// Density integrated over the transverse plane.
    pub fn total_density(&self) -> f64 {
        self.matter_density.sum() * self.grid_step * self.grid_step
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampledParticle {
    pub species: i64,
    pub charge: i64,
    pub pt: f64,
    pub et: f64,
    pub mt: f64,
    pub phi: f64,
    pub y: f64,
    pub eta: f64,
}

impl SampledParticle {
    pub fn is_charged(&self) -> bool {
        self.charge != 0
    }
}
