pub mod config;
pub mod constants;

pub use config::{
    CentralityDefinition, CentralitySelection, EventPlaneConfig, RunConfig, SamplingConfig,
    StagePrograms,
};
