//! Acceptance windows and stage settings shared by the event pipeline.
//!
//! Kinematic cuts follow the conventions of the experimental analyses the
//! results stream is compared against (GeV, fm, fm/c).

/// Identified species stored in the results record, by PDG id.
pub const SPECIES: [(&str, i64); 7] = [
    ("pion", 211),
    ("kaon", 321),
    ("proton", 2212),
    ("Lambda", 3122),
    ("Sigma0", 3212),
    ("Xi", 3312),
    ("Omega", 3334),
];

pub const PION_ID: i64 = 211;

pub const NCH_ETA_MAX: f64 = 0.5;
pub const ET_ETA_MAX: f64 = 0.6;
pub const IDENTIFIED_Y_MAX: f64 = 0.5;

pub const PT_FLUCT_ETA_MAX: f64 = 0.8;
pub const PT_FLUCT_PT_MIN: f64 = 0.15;
pub const PT_FLUCT_PT_MAX: f64 = 2.0;

pub const FLOW_ETA_MAX: f64 = 0.8;
pub const FLOW_PT_MIN: f64 = 0.2;
pub const FLOW_PT_MAX: f64 = 5.0;
pub const FLOW_HARMONICS: usize = 8;

pub const EVENT_PLANE_HARMONICS: usize = 7;

/// Coarse probe: large fixed box, wide cells, ideal fluid, low cutoff.
pub const COARSE_HALF_EXTENT: f64 = 27.0;
pub const COARSE_FACTOR: usize = 3;
pub const COARSE_TDEC: f64 = 0.110;
pub const COARSE_DT_RATIO: f64 = 0.45;
pub const IDEAL_HYDRO_ARGS: [&str; 5] = [
    "etas_hrg=0",
    "etas_min=0",
    "etas_slope=0",
    "zetas_max=0",
    "zetas_width=0",
];

pub const REFINE_DT_RATIO: f64 = 0.25;
