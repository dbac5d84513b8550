//! File-level glue between the external stages: the flat binary fields each
//! program reads and writes, the freeze-out surface, and the optional
//! evolution history.

mod fields;
mod history;
mod surface;

pub use fields::{
    FREESTREAM_INPUT, FREESTREAM_OUTPUTS, HYDRO_INPUTS, HydroFields, load_field,
    load_freestream_output, write_freestream_input, write_hydro_inputs,
};
pub use history::{HistoryArchive, HistoryFrame, merge_history, read_history, write_history};
pub use surface::{
    FreezeoutSurface, SURFACE_COLUMNS, SURFACE_FILE, SurfaceElement, read_surface, write_surface,
};
