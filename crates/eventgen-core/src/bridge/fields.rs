use crate::domain::{EventError, EventResult, Field2d, InitialCondition};
use crate::grid::{GridSpec, resize_all, subsample};
use crate::serialization::{read_f64_artifact, write_f64_artifact};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const FREESTREAM_INPUT: &str = "initial.dat";

pub const FREESTREAM_OUTPUTS: [&str; 6] = [
    "fs_e.dat",
    "fs_u1.dat",
    "fs_u2.dat",
    "fs_pi11.dat",
    "fs_pi12.dat",
    "fs_pi22.dat",
];

pub const HYDRO_INPUTS: [&str; 6] = [
    "ed.dat", "u1.dat", "u2.dat", "pi11.dat", "pi12.dat", "pi22.dat",
];

/// Energy density, transverse flow and shear components at the end of free
/// streaming, on one common square grid.
#[derive(Debug, Clone, PartialEq)]
pub struct HydroFields {
    pub energy_density: Field2d,
    pub u1: Field2d,
    pub u2: Field2d,
    pub pi11: Field2d,
    pub pi12: Field2d,
    pub pi22: Field2d,
}

impl HydroFields {
    pub fn n(&self) -> usize {
        self.energy_density.n()
    }

    pub fn components(&self) -> [&Field2d; 6] {
        [
            &self.energy_density,
            &self.u1,
            &self.u2,
            &self.pi11,
            &self.pi12,
            &self.pi22,
        ]
    }
}

/// Write the matter density at its native resolution for the free-streaming
/// stage.
pub fn write_freestream_input(ic: &InitialCondition, dir: &Path) -> EventResult<PathBuf> {
    let path = dir.join(FREESTREAM_INPUT);
    write_f64_artifact(&path, ic.matter_density.as_slice())?;
    Ok(path)
}

pub fn load_field(path: &Path, n: usize) -> EventResult<Field2d> {
    let values = read_f64_artifact(path)?;
    if values.len() != n * n {
        return Err(EventError::invariant(
            "INVARIANT.STAGE_DATA_SHAPE",
            format!(
                "'{}' holds {} values, expected {}x{}",
                path.display(),
                values.len(),
                n,
                n
            ),
        ));
    }
    Field2d::from_vec(n, values)
}

pub fn load_freestream_output(dir: &Path, n: usize) -> EventResult<HydroFields> {
    let [e, u1, u2, pi11, pi12, pi22] = FREESTREAM_OUTPUTS;
    Ok(HydroFields {
        energy_density: load_field(&dir.join(e), n)?,
        u1: load_field(&dir.join(u1), n)?,
        u2: load_field(&dir.join(u2), n)?,
        pi11: load_field(&dir.join(pi11), n)?,
        pi12: load_field(&dir.join(pi12), n)?,
        pi22: load_field(&dir.join(pi22), n)?,
    })
}

/// Write the hydro input files for `grid`.
///
/// The fields are sampled `stride` times finer than `grid`: they are cropped
/// or padded to the fine grid with the same half-extent, then every
/// `stride`-th cell is kept, so cell positions are preserved in fm.
pub fn write_hydro_inputs(
    fields: &HydroFields,
    grid: &GridSpec,
    stride: usize,
    dir: &Path,
) -> EventResult<()> {
    let stride = stride.max(1);
    let fine_cells = 2 * grid.half_cells * stride + 1;
    debug!(
        source = fields.n(),
        fine_cells,
        target = grid.cells(),
        stride,
        "writing hydro inputs"
    );
    for (name, field) in HYDRO_INPUTS
        .iter()
        .zip(resize_all(fields.components(), fine_cells))
    {
        let field = subsample(&field, stride);
        write_f64_artifact(&dir.join(name), field.as_slice())?;
    }
    Ok(())
}
