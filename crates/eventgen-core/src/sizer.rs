//! Two-pass hydro: a cheap ideal-fluid probe on a large coarse box measures
//! how far the fireball expands, then the full run uses the smallest grid that
//! contains it.

use crate::bridge::{FreezeoutSurface, HydroFields, SURFACE_FILE, read_surface, write_hydro_inputs};
use crate::common::RunConfig;
use crate::common::constants::{
    COARSE_DT_RATIO, COARSE_FACTOR, COARSE_HALF_EXTENT, COARSE_TDEC, IDEAL_HYDRO_ARGS,
    REFINE_DT_RATIO,
};
use crate::domain::{EventError, EventResult, StageKind};
use crate::grid::GridSpec;
use crate::serialization::remove_stale;
use crate::stages::{StageInvocation, StageInvoker};
use std::path::Path;
use tracing::{debug, info};

pub const HYDRO_HISTORY_FILE: &str = "hydro_history.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HydroPass {
    Coarse,
    Refine,
}

impl HydroPass {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Coarse => "coarse",
            Self::Refine => "refine",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SizedSurface {
    pub coarse_grid: GridSpec,
    pub probe_radius: f64,
    pub grid: GridSpec,
    pub surface: FreezeoutSurface,
}

pub fn coarse_grid(step: f64) -> GridSpec {
    GridSpec::covering(COARSE_HALF_EXTENT, step * COARSE_FACTOR as f64)
}

/// Smallest production grid reaching `probe_radius`.
pub fn refine_grid(probe_radius: f64, step: f64) -> GridSpec {
    GridSpec::covering(probe_radius, step)
}

pub struct GridSizer<'a, I> {
    invoker: I,
    config: &'a RunConfig,
    work_dir: &'a Path,
}

impl<'a, I: StageInvoker> GridSizer<'a, I> {
    pub fn new(invoker: I, config: &'a RunConfig, work_dir: &'a Path) -> Self {
        Self {
            invoker,
            config,
            work_dir,
        }
    }

    pub fn probe(&self, fields: &HydroFields) -> EventResult<(GridSpec, f64)> {
        let grid = coarse_grid(self.config.grid_step);
        let surface = self.run_pass(HydroPass::Coarse, fields, &grid, false)?;
        let probe_radius = surface.max_radius().ok_or_else(|| {
            EventError::stop(
                "RUN.EMPTY_SURFACE",
                "coarse hydro pass produced an empty freeze-out surface",
            )
        })?;
        info!(
            probe_radius,
            coarse_cells = grid.cells(),
            elements = surface.len(),
            "coarse pass sized the fireball"
        );
        Ok((grid, probe_radius))
    }

    pub fn refine(
        &self,
        fields: &HydroFields,
        probe_radius: f64,
        record_history: bool,
    ) -> EventResult<(GridSpec, FreezeoutSurface)> {
        let grid = refine_grid(probe_radius, self.config.grid_step);
        let surface = self.run_pass(HydroPass::Refine, fields, &grid, record_history)?;
        if surface.is_empty() {
            return Err(EventError::stop(
                "RUN.EMPTY_SURFACE",
                "refined hydro pass produced an empty freeze-out surface",
            ));
        }
        info!(
            cells = grid.cells(),
            half_extent = grid.half_extent(),
            elements = surface.len(),
            "refined hydro pass finished"
        );
        Ok((grid, surface))
    }

    pub fn run(&self, fields: &HydroFields, record_history: bool) -> EventResult<SizedSurface> {
        let (coarse_grid, probe_radius) = self.probe(fields)?;
        let (grid, surface) = self.refine(fields, probe_radius, record_history)?;
        Ok(SizedSurface {
            coarse_grid,
            probe_radius,
            grid,
            surface,
        })
    }

    fn run_pass(
        &self,
        pass: HydroPass,
        fields: &HydroFields,
        grid: &GridSpec,
        record_history: bool,
    ) -> EventResult<FreezeoutSurface> {
        let surface_path = self.work_dir.join(SURFACE_FILE);
        remove_stale(&surface_path)?;
        let stride = match pass {
            HydroPass::Coarse => COARSE_FACTOR,
            HydroPass::Refine => 1,
        };
        write_hydro_inputs(fields, grid, stride, self.work_dir)?;

        let invocation = self.invocation(pass, grid, record_history);
        debug!(pass = pass.as_str(), command = %invocation.command_line(), "hydro pass");
        self.invoker.invoke(&invocation)?;
        read_surface(&surface_path)
    }

    fn invocation(
        &self,
        pass: HydroPass,
        grid: &GridSpec,
        record_history: bool,
    ) -> StageInvocation {
        let (ratio, tdec, extra) = match pass {
            HydroPass::Coarse => (
                COARSE_DT_RATIO,
                COARSE_TDEC,
                IDEAL_HYDRO_ARGS.iter().map(|arg| arg.to_string()).collect(),
            ),
            HydroPass::Refine => (
                REFINE_DT_RATIO,
                self.config.tswitch,
                self.config.hydro_args_list(),
            ),
        };
        let invocation = StageInvocation::new(
            StageKind::Hydro,
            &self.config.programs.hydro,
            self.work_dir,
        )
        .setting("t0", self.config.tau_fs)
        .setting("dt", ratio * grid.step)
        .setting("dxy", grid.step)
        .setting("nls", grid.half_cells)
        .setting("Tdec", tdec)
        .args(extra);
        if record_history {
            invocation.setting("history", HYDRO_HISTORY_FILE)
        } else {
            invocation
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{GridSizer, coarse_grid, refine_grid};
    use crate::bridge::{
        FreezeoutSurface, HYDRO_INPUTS, HydroFields, SURFACE_FILE, SurfaceElement, write_surface,
    };
    use crate::common::RunConfig;
    use crate::domain::{EventErrorCategory, EventResult, Field2d};
    use crate::serialization::read_f64_artifact;
    use crate::stages::{StageInvocation, StageInvoker, StageOutput};
    use proptest::prelude::*;
    use std::cell::RefCell;
    use tempfile::TempDir;

    /// Writes one surface per call; records every command line and where the
    /// energy-density maximum sits, in fm from the grid centre.
    struct ScriptedHydro {
        radii: RefCell<Vec<Option<f64>>>,
        commands: RefCell<Vec<Vec<String>>>,
        peaks: RefCell<Vec<(f64, f64)>>,
    }

    impl ScriptedHydro {
        fn new(radii: Vec<Option<f64>>) -> Self {
            Self {
                radii: RefCell::new(radii),
                commands: RefCell::new(Vec::new()),
                peaks: RefCell::new(Vec::new()),
            }
        }
    }

    fn setting(args: &[String], key: &str) -> f64 {
        args.iter()
            .find_map(|arg| arg.strip_prefix(key)?.strip_prefix('='))
            .and_then(|value| value.parse().ok())
            .expect("hydro setting should be present")
    }

    impl StageInvoker for ScriptedHydro {
        fn invoke(&self, invocation: &StageInvocation) -> EventResult<StageOutput> {
            self.commands.borrow_mut().push(invocation.args.clone());
            let dxy = setting(&invocation.args, "dxy");
            let half = setting(&invocation.args, "nls");
            let ed = read_f64_artifact(&invocation.work_dir.join(HYDRO_INPUTS[0]))?;
            let n = (2.0 * half) as usize + 1;
            assert_eq!(ed.len(), n * n, "hydro input should match nls");
            let peak = (0..ed.len())
                .max_by(|a, b| ed[*a].total_cmp(&ed[*b]))
                .expect("energy density should not be empty");
            self.peaks.borrow_mut().push((
                ((peak % n) as f64 - half) * dxy,
                ((peak / n) as f64 - half) * dxy,
            ));
            let radius = self.radii.borrow_mut().remove(0);
            let elements = match radius {
                Some(r) => vec![
                    SurfaceElement::at(1.0, r, 0.0),
                    SurfaceElement::at(1.0, 0.0, 0.5),
                ],
                None => Vec::new(),
            };
            let surface = FreezeoutSurface { elements };
            write_surface(&invocation.work_dir.join(SURFACE_FILE), &surface)?;
            Ok(StageOutput::default())
        }
    }

    fn fields(n: usize) -> HydroFields {
        let e = Field2d::from_fn(n, |_, _| 1.0);
        HydroFields {
            energy_density: e.clone(),
            u1: e.clone(),
            u2: e.clone(),
            pi11: e.clone(),
            pi12: e.clone(),
            pi22: e,
        }
    }

    #[test]
    fn coarse_grid_uses_triple_step_on_fixed_box() {
        let grid = coarse_grid(0.1);
        assert!((grid.step - 0.3).abs() < 1.0e-12);
        assert_eq!(grid.half_cells, 90);
    }

    #[test]
    fn refine_grid_covers_probe_radius() {
        let grid = refine_grid(8.05, 0.1);
        assert_eq!(grid.half_cells, 81);
        assert!(grid.half_extent() >= 8.05);
    }

    #[test]
    fn passes_use_their_own_settings() {
        let temp = TempDir::new().expect("tempdir should be created");
        let mut config = RunConfig::new("results.dat");
        config.hydro_args = "etas_min=0.08".to_string();
        let hydro = ScriptedHydro::new(vec![Some(6.0), Some(5.5)]);

        let sized = GridSizer::new(&hydro, &config, temp.path())
            .run(&fields(300), true)
            .expect("both passes should succeed");
        assert_eq!(sized.probe_radius, 6.0);
        assert_eq!(sized.grid.half_cells, 60);
        assert_eq!(sized.surface.len(), 2);

        let commands = hydro.commands.borrow();
        assert!(commands[0].contains(&"Tdec=0.11".to_string()));
        assert!(commands[0].contains(&"etas_min=0".to_string()));
        assert!(commands[0].contains(&"nls=90".to_string()));
        assert!(commands[1].contains(&"Tdec=0.15".to_string()));
        assert!(commands[1].contains(&"etas_min=0.08".to_string()));
        assert!(commands[1].contains(&"nls=60".to_string()));
        assert!(commands[1].contains(&"history=hydro_history.json".to_string()));
    }

    #[test]
    fn both_passes_see_the_fireball_at_its_physical_position() {
        let temp = TempDir::new().expect("tempdir should be created");
        let config = RunConfig::new("results.dat");
        let hot = Field2d::from_fn(300, |row, column| {
            if (row, column) == (171, 120) { 50.0 } else { 1.0 }
        });
        let fields = HydroFields {
            energy_density: hot,
            ..fields(300)
        };
        let hydro = ScriptedHydro::new(vec![Some(9.0), Some(9.0)]);

        GridSizer::new(&hydro, &config, temp.path())
            .run(&fields, false)
            .expect("both passes should succeed");
        // (-3.0, 2.1) fm on the generator grid; cropping the even source onto
        // an odd grid may shift it by one fine cell
        let peaks = hydro.peaks.borrow();
        assert_eq!(peaks.len(), 2);
        for (x, y) in peaks.iter() {
            assert!((x + 3.0).abs() < 0.1 + 1.0e-6, "peak moved to x = {x}");
            assert!((y - 2.1).abs() < 0.1 + 1.0e-6, "peak moved to y = {y}");
        }
        assert!((peaks[0].0 + 3.0).abs() < 1.0e-6 && (peaks[0].1 - 2.1).abs() < 1.0e-6);
    }

    #[test]
    fn empty_coarse_surface_stops_the_event() {
        let temp = TempDir::new().expect("tempdir should be created");
        let config = RunConfig::new("results.dat");
        let hydro = ScriptedHydro::new(vec![None]);

        let error = GridSizer::new(&hydro, &config, temp.path())
            .run(&fields(10), false)
            .expect_err("empty coarse surface should stop");
        assert_eq!(error.category(), EventErrorCategory::EventStopped);
        assert_eq!(hydro.commands.borrow().len(), 1);
    }

    #[test]
    fn empty_refined_surface_stops_the_event() {
        let temp = TempDir::new().expect("tempdir should be created");
        let config = RunConfig::new("results.dat");
        let hydro = ScriptedHydro::new(vec![Some(4.0), None]);

        let error = GridSizer::new(&hydro, &config, temp.path())
            .run(&fields(10), false)
            .expect_err("empty refined surface should stop");
        assert!(error.is_stop());
    }

    proptest! {
        #[test]
        fn refine_grid_grows_with_probe_radius(
            r1 in 0.0_f64..40.0,
            r2 in 0.0_f64..40.0,
            step in 0.05_f64..0.5,
        ) {
            let (small, large) = if r1 <= r2 { (r1, r2) } else { (r2, r1) };
            let small_grid = refine_grid(small, step);
            let large_grid = refine_grid(large, step);
            prop_assert!(small_grid.half_cells <= large_grid.half_cells);
            prop_assert!(large_grid.half_extent() + 1.0e-6 >= large);
        }
    }
}
