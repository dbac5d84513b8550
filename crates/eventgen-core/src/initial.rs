//! Initial-condition intake: the generator exchange file, event averaging and
//! the lazy sequence the event loop consumes.

use crate::common::RunConfig;
use crate::domain::{EventError, EventResult, Field2d, InitialCondition, StageKind};
use crate::serialization::remove_stale;
use crate::stages::{StageInvocation, StageInvoker};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

pub const GENERATOR_OUTPUT: &str = "initial_conditions.json";

/// Largest number of events requested from the generator in one call.
pub const GENERATOR_BATCH: u64 = 100;

const GROUP_PREFIX: &str = "event_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ExchangeFile {
    events: BTreeMap<String, ExchangeGroup>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ExchangeGroup {
    matter_density: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ncoll_density: Option<Vec<f64>>,
    attrs: ExchangeAttrs,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ExchangeAttrs {
    grid_n: usize,
    grid_step: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    psi2: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mult: Option<f64>,
}

fn format_error(path: &Path, detail: impl std::fmt::Display) -> EventError {
    EventError::invariant(
        "INVARIANT.EXCHANGE_FORMAT",
        format!("initial-condition file '{}': {}", path.display(), detail),
    )
}

/// Events of an exchange file, in the numeric order of their group suffix.
pub fn read_exchange_file(path: &Path) -> EventResult<Vec<InitialCondition>> {
    let content = fs::read_to_string(path).map_err(|source| {
        EventError::io_system(
            "IO.EXCHANGE_READ",
            format!(
                "failed to read initial conditions '{}': {}",
                path.display(),
                source
            ),
        )
    })?;
    let file: ExchangeFile =
        serde_json::from_str(&content).map_err(|source| format_error(path, source))?;

    let mut groups = file
        .events
        .into_iter()
        .map(|(name, group)| {
            name.strip_prefix(GROUP_PREFIX)
                .and_then(|suffix| suffix.parse::<u64>().ok())
                .map(|index| (index, group))
                .ok_or_else(|| format_error(path, format!("unexpected group '{name}'")))
        })
        .collect::<EventResult<Vec<_>>>()?;
    groups.sort_by_key(|(index, _)| *index);

    groups
        .into_iter()
        .map(|(index, group)| {
            let n = group.attrs.grid_n;
            let matter_density = Field2d::from_vec(n, group.matter_density)
                .map_err(|error| format_error(path, error.message()))?;
            let ncoll_density = group
                .ncoll_density
                .map(|values| Field2d::from_vec(n, values))
                .transpose()
                .map_err(|error| format_error(path, error.message()))?;
            Ok(InitialCondition {
                index,
                matter_density,
                ncoll_density,
                grid_step: group.attrs.grid_step,
                psi2: group.attrs.psi2,
                multiplicity: group.attrs.mult,
            })
        })
        .collect()
}

/// Write `events` as groups `event_0`, `event_1`, ... in slice order.
pub fn write_exchange_file(path: &Path, events: &[InitialCondition]) -> EventResult<()> {
    let file = ExchangeFile {
        events: events
            .iter()
            .enumerate()
            .map(|(position, ic)| {
                let group = ExchangeGroup {
                    matter_density: ic.matter_density.as_slice().to_vec(),
                    ncoll_density: ic
                        .ncoll_density
                        .as_ref()
                        .map(|field| field.as_slice().to_vec()),
                    attrs: ExchangeAttrs {
                        grid_n: ic.grid_n(),
                        grid_step: ic.grid_step,
                        psi2: ic.psi2,
                        mult: ic.multiplicity,
                    },
                };
                (format!("{GROUP_PREFIX}{position}"), group)
            })
            .collect(),
    };
    let write_error = |reason: String| {
        EventError::io_system(
            "IO.EXCHANGE_WRITE",
            format!(
                "failed to write initial conditions '{}': {}",
                path.display(),
                reason
            ),
        )
    };
    let content =
        serde_json::to_string(&file).map_err(|source| write_error(source.to_string()))?;
    fs::write(path, content).map_err(|source| write_error(source.to_string()))
}

pub trait InitialConditionSource {
    fn generate(&mut self, count: u64) -> EventResult<Vec<InitialCondition>>;
}

/// Runs the generator program and reads back its exchange file.
pub struct GeneratorSource<'a, I> {
    invoker: I,
    config: &'a RunConfig,
    work_dir: &'a Path,
}

impl<'a, I: StageInvoker> GeneratorSource<'a, I> {
    pub fn new(invoker: I, config: &'a RunConfig, work_dir: &'a Path) -> Self {
        Self {
            invoker,
            config,
            work_dir,
        }
    }

    pub fn invocation(&self, count: u64) -> StageInvocation {
        let config = self.config;
        StageInvocation::new(
            StageKind::Generator,
            &config.programs.generator,
            self.work_dir,
        )
        .args(config.trento_args_list())
        .args([
            "--number-events".to_string(),
            count.to_string(),
            "--grid-step".to_string(),
            config.grid_step.to_string(),
            "--grid-max".to_string(),
            config.grid_max.to_string(),
            "--normalization".to_string(),
            config.norm.to_string(),
            "--nucleon-width".to_string(),
            config.nucleon_width.to_string(),
            "--centrality-def".to_string(),
            config.centrality.definition.to_string(),
            "--centrality-low".to_string(),
            config.centrality.low.to_string(),
            "--centrality-high".to_string(),
            config.centrality.high.to_string(),
            "--output".to_string(),
            GENERATOR_OUTPUT.to_string(),
        ])
    }
}

impl<I: StageInvoker> InitialConditionSource for GeneratorSource<'_, I> {
    fn generate(&mut self, count: u64) -> EventResult<Vec<InitialCondition>> {
        let output = self.work_dir.join(GENERATOR_OUTPUT);
        remove_stale(&output)?;
        self.invoker.invoke(&self.invocation(count))?;
        let events = read_exchange_file(&output)?;
        debug!(requested = count, generated = events.len(), "generator batch read");
        Ok(events)
    }
}

/// Density-weighted centroid `(x, y)` in cell units from the grid centre.
fn centroid(field: &Field2d) -> (f64, f64) {
    let centre = (field.n() as f64 - 1.0) / 2.0;
    let (mut total, mut sum_x, mut sum_y) = (0.0, 0.0, 0.0);
    for row in 0..field.n() {
        for column in 0..field.n() {
            let value = field.get(row, column);
            total += value;
            sum_x += value * (column as f64 - centre);
            sum_y += value * (row as f64 - centre);
        }
    }
    if total == 0.0 {
        (0.0, 0.0)
    } else {
        (sum_x / total, sum_y / total)
    }
}

/// Orientation of the long axis of the density about `origin`, in `(-pi/2, pi/2]`.
pub fn second_order_plane(field: &Field2d, origin: (f64, f64)) -> f64 {
    let centre = (field.n() as f64 - 1.0) / 2.0;
    let (mut cos2, mut sin2) = (0.0, 0.0);
    for row in 0..field.n() {
        for column in 0..field.n() {
            let x = column as f64 - centre - origin.0;
            let y = row as f64 - centre - origin.1;
            let value = field.get(row, column);
            cos2 += value * (x * x - y * y);
            sin2 += value * 2.0 * x * y;
        }
    }
    sin2.atan2(cos2) / 2.0
}

fn bilinear(field: &Field2d, row: f64, column: f64) -> f64 {
    let n = field.n() as isize;
    let (r0, c0) = (row.floor(), column.floor());
    let (fr, fc) = (row - r0, column - c0);
    let sample = |r: isize, c: isize| {
        if (0..n).contains(&r) && (0..n).contains(&c) {
            field.get(r as usize, c as usize)
        } else {
            0.0
        }
    };
    let (r, c) = (r0 as isize, c0 as isize);
    sample(r, c) * (1.0 - fr) * (1.0 - fc)
        + sample(r, c + 1) * (1.0 - fr) * fc
        + sample(r + 1, c) * fr * (1.0 - fc)
        + sample(r + 1, c + 1) * fr * fc
}

/// Re-centre `field` on its centroid and rotate it so the plane `psi2` lies
/// along the x axis.
fn align(field: &Field2d, psi2: f64) -> Field2d {
    let origin = centroid(field);
    let centre = (field.n() as f64 - 1.0) / 2.0;
    let (sin, cos) = psi2.sin_cos();
    Field2d::from_fn(field.n(), |row, column| {
        let x = column as f64 - centre;
        let y = row as f64 - centre;
        let source_x = cos * x - sin * y + origin.0 + centre;
        let source_y = sin * x + cos * y + origin.1 + centre;
        bilinear(field, source_y, source_x)
    })
}

/// Average of the events after each is centred and aligned to its own
/// second-order plane.
pub fn average_initial_conditions(events: &[InitialCondition]) -> EventResult<InitialCondition> {
    let Some(first) = events.first() else {
        return Err(EventError::invariant(
            "INVARIANT.AVERAGE_EMPTY",
            "cannot average an empty set of initial conditions",
        ));
    };
    let n = first.grid_n();
    if let Some(mismatch) = events
        .iter()
        .find(|ic| ic.grid_n() != n || (ic.grid_step - first.grid_step).abs() > f64::EPSILON)
    {
        return Err(EventError::invariant(
            "INVARIANT.GRID_SHAPE",
            format!(
                "event {} has a {}x{} grid with step {}, expected {}x{} with step {}",
                mismatch.index,
                mismatch.grid_n(),
                mismatch.grid_n(),
                mismatch.grid_step,
                n,
                n,
                first.grid_step
            ),
        ));
    }

    let mut sum = vec![0.0; n * n];
    for ic in events {
        let psi2 = ic.psi2.unwrap_or_else(|| {
            second_order_plane(&ic.matter_density, centroid(&ic.matter_density))
        });
        let aligned = align(&ic.matter_density, psi2);
        for (total, value) in sum.iter_mut().zip(aligned.as_slice()) {
            *total += value;
        }
    }
    let count = events.len() as f64;
    let average = Field2d::from_vec(n, sum.into_iter().map(|value| value / count).collect())?;

    let multiplicity = events
        .iter()
        .map(|ic| ic.multiplicity)
        .sum::<Option<f64>>()
        .map(|total| total / count);
    Ok(InitialCondition {
        index: first.index,
        matter_density: average,
        ncoll_density: None,
        grid_step: first.grid_step,
        psi2: Some(0.0),
        multiplicity,
    })
}

enum SequenceMode {
    Resumed,
    Counted { remaining: u64 },
    Unbounded,
}

/// Lazy stream of initial conditions for the event loop.
pub struct InitialConditionSequence<'a> {
    source: Option<Box<dyn InitialConditionSource + 'a>>,
    mode: SequenceMode,
    buffer: VecDeque<InitialCondition>,
    average_over: Option<u64>,
    average_path: Option<&'a Path>,
    next_index: u64,
    exhausted: bool,
}

impl<'a> InitialConditionSequence<'a> {
    pub fn resumed(ic: InitialCondition) -> Self {
        Self {
            source: None,
            mode: SequenceMode::Resumed,
            next_index: ic.index + 1,
            buffer: VecDeque::from([ic]),
            average_over: None,
            average_path: None,
            exhausted: false,
        }
    }

    pub fn counted(source: impl InitialConditionSource + 'a, count: u64) -> Self {
        Self::generated(Box::new(source), SequenceMode::Counted { remaining: count })
    }

    pub fn unbounded(source: impl InitialConditionSource + 'a) -> Self {
        Self::generated(Box::new(source), SequenceMode::Unbounded)
    }

    fn generated(source: Box<dyn InitialConditionSource + 'a>, mode: SequenceMode) -> Self {
        Self {
            source: Some(source),
            mode,
            buffer: VecDeque::new(),
            average_over: None,
            average_path: None,
            next_index: 0,
            exhausted: false,
        }
    }

    /// Each item becomes the average of `events` generated events; the
    /// averaged condition is also written to `exchange_path` when given.
    pub fn averaging(mut self, events: u64, exchange_path: Option<&'a Path>) -> Self {
        self.average_over = Some(events);
        self.average_path = exchange_path;
        self
    }

    fn batch_size(&self) -> Option<u64> {
        match self.mode {
            SequenceMode::Resumed => None,
            SequenceMode::Counted { remaining: 0 } => None,
            SequenceMode::Counted { remaining } if self.average_over.is_none() => {
                Some(remaining.min(GENERATOR_BATCH))
            }
            SequenceMode::Counted { .. } | SequenceMode::Unbounded => Some(1),
        }
    }

    fn generate_exact(
        source: &mut dyn InitialConditionSource,
        count: u64,
    ) -> EventResult<Vec<InitialCondition>> {
        let mut events = Vec::new();
        while (events.len() as u64) < count {
            let wanted = (count - events.len() as u64).min(GENERATOR_BATCH);
            let batch = source.generate(wanted)?;
            if batch.is_empty() {
                return Err(EventError::invariant(
                    "INVARIANT.GENERATOR_OUTPUT",
                    format!("generator returned no events when {wanted} were requested"),
                ));
            }
            events.extend(batch.into_iter().take(wanted as usize));
        }
        Ok(events)
    }

    fn refill(&mut self, batch: u64) -> EventResult<()> {
        let Some(source) = self.source.as_deref_mut() else {
            return Ok(());
        };
        let events = match self.average_over {
            Some(per_item) => {
                let events = Self::generate_exact(source, per_item)?;
                let averaged = average_initial_conditions(&events)?;
                if let Some(path) = self.average_path {
                    write_exchange_file(path, std::slice::from_ref(&averaged))?;
                }
                info!(events = per_item, "averaged initial condition ready");
                vec![averaged]
            }
            None => Self::generate_exact(source, batch)?,
        };

        for mut ic in events {
            ic.index = self.next_index;
            self.next_index += 1;
            self.buffer.push_back(ic);
        }
        if let SequenceMode::Counted { remaining } = &mut self.mode {
            *remaining -= batch.min(*remaining);
        }
        Ok(())
    }
}

impl Iterator for InitialConditionSequence<'_> {
    type Item = EventResult<InitialCondition>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(ic) = self.buffer.pop_front() {
            return Some(Ok(ic));
        }
        if self.exhausted {
            return None;
        }
        let Some(batch) = self.batch_size() else {
            self.exhausted = true;
            return None;
        };
        if let Err(error) = self.refill(batch) {
            self.exhausted = true;
            return Some(Err(error));
        }
        self.buffer.pop_front().map(Ok)
    }
}
