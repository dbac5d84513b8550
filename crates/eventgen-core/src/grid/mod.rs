//! Grid geometry and the centre-aligned crop/pad used for every field handed
//! from one stage to the next.
//!
//! When the source and target sizes differ by an odd number of cells the
//! offset is truncated (`lo = diff / 2`), so the extra row and column always
//! land on the high-index side. Existing datasets depend on that direction.

use crate::domain::Field2d;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

const CELL_COUNT_TOLERANCE: f64 = 1.0e-9;

/// Odd, centred grid: `2 * half_cells + 1` cells of width `step`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub step: f64,
    pub half_cells: usize,
}

impl GridSpec {
    pub fn new(step: f64, half_cells: usize) -> Self {
        Self { step, half_cells }
    }

    /// Smallest grid whose half-extent reaches `half_extent`.
    pub fn covering(half_extent: f64, step: f64) -> Self {
        let half_cells = (half_extent.max(0.0) / step - CELL_COUNT_TOLERANCE).ceil();
        Self {
            step,
            half_cells: half_cells.max(1.0) as usize,
        }
    }

    pub fn cells(&self) -> usize {
        2 * self.half_cells + 1
    }

    pub fn extent(&self) -> f64 {
        self.step * self.cells() as f64
    }

    pub fn half_extent(&self) -> f64 {
        self.step * self.half_cells as f64
    }

    pub fn coarsened(&self, factor: usize) -> Self {
        Self::covering(self.half_extent(), self.step * factor as f64)
    }
}

/// Cell count of a generator grid spanning `[-grid_max, grid_max]`.
pub fn generator_cells(grid_max: f64, step: f64) -> usize {
    (2.0 * grid_max / step - CELL_COUNT_TOLERANCE).ceil().max(1.0) as usize
}

pub fn resize(field: &Field2d, target_n: usize) -> Field2d {
    let source_n = field.n();
    match source_n.cmp(&target_n) {
        Ordering::Equal => field.clone(),
        Ordering::Greater => {
            let lo = (source_n - target_n) / 2;
            Field2d::from_fn(target_n, |row, column| field.get(row + lo, column + lo))
        }
        Ordering::Less => {
            let lo = (target_n - source_n) / 2;
            let hi = lo + source_n;
            Field2d::from_fn(target_n, |row, column| {
                if (lo..hi).contains(&row) && (lo..hi).contains(&column) {
                    field.get(row - lo, column - lo)
                } else {
                    0.0
                }
            })
        }
    }
}

pub fn resize_all<'a>(
    fields: impl IntoIterator<Item = &'a Field2d>,
    target_n: usize,
) -> Vec<Field2d> {
    fields
        .into_iter()
        .map(|field| resize(field, target_n))
        .collect()
}

/// Keep every `stride`-th cell in both directions, starting at the first.
pub fn subsample(field: &Field2d, stride: usize) -> Field2d {
    if stride <= 1 {
        return field.clone();
    }
    let n = field.n().div_ceil(stride);
    Field2d::from_fn(n, |row, column| field.get(row * stride, column * stride))
}
