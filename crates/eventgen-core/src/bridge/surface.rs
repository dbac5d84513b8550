use crate::domain::{EventError, EventResult};
use crate::serialization::{F64_WIDTH, read_f64_artifact, write_f64_artifact};
use std::path::Path;

pub const SURFACE_FILE: &str = "surface.dat";

/// `tau x y eta | sigma(4) | v(3) | pi(10) | bulk | T e P muB`
pub const SURFACE_COLUMNS: usize = 26;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceElement {
    /// tau, x, y, eta
    pub position: [f64; 4],
    pub sigma: [f64; 4],
    /// vx, vy, veta
    pub velocity: [f64; 3],
    /// tt tx ty teta xx xy xeta yy yeta etaeta
    pub shear: [f64; 10],
    pub bulk: f64,
    pub temperature: f64,
    pub energy_density: f64,
    pub pressure: f64,
    pub mu_b: f64,
}

impl SurfaceElement {
    fn from_row(row: &[f64]) -> Self {
        let mut element = Self {
            position: [0.0; 4],
            sigma: [0.0; 4],
            velocity: [0.0; 3],
            shear: [0.0; 10],
            bulk: row[21],
            temperature: row[22],
            energy_density: row[23],
            pressure: row[24],
            mu_b: row[25],
        };
        element.position.copy_from_slice(&row[0..4]);
        element.sigma.copy_from_slice(&row[4..8]);
        element.velocity.copy_from_slice(&row[8..11]);
        element.shear.copy_from_slice(&row[11..21]);
        element
    }

    fn to_row(self) -> [f64; SURFACE_COLUMNS] {
        let mut row = [0.0; SURFACE_COLUMNS];
        row[0..4].copy_from_slice(&self.position);
        row[4..8].copy_from_slice(&self.sigma);
        row[8..11].copy_from_slice(&self.velocity);
        row[11..21].copy_from_slice(&self.shear);
        row[21] = self.bulk;
        row[22] = self.temperature;
        row[23] = self.energy_density;
        row[24] = self.pressure;
        row[25] = self.mu_b;
        row
    }

    pub fn at(tau: f64, x: f64, y: f64) -> Self {
        Self {
            position: [tau, x, y, 0.0],
            sigma: [0.0; 4],
            velocity: [0.0; 3],
            shear: [0.0; 10],
            bulk: 0.0,
            temperature: 0.0,
            energy_density: 0.0,
            pressure: 0.0,
            mu_b: 0.0,
        }
    }

    pub fn transverse_radius(&self) -> f64 {
        self.position[1].hypot(self.position[2])
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FreezeoutSurface {
    pub elements: Vec<SurfaceElement>,
}

impl FreezeoutSurface {
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Largest transverse distance of any element from the origin.
    pub fn max_radius(&self) -> Option<f64> {
        self.elements
            .iter()
            .map(SurfaceElement::transverse_radius)
            .reduce(f64::max)
    }

    fn values(&self) -> Vec<f64> {
        self.elements
            .iter()
            .flat_map(|element| element.to_row())
            .collect()
    }
}

pub fn read_surface(path: &Path) -> EventResult<FreezeoutSurface> {
    let values = read_f64_artifact(path)?;
    if values.len() % SURFACE_COLUMNS != 0 {
        return Err(EventError::invariant(
            "INVARIANT.SURFACE_LAYOUT",
            format!(
                "'{}' holds {} bytes, not a multiple of the {}-byte surface element",
                path.display(),
                values.len() * F64_WIDTH,
                SURFACE_COLUMNS * F64_WIDTH
            ),
        ));
    }
    Ok(FreezeoutSurface {
        elements: values
            .chunks_exact(SURFACE_COLUMNS)
            .map(SurfaceElement::from_row)
            .collect(),
    })
}

pub fn write_surface(path: &Path, surface: &FreezeoutSurface) -> EventResult<()> {
    write_f64_artifact(path, &surface.values())
}

#[cfg(test)]
mod tests {
    use super::{FreezeoutSurface, SURFACE_COLUMNS, SurfaceElement, read_surface, write_surface};
    use crate::domain::EventErrorCategory;
    use crate::serialization::write_f64_artifact;
    use tempfile::TempDir;

    #[test]
    fn columns_map_onto_named_fields() {
        let temp = TempDir::new().expect("tempdir should be created");
        let path = temp.path().join("surface.dat");
        let row = (0..SURFACE_COLUMNS).map(|i| i as f64).collect::<Vec<_>>();
        write_f64_artifact(&path, &row).expect("surface should be written");

        let surface = read_surface(&path).expect("surface should parse");
        let element = surface.elements[0];
        assert_eq!(element.position, [0.0, 1.0, 2.0, 3.0]);
        assert_eq!(element.velocity, [8.0, 9.0, 10.0]);
        assert_eq!(element.shear[9], 20.0);
        assert_eq!(element.bulk, 21.0);
        assert_eq!(element.temperature, 22.0);
        assert_eq!(element.mu_b, 25.0);
    }

    #[test]
    fn max_radius_is_the_farthest_element() {
        let surface = FreezeoutSurface {
            elements: vec![
                SurfaceElement::at(1.0, 3.0, 4.0),
                SurfaceElement::at(2.0, -6.0, 8.0),
                SurfaceElement::at(3.0, 0.5, 0.0),
            ],
        };
        assert_eq!(surface.max_radius(), Some(10.0));
        assert_eq!(FreezeoutSurface::default().max_radius(), None);
    }

    #[test]
    fn written_surface_reads_back() {
        let temp = TempDir::new().expect("tempdir should be created");
        let path = temp.path().join("surface.dat");
        let mut element = SurfaceElement::at(0.6, 1.0, -2.0);
        element.temperature = 0.150;
        let surface = FreezeoutSurface {
            elements: vec![element, SurfaceElement::at(0.7, 0.0, 0.0)],
        };

        write_surface(&path, &surface).expect("surface should be written");
        assert_eq!(read_surface(&path).expect("surface should parse"), surface);
    }

    #[test]
    fn ragged_surface_is_an_invariant_violation() {
        let temp = TempDir::new().expect("tempdir should be created");
        let path = temp.path().join("surface.dat");
        write_f64_artifact(&path, &[0.0; SURFACE_COLUMNS + 1]).expect("file should be written");

        let error = read_surface(&path).expect_err("27 columns is not a whole element");
        assert_eq!(error.category(), EventErrorCategory::InvariantViolation);
    }

    #[test]
    fn empty_surface_file_has_no_elements() {
        let temp = TempDir::new().expect("tempdir should be created");
        let path = temp.path().join("surface.dat");
        write_f64_artifact(&path, &[]).expect("file should be written");
        assert!(read_surface(&path).expect("empty file should parse").is_empty());
    }
}
