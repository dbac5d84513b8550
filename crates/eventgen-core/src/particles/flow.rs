use crate::common::constants::EVENT_PLANE_HARMONICS;

/// Running sums of `cos(n phi)` and `sin(n phi)` projections for orders
/// `1..=EVENT_PLANE_HARMONICS`.
#[derive(Debug, Clone, PartialEq)]
pub struct HarmonicAccumulator {
    count: u64,
    cos: [f64; EVENT_PLANE_HARMONICS],
    sin: [f64; EVENT_PLANE_HARMONICS],
    cos_sq: [f64; EVENT_PLANE_HARMONICS],
    sin_sq: [f64; EVENT_PLANE_HARMONICS],
    cos_sin: [f64; EVENT_PLANE_HARMONICS],
}

impl Default for HarmonicAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl HarmonicAccumulator {
    pub fn new() -> Self {
        Self {
            count: 0,
            cos: [0.0; EVENT_PLANE_HARMONICS],
            sin: [0.0; EVENT_PLANE_HARMONICS],
            cos_sq: [0.0; EVENT_PLANE_HARMONICS],
            sin_sq: [0.0; EVENT_PLANE_HARMONICS],
            cos_sin: [0.0; EVENT_PLANE_HARMONICS],
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn add(&mut self, phi: f64) {
        self.count += 1;
        for index in 0..EVENT_PLANE_HARMONICS {
            let order = (index + 1) as f64;
            let (sin, cos) = (order * phi).sin_cos();
            self.cos[index] += cos;
            self.sin[index] += sin;
            self.cos_sq[index] += cos * cos;
            self.sin_sq[index] += sin * sin;
            self.cos_sin[index] += cos * sin;
        }
    }

    pub fn estimate(&self) -> EventPlaneEstimate {
        let mut estimate = EventPlaneEstimate {
            count: self.count,
            ..EventPlaneEstimate::default()
        };
        if self.count == 0 {
            return estimate;
        }

        let n = self.count as f64;
        for index in 0..EVENT_PLANE_HARMONICS {
            let order = (index + 1) as f64;
            let c = self.cos[index] / n;
            let s = self.sin[index] / n;
            // covariance of the mean projections
            let var_c = (self.cos_sq[index] / n - c * c).max(0.0) / n;
            let var_s = (self.sin_sq[index] / n - s * s).max(0.0) / n;
            let cov = (self.cos_sin[index] / n - c * s) / n;

            let v2 = c * c + s * s;
            let v = v2.sqrt();
            estimate.vn[index] = v;
            estimate.psin[index] = s.atan2(c) / order;
            if v > 0.0 {
                let v_var = (c * c * var_c + s * s * var_s + 2.0 * c * s * cov) / v2;
                let psi_var = (s * s * var_c + c * c * var_s - 2.0 * c * s * cov) / (v2 * v2);
                estimate.vn_err[index] = v_var.max(0.0).sqrt();
                estimate.psin_err[index] = psi_var.max(0.0).sqrt() / order;
            } else {
                estimate.vn_err[index] = f64::NAN;
                estimate.psin_err[index] = f64::NAN;
            }
        }
        estimate
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EventPlaneEstimate {
    pub count: u64,
    pub vn: [f64; EVENT_PLANE_HARMONICS],
    pub vn_err: [f64; EVENT_PLANE_HARMONICS],
    pub psin: [f64; EVENT_PLANE_HARMONICS],
    pub psin_err: [f64; EVENT_PLANE_HARMONICS],
}
