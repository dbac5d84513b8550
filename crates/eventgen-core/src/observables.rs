//! Per-event observables and their fixed little-endian record layout.

use crate::common::constants::{
    ET_ETA_MAX, EVENT_PLANE_HARMONICS, FLOW_ETA_MAX, FLOW_HARMONICS, FLOW_PT_MAX, FLOW_PT_MIN,
    IDENTIFIED_Y_MAX, NCH_ETA_MAX, PT_FLUCT_ETA_MAX, PT_FLUCT_PT_MAX, PT_FLUCT_PT_MIN, SPECIES,
};
use crate::domain::{EventError, SampledParticle};
use crate::particles::{EventPlaneEstimate, ParticleSet};
use num_complex::Complex64;
use serde::Serialize;

const NSPECIES: usize = SPECIES.len();

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PtFluctuation {
    pub n: i64,
    pub sum_pt: f64,
    pub sum_ptsq: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FlowVectors {
    pub n: i64,
    pub qn: [Complex64; FLOW_HARMONICS],
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EventPlaneRecord {
    pub n: i64,
    pub vn: [f64; EVENT_PLANE_HARMONICS],
    pub vn_err: [f64; EVENT_PLANE_HARMONICS],
    pub psin: [f64; EVENT_PLANE_HARMONICS],
    pub psin_err: [f64; EVENT_PLANE_HARMONICS],
}

impl From<&EventPlaneEstimate> for EventPlaneRecord {
    fn from(estimate: &EventPlaneEstimate) -> Self {
        Self {
            n: estimate.count as i64,
            vn: estimate.vn,
            vn_err: estimate.vn_err,
            psin: estimate.psin,
            psin_err: estimate.psin_err,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ResultsRecord {
    pub initial_entropy: f64,
    pub nsamples: i64,
    pub dnch_deta: f64,
    pub det_deta: f64,
    pub dn_dy: [f64; NSPECIES],
    pub mean_pt: [f64; NSPECIES],
    pub pt_fluct: PtFluctuation,
    pub flow: FlowVectors,
    pub event_plane: EventPlaneRecord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldKind {
    Scalar {
        dtype: &'static str,
        count: usize,
    },
    Group {
        fields: &'static [RecordField],
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecordField {
    pub name: &'static str,
    #[serde(flatten)]
    pub kind: FieldKind,
}

const fn scalar(name: &'static str, dtype: &'static str, count: usize) -> RecordField {
    RecordField {
        name,
        kind: FieldKind::Scalar { dtype, count },
    }
}

const fn group(name: &'static str, fields: &'static [RecordField]) -> RecordField {
    RecordField {
        name,
        kind: FieldKind::Group { fields },
    }
}

const SPECIES_FIELDS: [RecordField; NSPECIES] = [
    scalar(SPECIES[0].0, "<f8", 1),
    scalar(SPECIES[1].0, "<f8", 1),
    scalar(SPECIES[2].0, "<f8", 1),
    scalar(SPECIES[3].0, "<f8", 1),
    scalar(SPECIES[4].0, "<f8", 1),
    scalar(SPECIES[5].0, "<f8", 1),
    scalar(SPECIES[6].0, "<f8", 1),
];

const PT_FLUCT_FIELDS: [RecordField; 3] = [
    scalar("N", "<i8", 1),
    scalar("sum_pT", "<f8", 1),
    scalar("sum_pTsq", "<f8", 1),
];

const FLOW_FIELDS: [RecordField; 2] = [
    scalar("N", "<i8", 1),
    scalar("Qn", "<c16", FLOW_HARMONICS),
];

const EVENT_PLANE_FIELDS: [RecordField; 5] = [
    scalar("N", "<i8", 1),
    scalar("vn", "<f8", EVENT_PLANE_HARMONICS),
    scalar("vn_err", "<f8", EVENT_PLANE_HARMONICS),
    scalar("psin", "<f8", EVENT_PLANE_HARMONICS),
    scalar("psin_err", "<f8", EVENT_PLANE_HARMONICS),
];

pub const RECORD_LAYOUT: &[RecordField] = &[
    scalar("initial_entropy", "<f8", 1),
    scalar("nsamples", "<i8", 1),
    scalar("dNch_deta", "<f8", 1),
    scalar("dET_deta", "<f8", 1),
    group("dN_dy", &SPECIES_FIELDS),
    group("mean_pT", &SPECIES_FIELDS),
    group("pT_fluct", &PT_FLUCT_FIELDS),
    group("flow", &FLOW_FIELDS),
    group("event_plane", &EVENT_PLANE_FIELDS),
];

fn dtype_width(dtype: &str) -> usize {
    match dtype {
        "<c16" => 16,
        _ => 8,
    }
}

impl RecordField {
    pub fn size(&self) -> usize {
        match self.kind {
            FieldKind::Scalar { dtype, count } => dtype_width(dtype) * count,
            FieldKind::Group { fields } => fields.iter().map(RecordField::size).sum(),
        }
    }

    fn numpy(&self) -> String {
        match self.kind {
            FieldKind::Scalar { dtype, count: 1 } => format!("('{}', '{}')", self.name, dtype),
            FieldKind::Scalar { dtype, count } => {
                format!("('{}', '{}', {})", self.name, dtype, count)
            }
            FieldKind::Group { fields } => format!("('{}', {})", self.name, numpy_list(fields)),
        }
    }
}

fn numpy_list(fields: &[RecordField]) -> String {
    let inner = fields
        .iter()
        .map(RecordField::numpy)
        .collect::<Vec<_>>()
        .join(", ");
    format!("[{inner}]")
}

pub fn record_size() -> usize {
    RECORD_LAYOUT.iter().map(RecordField::size).sum()
}

pub const RECORD_SIZE: usize = 536;

/// The layout as a numpy structured dtype, e.g. for `np.fromfile(path, dtype)`.
pub fn numpy_dtype() -> String {
    numpy_list(RECORD_LAYOUT)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordLayoutError {
    #[error("results record needs {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },
    #[error("trailing partial record of {remainder} bytes after {complete} complete records")]
    Trailing { complete: usize, remainder: usize },
}

impl From<RecordLayoutError> for EventError {
    fn from(error: RecordLayoutError) -> Self {
        EventError::invariant("INVARIANT.RECORD_LAYOUT", error.to_string())
    }
}

struct RecordWriter {
    bytes: Vec<u8>,
}

impl RecordWriter {
    fn f8(&mut self, value: f64) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    fn i8(&mut self, value: i64) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    fn f8s(&mut self, values: &[f64]) {
        values.iter().for_each(|value| self.f8(*value));
    }

    fn c16s(&mut self, values: &[Complex64]) {
        for value in values {
            self.f8(value.re);
            self.f8(value.im);
        }
    }
}

struct RecordReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl RecordReader<'_> {
    fn word(&mut self) -> [u8; 8] {
        let mut word = [0_u8; 8];
        word.copy_from_slice(&self.bytes[self.offset..self.offset + 8]);
        self.offset += 8;
        word
    }

    fn f8(&mut self) -> f64 {
        f64::from_le_bytes(self.word())
    }

    fn i8(&mut self) -> i64 {
        i64::from_le_bytes(self.word())
    }

    fn f8s<const N: usize>(&mut self) -> [f64; N] {
        std::array::from_fn(|_| self.f8())
    }

    fn c16s<const N: usize>(&mut self) -> [Complex64; N] {
        std::array::from_fn(|_| {
            let re = self.f8();
            let im = self.f8();
            Complex64::new(re, im)
        })
    }
}

impl ResultsRecord {
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = RecordWriter {
            bytes: Vec::with_capacity(RECORD_SIZE),
        };
        writer.f8(self.initial_entropy);
        writer.i8(self.nsamples);
        writer.f8(self.dnch_deta);
        writer.f8(self.det_deta);
        writer.f8s(&self.dn_dy);
        writer.f8s(&self.mean_pt);
        writer.i8(self.pt_fluct.n);
        writer.f8(self.pt_fluct.sum_pt);
        writer.f8(self.pt_fluct.sum_ptsq);
        writer.i8(self.flow.n);
        writer.c16s(&self.flow.qn);
        writer.i8(self.event_plane.n);
        writer.f8s(&self.event_plane.vn);
        writer.f8s(&self.event_plane.vn_err);
        writer.f8s(&self.event_plane.psin);
        writer.f8s(&self.event_plane.psin_err);
        writer.bytes
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, RecordLayoutError> {
        if bytes.len() != RECORD_SIZE {
            return Err(RecordLayoutError::Length {
                expected: RECORD_SIZE,
                actual: bytes.len(),
            });
        }
        let mut reader = RecordReader { bytes, offset: 0 };
        Ok(Self {
            initial_entropy: reader.f8(),
            nsamples: reader.i8(),
            dnch_deta: reader.f8(),
            det_deta: reader.f8(),
            dn_dy: reader.f8s(),
            mean_pt: reader.f8s(),
            pt_fluct: PtFluctuation {
                n: reader.i8(),
                sum_pt: reader.f8(),
                sum_ptsq: reader.f8(),
            },
            flow: FlowVectors {
                n: reader.i8(),
                qn: reader.c16s(),
            },
            event_plane: EventPlaneRecord {
                n: reader.i8(),
                vn: reader.f8s(),
                vn_err: reader.f8s(),
                psin: reader.f8s(),
                psin_err: reader.f8s(),
            },
        })
    }

    /// Observables of one event from its pooled particles.
    pub fn compute(
        initial_entropy: f64,
        set: &ParticleSet,
        event_plane: &EventPlaneEstimate,
    ) -> Self {
        let nsamples = set.nsamples.max(1) as f64;
        let charged = || set.particles().filter(|p| p.is_charged());

        let dnch_deta = charged().filter(|p| p.eta.abs() < NCH_ETA_MAX).count() as f64
            / nsamples
            / (2.0 * NCH_ETA_MAX);
        let det_deta = set
            .particles()
            .filter(|p| p.eta.abs() < ET_ETA_MAX)
            .map(|p| p.et)
            .sum::<f64>()
            / nsamples
            / (2.0 * ET_ETA_MAX);

        let mut dn_dy = [0.0; NSPECIES];
        let mut mean_pt = [f64::NAN; NSPECIES];
        for (index, (_, id)) in SPECIES.iter().enumerate() {
            let selected = set
                .particles()
                .filter(|p| p.species.abs() == *id && p.y.abs() < IDENTIFIED_Y_MAX)
                .map(|p| p.pt)
                .collect::<Vec<_>>();
            dn_dy[index] = selected.len() as f64 / nsamples / (2.0 * IDENTIFIED_Y_MAX);
            if !selected.is_empty() {
                mean_pt[index] = selected.iter().sum::<f64>() / selected.len() as f64;
            }
        }

        let mut pt_fluct = PtFluctuation::default();
        for p in charged().filter(|p| {
            p.eta.abs() < PT_FLUCT_ETA_MAX && p.pt > PT_FLUCT_PT_MIN && p.pt < PT_FLUCT_PT_MAX
        }) {
            pt_fluct.n += 1;
            pt_fluct.sum_pt += p.pt;
            pt_fluct.sum_ptsq += p.pt * p.pt;
        }

        let flow = flow_vectors(charged().filter(|p| {
            p.eta.abs() < FLOW_ETA_MAX && p.pt > FLOW_PT_MIN && p.pt < FLOW_PT_MAX
        }));

        Self {
            initial_entropy,
            nsamples: set.nsamples as i64,
            dnch_deta,
            det_deta,
            dn_dy,
            mean_pt,
            pt_fluct,
            flow,
            event_plane: EventPlaneRecord::from(event_plane),
        }
    }
}

fn flow_vectors<'a>(particles: impl Iterator<Item = &'a SampledParticle>) -> FlowVectors {
    let mut flow = FlowVectors::default();
    for particle in particles {
        flow.n += 1;
        for (index, q) in flow.qn.iter_mut().enumerate() {
            *q += Complex64::from_polar(1.0, (index + 1) as f64 * particle.phi);
        }
    }
    flow
}

#[cfg(test)]
mod tests {
    use super::{
        RECORD_LAYOUT, RECORD_SIZE, RecordLayoutError, ResultsRecord, numpy_dtype, record_size,
    };
    use crate::domain::SampledParticle;
    use crate::particles::{EventPlaneEstimate, ParticleSet};
    use num_complex::Complex64;

    fn particle(species: i64, charge: i64, pt: f64, phi: f64, eta: f64) -> SampledParticle {
        SampledParticle {
            species,
            charge,
            pt,
            et: pt,
            mt: pt,
            phi,
            y: eta,
            eta,
        }
    }

    #[test]
    fn layout_adds_up_to_fixed_record_size() {
        assert_eq!(record_size(), RECORD_SIZE);
        assert_eq!(ResultsRecord::default().encode().len(), RECORD_SIZE);
        assert_eq!(RECORD_LAYOUT.len(), 9);
    }

    #[test]
    fn numpy_dtype_names_nested_fields() {
        let dtype = numpy_dtype();
        assert!(dtype.starts_with("[('initial_entropy', '<f8'), ('nsamples', '<i8')"));
        assert!(dtype.contains("('dN_dy', [('pion', '<f8'), ('kaon', '<f8')"));
        assert!(dtype.contains("('flow', [('N', '<i8'), ('Qn', '<c16', 8)])"));
        assert!(dtype.ends_with("('psin_err', '<f8', 7)])]"));
    }

    #[test]
    fn layout_serializes_as_json_tree() {
        let json = serde_json::to_value(RECORD_LAYOUT).expect("layout should serialize");
        assert_eq!(json[0]["name"], "initial_entropy");
        assert_eq!(json[0]["dtype"], "<f8");
        assert_eq!(json[7]["fields"][1]["count"], 8);
    }

    #[test]
    fn encoded_fields_sit_at_documented_offsets() {
        let mut record = ResultsRecord {
            initial_entropy: 1.5,
            nsamples: 42,
            ..ResultsRecord::default()
        };
        record.flow.qn[0] = Complex64::new(3.0, -4.0);
        record.event_plane.psin_err[6] = 9.25;
        let bytes = record.encode();

        assert_eq!(bytes[0..8], 1.5_f64.to_le_bytes());
        assert_eq!(bytes[8..16], 42_i64.to_le_bytes());
        // 32 scalars + 112 species + 24 pT fluct + N of flow
        assert_eq!(bytes[176..184], 3.0_f64.to_le_bytes());
        assert_eq!(bytes[184..192], (-4.0_f64).to_le_bytes());
        assert_eq!(bytes[528..536], 9.25_f64.to_le_bytes());
        assert_eq!(
            ResultsRecord::decode(&bytes).expect("record should decode"),
            record
        );
    }

    #[test]
    fn wrong_length_is_rejected() {
        assert_eq!(
            ResultsRecord::decode(&[0_u8; 100]),
            Err(RecordLayoutError::Length {
                expected: RECORD_SIZE,
                actual: 100
            })
        );
    }

    #[test]
    fn multiplicities_are_per_sample_and_unit_window() {
        let set = ParticleSet::from_samples(vec![
            vec![
                particle(211, 1, 0.5, 0.0, 0.1),
                particle(-211, -1, 0.7, 0.0, -0.3),
                particle(111, 0, 0.4, 0.0, 0.0),
            ],
            vec![
                particle(2212, 1, 1.0, 0.0, 0.45),
                particle(211, 1, 0.6, 0.0, 2.0),
            ],
        ]);
        let record = ResultsRecord::compute(10.0, &set, &EventPlaneEstimate::default());

        assert_eq!(record.initial_entropy, 10.0);
        assert_eq!(record.nsamples, 2);
        assert!((record.dnch_deta - 1.5).abs() < 1.0e-12);
        let et_sum = 0.5 + 0.7 + 0.4 + 1.0;
        assert!((record.det_deta - et_sum / 2.0 / 1.2).abs() < 1.0e-12);
        assert!((record.dn_dy[0] - 1.0).abs() < 1.0e-12);
        assert!((record.mean_pt[0] - 0.6).abs() < 1.0e-12);
        assert!((record.dn_dy[2] - 0.5).abs() < 1.0e-12);
        assert!(record.mean_pt[1].is_nan());
        assert_eq!(record.pt_fluct.n, 3);
    }

    #[test]
    fn flow_vectors_sum_unit_phases() {
        let set = ParticleSet::from_samples(vec![vec![
            particle(211, 1, 1.0, 0.0, 0.0),
            particle(211, 1, 1.0, std::f64::consts::FRAC_PI_2, 0.0),
            particle(211, 1, 10.0, 1.0, 0.0),
        ]]);
        let record = ResultsRecord::compute(0.0, &set, &EventPlaneEstimate::default());

        assert_eq!(record.flow.n, 2);
        assert!((record.flow.qn[0] - Complex64::new(1.0, 1.0)).norm() < 1.0e-12);
        assert!((record.flow.qn[1] - Complex64::new(0.0, 0.0)).norm() < 1.0e-12);
    }

    #[test]
    fn event_plane_estimate_is_copied() {
        let mut estimate = EventPlaneEstimate {
            count: 1_000_000,
            ..EventPlaneEstimate::default()
        };
        estimate.vn[1] = 0.08;
        let record = ResultsRecord::compute(0.0, &ParticleSet::default(), &estimate);
        assert_eq!(record.event_plane.n, 1_000_000);
        assert_eq!(record.event_plane.vn[1], 0.08);
    }
}
