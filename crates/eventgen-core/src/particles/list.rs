use super::sampling::ParticleSet;
use crate::domain::{EventError, EventResult, SampledParticle};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

/// One line of the particle-list file: the particles of one oversample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticleListEntry {
    pub event: u64,
    pub sample: u64,
    pub particles: Vec<SampledParticle>,
}

/// Append the final particles of `event`, one JSON line per oversample.
pub fn append_particle_list(path: &Path, event: u64, set: &ParticleSet) -> EventResult<()> {
    let write_error = |reason: String| {
        EventError::io_system(
            "IO.PARTICLE_LIST_WRITE",
            format!("failed to append particles to '{}': {}", path.display(), reason),
        )
    };
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| write_error(e.to_string()))?;
    let mut writer = BufWriter::new(file);
    for (sample, particles) in set.samples.iter().enumerate() {
        let entry = ParticleListEntry {
            event,
            sample: sample as u64,
            particles: particles.clone(),
        };
        serde_json::to_writer(&mut writer, &entry).map_err(|e| write_error(e.to_string()))?;
        writer
            .write_all(b"\n")
            .map_err(|e| write_error(e.to_string()))?;
    }
    writer.flush().map_err(|e| write_error(e.to_string()))
}

pub fn read_particle_lists(path: &Path) -> EventResult<Vec<ParticleListEntry>> {
    let content = fs::read_to_string(path).map_err(|source| {
        EventError::io_system(
            "IO.PARTICLE_LIST_READ",
            format!("failed to read '{}': {}", path.display(), source),
        )
    })?;
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .enumerate()
        .map(|(index, line)| {
            serde_json::from_str(line).map_err(|source| {
                EventError::invariant(
                    "INVARIANT.PARTICLE_LIST_FORMAT",
                    format!("'{}' entry {}: {}", path.display(), index, source),
                )
            })
        })
        .collect()
}
