use super::flow::{EventPlaneEstimate, HarmonicAccumulator};
use super::sampler::{
    OversampleBlock, ParticleFormatError, parse_afterburner_output, parse_sampler_output,
    write_oversample_blocks,
};
use crate::bridge::SURFACE_FILE;
use crate::common::RunConfig;
use crate::common::constants::PION_ID;
use crate::domain::{EventError, EventResult, SampledParticle, StageKind};
use crate::serialization::remove_stale;
use crate::stages::{StageInvocation, StageInvoker};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const SAMPLER_OUTPUT: &str = "samples.dat";
pub const AFTERBURNER_INPUT: &str = "particles_in.dat";
pub const AFTERBURNER_OUTPUT: &str = "particles_out.dat";

/// Final-state particles of one event, grouped by oversample.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParticleSet {
    pub nsamples: u64,
    pub samples: Vec<Vec<SampledParticle>>,
}

impl ParticleSet {
    pub fn from_samples(samples: Vec<Vec<SampledParticle>>) -> Self {
        Self {
            nsamples: samples.len() as u64,
            samples,
        }
    }

    /// Every particle of every oversample.
    pub fn particles(&self) -> impl Iterator<Item = &SampledParticle> + '_ {
        self.samples.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.samples.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.iter().all(Vec::is_empty)
    }
}

/// Result of the oversampling loop: either the particles themselves or, when
/// the afterburner runs, its prepared input file.
#[derive(Debug, Clone, PartialEq)]
pub enum Oversampled {
    Particles(ParticleSet),
    AfterburnerInput {
        nsamples: u64,
        nparticles: u64,
        path: PathBuf,
    },
}

fn format_violation(stage: StageKind, path: &Path, error: ParticleFormatError) -> EventError {
    EventError::invariant(
        "INVARIANT.PARTICLE_FORMAT",
        format!("{} output '{}': {}", stage, path.display(), error),
    )
}

fn read_text(path: &Path) -> EventResult<String> {
    fs::read_to_string(path).map_err(|source| {
        EventError::io_system(
            "IO.STAGE_DATA_READ",
            format!("failed to read '{}': {}", path.display(), source),
        )
    })
}

fn write_failure(path: &Path, source: std::io::Error) -> EventError {
    EventError::io_system(
        "IO.STAGE_DATA_WRITE",
        format!("failed to write '{}': {}", path.display(), source),
    )
}

pub struct Particlizer<'a, I> {
    invoker: I,
    config: &'a RunConfig,
    work_dir: &'a Path,
}

impl<'a, I: StageInvoker> Particlizer<'a, I> {
    pub fn new(invoker: I, config: &'a RunConfig, work_dir: &'a Path) -> Self {
        Self {
            invoker,
            config,
            work_dir,
        }
    }

    /// Run the sampler for `nsamples` oversamples of the current surface.
    pub fn sample(&self, nsamples: u64) -> EventResult<Vec<OversampleBlock>> {
        let output = self.work_dir.join(SAMPLER_OUTPUT);
        let invocation = StageInvocation::new(
            StageKind::Sampler,
            &self.config.programs.sampler,
            self.work_dir,
        )
        .arg(SURFACE_FILE)
        .arg(SAMPLER_OUTPUT)
        .setting("Tswitch", self.config.tswitch)
        .setting("nsamples", nsamples);
        remove_stale(&output)?;
        self.invoker.invoke(&invocation)?;

        let blocks = parse_sampler_output(&read_text(&output)?)
            .map_err(|error| format_violation(StageKind::Sampler, &output, error))?;
        if blocks.len() as u64 != nsamples {
            return Err(EventError::invariant(
                "INVARIANT.SAMPLER_OUTPUT",
                format!(
                    "sampler wrote {} oversamples, {} were requested",
                    blocks.len(),
                    nsamples
                ),
            ));
        }
        Ok(blocks)
    }

    /// Accumulate pion azimuths until enough are collected for a stable
    /// event-plane estimate.
    pub fn event_plane(&self) -> EventResult<EventPlaneEstimate> {
        let settings = self.config.event_plane;
        let mut accumulator = HarmonicAccumulator::new();
        let mut batches = 0;
        let mut produced = 0_u64;
        while accumulator.count() < settings.target_pions && batches < settings.max_batches {
            for block in self.sample(settings.batch)? {
                produced += block.particles.len() as u64;
                for particle in block.particles.iter().map(|raw| raw.kinematics()) {
                    if particle.species.abs() == PION_ID
                        && particle.pt > settings.pt_min
                        && particle.y.abs() < settings.y_max
                    {
                        accumulator.add(particle.phi);
                    }
                }
            }
            batches += 1;
            debug!(batches, pions = accumulator.count(), "event-plane batch");
            if produced == 0 {
                return Err(EventError::stop(
                    "RUN.NO_PARTICLES",
                    format!("sampler emitted no particles in {batches} event-plane batches"),
                ));
            }
        }

        if accumulator.count() == 0 {
            return Err(EventError::stop(
                "RUN.NO_PARTICLES",
                format!("no pions accepted for the event plane after {batches} batches"),
            ));
        }
        let estimate = accumulator.estimate();
        info!(
            pions = estimate.count,
            batches,
            v2 = estimate.vn[1],
            "event plane estimated"
        );
        Ok(estimate)
    }

    /// Sample until both the oversample and particle minimums are met or the
    /// oversample limit is reached.
    pub fn oversample(&self) -> EventResult<Oversampled> {
        let sampling = self.config.sampling;
        let input_path = self.work_dir.join(AFTERBURNER_INPUT);
        let mut afterburner_input = if self.config.afterburner {
            let file = File::create(&input_path).map_err(|e| write_failure(&input_path, e))?;
            Some(BufWriter::new(file))
        } else {
            None
        };

        let mut nsamples = 0_u64;
        let mut nparticles = 0_u64;
        let mut samples = Vec::new();
        loop {
            let batch = sampling.batch.min(sampling.max_samples - nsamples);
            let blocks = self.sample(batch)?;
            nsamples += blocks.len() as u64;
            nparticles += blocks
                .iter()
                .map(|block| block.particles.len() as u64)
                .sum::<u64>();

            match afterburner_input.as_mut() {
                Some(writer) => write_oversample_blocks(writer, &blocks)
                    .map_err(|e| write_failure(&input_path, e))?,
                None => samples.extend(blocks.iter().map(|block| {
                    block
                        .particles
                        .iter()
                        .map(|raw| raw.kinematics())
                        .collect::<Vec<_>>()
                })),
            }

            if nparticles == 0 {
                return Err(EventError::stop(
                    "RUN.NO_PARTICLES",
                    format!("sampler emitted no particles in {nsamples} oversamples"),
                ));
            }
            let satisfied =
                nsamples >= sampling.min_samples && nparticles >= sampling.min_particles;
            if satisfied || nsamples >= sampling.max_samples {
                break;
            }
        }

        info!(nsamples, nparticles, "oversampling finished");

        match afterburner_input {
            Some(mut writer) => {
                writer.flush().map_err(|e| write_failure(&input_path, e))?;
                Ok(Oversampled::AfterburnerInput {
                    nsamples,
                    nparticles,
                    path: input_path,
                })
            }
            None => Ok(Oversampled::Particles(ParticleSet::from_samples(samples))),
        }
    }

    /// Evolve the sampled hadrons through the afterburner.
    pub fn afterburn(&self, nsamples: u64) -> EventResult<ParticleSet> {
        let output = self.work_dir.join(AFTERBURNER_OUTPUT);
        let invocation = StageInvocation::new(
            StageKind::Afterburner,
            &self.config.programs.afterburner,
            self.work_dir,
        )
        .arg(AFTERBURNER_INPUT)
        .arg(AFTERBURNER_OUTPUT);
        remove_stale(&output)?;
        self.invoker.invoke(&invocation)?;

        let rows = parse_afterburner_output(&read_text(&output)?)
            .map_err(|error| format_violation(StageKind::Afterburner, &output, error))?;
        if let Some((sample, _)) = rows.iter().find(|(sample, _)| *sample >= nsamples) {
            return Err(EventError::invariant(
                "INVARIANT.AFTERBURNER_OUTPUT",
                format!("afterburner reported sample {sample} of only {nsamples}"),
            ));
        }
        let mut samples = vec![Vec::new(); nsamples as usize];
        for (sample, particle) in rows {
            samples[sample as usize].push(particle);
        }
        let set = ParticleSet::from_samples(samples);
        info!(nsamples, particles = set.len(), "afterburner finished");
        Ok(set)
    }
}
