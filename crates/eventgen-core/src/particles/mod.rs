//! Particlization: sampling hadrons from the freeze-out surface, the
//! optional afterburner, and the event-plane estimate.

mod flow;
mod list;
mod sampler;
mod sampling;

pub use flow::{EventPlaneEstimate, HarmonicAccumulator};
pub use list::{ParticleListEntry, append_particle_list, read_particle_lists};
pub use sampler::{
    OversampleBlock, ParticleFormatError, RawParticle, parse_afterburner_output,
    parse_sampler_output, write_oversample_blocks,
};
pub use sampling::{
    AFTERBURNER_INPUT, AFTERBURNER_OUTPUT, Oversampled, ParticleSet, Particlizer, SAMPLER_OUTPUT,
};
