//! Text formats of the particle-producing stages.
//!
//! Sampler output is a sequence of oversamples, each introduced by a
//! `# <count>` header and followed by `count` rows of
//! `ID charge t x y z E px py pz`. Afterburner output is one row per final
//! particle: `sample ID charge pT ET mT phi y eta`.

use crate::domain::SampledParticle;
use std::io::Write;
use std::str::SplitWhitespace;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParticleFormatError {
    #[error("line {line}: {reason}")]
    Malformed { line: usize, reason: String },
    #[error("oversample {block} announced {expected} particles but holds {found}")]
    Truncated {
        block: usize,
        expected: usize,
        found: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawParticle {
    pub id: i64,
    pub charge: i64,
    /// t, x, y, z
    pub position: [f64; 4],
    pub energy: f64,
    pub momentum: [f64; 3],
}

impl RawParticle {
    pub fn kinematics(&self) -> SampledParticle {
        let [px, py, pz] = self.momentum;
        let energy = self.energy;
        let pt = px.hypot(py);
        let p = pt.hypot(pz);
        let (et, eta) = if p > 0.0 {
            (energy * pt / p, (pz / p).atanh())
        } else {
            (0.0, 0.0)
        };
        SampledParticle {
            species: self.id,
            charge: self.charge,
            pt,
            et,
            mt: (energy * energy - pz * pz).sqrt(),
            phi: py.atan2(px),
            y: 0.5 * ((energy + pz) / (energy - pz)).ln(),
            eta,
        }
    }

    fn write_row(&self, writer: &mut impl Write) -> std::io::Result<()> {
        let [t, x, y, z] = self.position;
        let [px, py, pz] = self.momentum;
        writeln!(
            writer,
            "{} {} {} {} {} {} {} {} {} {}",
            self.id, self.charge, t, x, y, z, self.energy, px, py, pz
        )
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct OversampleBlock {
    pub particles: Vec<RawParticle>,
}

struct Row<'a> {
    line: usize,
    fields: SplitWhitespace<'a>,
}

impl<'a> Row<'a> {
    fn new(line: usize, text: &'a str) -> Self {
        Self {
            line,
            fields: text.split_whitespace(),
        }
    }

    fn malformed(&self, reason: impl Into<String>) -> ParticleFormatError {
        ParticleFormatError::Malformed {
            line: self.line,
            reason: reason.into(),
        }
    }

    fn next_token(&mut self, name: &str) -> Result<&'a str, ParticleFormatError> {
        self.fields
            .next()
            .ok_or_else(|| self.malformed(format!("missing column '{name}'")))
    }

    fn integer(&mut self, name: &str) -> Result<i64, ParticleFormatError> {
        let token = self.next_token(name)?;
        token
            .parse::<i64>()
            .map_err(|_| self.malformed(format!("column '{name}' is not an integer: '{token}'")))
    }

    fn real(&mut self, name: &str) -> Result<f64, ParticleFormatError> {
        let token = self.next_token(name)?;
        token
            .parse::<f64>()
            .map_err(|_| self.malformed(format!("column '{name}' is not a number: '{token}'")))
    }

    fn finish(mut self) -> Result<(), ParticleFormatError> {
        match self.fields.next() {
            Some(extra) => Err(self.malformed(format!("unexpected extra column '{extra}'"))),
            None => Ok(()),
        }
    }
}

fn parse_raw_row(line: usize, text: &str) -> Result<RawParticle, ParticleFormatError> {
    let mut row = Row::new(line, text);
    let particle = RawParticle {
        id: row.integer("ID")?,
        charge: row.integer("charge")?,
        position: [
            row.real("t")?,
            row.real("x")?,
            row.real("y")?,
            row.real("z")?,
        ],
        energy: row.real("E")?,
        momentum: [row.real("px")?, row.real("py")?, row.real("pz")?],
    };
    row.finish()?;
    Ok(particle)
}

pub fn parse_sampler_output(content: &str) -> Result<Vec<OversampleBlock>, ParticleFormatError> {
    let mut blocks: Vec<OversampleBlock> = Vec::new();
    let mut expected = 0_usize;

    let check_complete = |blocks: &[OversampleBlock], expected: usize| match blocks.last() {
        Some(block) if block.particles.len() != expected => Err(ParticleFormatError::Truncated {
            block: blocks.len() - 1,
            expected,
            found: block.particles.len(),
        }),
        _ => Ok(()),
    };

    for (index, raw) in content.lines().enumerate() {
        let line = index + 1;
        let text = raw.trim();
        if text.is_empty() {
            continue;
        }
        if let Some(header) = text.strip_prefix('#') {
            check_complete(blocks.as_slice(), expected)?;
            expected = header.trim().parse::<usize>().map_err(|_| {
                ParticleFormatError::Malformed {
                    line,
                    reason: format!("invalid oversample header '{text}'"),
                }
            })?;
            blocks.push(OversampleBlock {
                particles: Vec::with_capacity(expected),
            });
            continue;
        }

        let Some(block) = blocks.last_mut() else {
            return Err(ParticleFormatError::Malformed {
                line,
                reason: "particle row before any '# <count>' header".to_string(),
            });
        };
        if block.particles.len() == expected {
            return Err(ParticleFormatError::Malformed {
                line,
                reason: format!("oversample holds more than the announced {expected} particles"),
            });
        }
        block.particles.push(parse_raw_row(line, text)?);
    }
    check_complete(blocks.as_slice(), expected)?;
    Ok(blocks)
}

/// Re-emit blocks in sampler format, as the afterburner expects its input.
pub fn write_oversample_blocks(
    writer: &mut impl Write,
    blocks: &[OversampleBlock],
) -> std::io::Result<()> {
    for block in blocks {
        writeln!(writer, "# {}", block.particles.len())?;
        for particle in &block.particles {
            particle.write_row(writer)?;
        }
    }
    Ok(())
}

/// `(sample, particle)` rows of the afterburner output.
pub fn parse_afterburner_output(
    content: &str,
) -> Result<Vec<(u64, SampledParticle)>, ParticleFormatError> {
    content
        .lines()
        .enumerate()
        .filter(|(_, raw)| {
            let text = raw.trim();
            !text.is_empty() && !text.starts_with('#')
        })
        .map(|(index, raw)| {
            let mut row = Row::new(index + 1, raw);
            let sample = row.integer("sample")?;
            let sample = u64::try_from(sample)
                .map_err(|_| row.malformed(format!("negative sample index {sample}")))?;
            let particle = SampledParticle {
                species: row.integer("ID")?,
                charge: row.integer("charge")?,
                pt: row.real("pT")?,
                et: row.real("ET")?,
                mt: row.real("mT")?,
                phi: row.real("phi")?,
                y: row.real("y")?,
                eta: row.real("eta")?,
            };
            row.finish()?;
            Ok((sample, particle))
        })
        .collect()
}
