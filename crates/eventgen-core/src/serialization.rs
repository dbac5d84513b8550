use crate::domain::{EventError, EventResult};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

pub const F64_WIDTH: usize = std::mem::size_of::<f64>();

pub fn encode_f64_le(values: &[f64]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(values.len() * F64_WIDTH);
    for value in values {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// `None` when the byte count is not a whole number of doubles.
pub fn decode_f64_le(bytes: &[u8]) -> Option<Vec<f64>> {
    if bytes.len() % F64_WIDTH != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(F64_WIDTH)
            .map(|chunk| {
                let mut raw = [0_u8; F64_WIDTH];
                raw.copy_from_slice(chunk);
                f64::from_le_bytes(raw)
            })
            .collect(),
    )
}

pub fn write_binary_artifact(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    fs::write(path, bytes)
}

pub fn write_f64_artifact(path: &Path, values: &[f64]) -> EventResult<()> {
    write_binary_artifact(path, &encode_f64_le(values)).map_err(|source| {
        EventError::io_system(
            "IO.STAGE_DATA_WRITE",
            format!("failed to write '{}': {}", path.display(), source),
        )
    })
}

pub fn read_f64_artifact(path: &Path) -> EventResult<Vec<f64>> {
    let bytes = fs::read(path).map_err(|source| {
        EventError::io_system(
            "IO.STAGE_DATA_READ",
            format!("failed to read '{}': {}", path.display(), source),
        )
    })?;
    decode_f64_le(&bytes).ok_or_else(|| {
        EventError::invariant(
            "INVARIANT.STAGE_DATA_WIDTH",
            format!(
                "'{}' holds {} bytes, not a whole number of 8-byte doubles",
                path.display(),
                bytes.len()
            ),
        )
    })
}

/// Delete a stage output left over from an earlier invocation.
pub fn remove_stale(path: &Path) -> EventResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(source) if source.kind() == ErrorKind::NotFound => Ok(()),
        Err(source) => Err(EventError::io_system(
            "IO.STAGE_DATA_WRITE",
            format!("failed to remove stale '{}': {}", path.display(), source),
        )),
    }
}
