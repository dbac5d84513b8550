//! Append-only stream of fixed-size results records.

use crate::domain::{EventError, EventResult};
use crate::observables::{RECORD_SIZE, RecordLayoutError, ResultsRecord};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct ResultsWriter {
    path: PathBuf,
    file: File,
    written: u64,
}

impl ResultsWriter {
    /// Open `path` for appending; earlier records are left untouched.
    pub fn open(path: &Path) -> EventResult<Self> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| open_error(path, source))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| open_error(path, source))?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records appended through this writer.
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn append(&mut self, record: &ResultsRecord) -> EventResult<()> {
        self.file
            .write_all(&record.encode())
            .and_then(|()| self.file.flush())
            .map_err(|source| {
                EventError::io_system(
                    "IO.RESULTS_WRITE",
                    format!(
                        "failed to append to results '{}': {}",
                        self.path.display(),
                        source
                    ),
                )
            })?;
        self.written += 1;
        Ok(())
    }
}

fn open_error(path: &Path, source: std::io::Error) -> EventError {
    EventError::io_system(
        "IO.RESULTS_OPEN",
        format!("failed to open results '{}': {}", path.display(), source),
    )
}

pub fn decode_records(bytes: &[u8]) -> Result<Vec<ResultsRecord>, RecordLayoutError> {
    let remainder = bytes.len() % RECORD_SIZE;
    if remainder != 0 {
        return Err(RecordLayoutError::Trailing {
            complete: bytes.len() / RECORD_SIZE,
            remainder,
        });
    }
    bytes
        .chunks_exact(RECORD_SIZE)
        .map(ResultsRecord::decode)
        .collect()
}

pub fn read_records(path: &Path) -> EventResult<Vec<ResultsRecord>> {
    let bytes = fs::read(path).map_err(|source| {
        EventError::io_system(
            "IO.RESULTS_READ",
            format!("failed to read results '{}': {}", path.display(), source),
        )
    })?;
    Ok(decode_records(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::{ResultsWriter, decode_records, read_records};
    use crate::domain::EventErrorCategory;
    use crate::observables::{RECORD_SIZE, RecordLayoutError, ResultsRecord};
    use std::fs::{self, OpenOptions};
    use std::io::Write;
    use tempfile::TempDir;

    fn record(entropy: f64) -> ResultsRecord {
        ResultsRecord {
            initial_entropy: entropy,
            nsamples: 10,
            ..ResultsRecord::default()
        }
    }

    #[test]
    fn records_accumulate_across_writers() {
        let temp = TempDir::new().expect("tempdir should be created");
        let path = temp.path().join("out").join("results.dat");

        let mut first = ResultsWriter::open(&path).expect("results should open");
        first.append(&record(1.0)).expect("record should append");
        first.append(&record(2.0)).expect("record should append");
        assert_eq!(first.written(), 2);
        drop(first);

        let mut second = ResultsWriter::open(&path).expect("results should reopen");
        second.append(&record(3.0)).expect("record should append");

        let records = read_records(&path).expect("records should decode");
        let entropies = records.iter().map(|r| r.initial_entropy).collect::<Vec<_>>();
        assert_eq!(entropies, vec![1.0, 2.0, 3.0]);
        assert_eq!(
            fs::metadata(&path).expect("results exist").len(),
            3 * RECORD_SIZE as u64
        );
    }

    #[test]
    fn trailing_partial_record_is_an_error() {
        let temp = TempDir::new().expect("tempdir should be created");
        let path = temp.path().join("results.dat");
        let mut writer = ResultsWriter::open(&path).expect("results should open");
        writer.append(&record(1.0)).expect("record should append");
        OpenOptions::new()
            .append(true)
            .open(&path)
            .and_then(|mut file| file.write_all(&[0_u8; 17]))
            .expect("garbage should be appended");

        let error = read_records(&path).expect_err("partial record should fail");
        assert_eq!(error.category(), EventErrorCategory::InvariantViolation);
        assert_eq!(
            decode_records(&[0_u8; RECORD_SIZE + 17]),
            Err(RecordLayoutError::Trailing {
                complete: 1,
                remainder: 17
            })
        );
    }

    #[test]
    fn empty_stream_has_no_records() {
        assert_eq!(decode_records(&[]), Ok(Vec::new()));
    }
}
