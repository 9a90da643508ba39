/// Append-only CSV log of session samples
use log::debug;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use crate::error::SinkError;
use crate::models::{Sample, CSV_HEADER};

/// Writes samples for one session to one file
///
/// The file is opened in append mode for every row so prior content is never
/// rewritten and a crash loses at most the row being written.
#[derive(Debug, Clone)]
pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CsvSink { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the header iff the file is missing or empty
    ///
    /// Creates the parent directory when needed. Returns whether a header was
    /// written.
    pub fn ensure_header(&self) -> Result<bool, SinkError> {
        let empty = match fs::metadata(&self.path) {
            Ok(meta) => meta.len() == 0,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(e) => return Err(e.into()),
        };

        if !empty {
            return Ok(false);
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        self.write_record(&CSV_HEADER)?;
        debug!("Wrote CSV header to {}", self.path.display());
        Ok(true)
    }

    /// Append one sample as a row
    pub fn append(&self, sample: &Sample) -> Result<(), SinkError> {
        self.write_record(&sample.to_record())
    }

    fn write_record<I, T>(&self, record: I) -> Result<(), SinkError>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(file);
        writer.write_record(record)?;
        writer.flush()?;
        Ok(())
    }
}
