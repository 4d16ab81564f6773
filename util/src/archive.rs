//! Struct archiving functionality
//!
//! Archives are CSV files in the session's `arch` directory, with one row per serialised record.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use csv::WriterBuilder;
pub use csv::Writer;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::path::Path;
use thiserror::Error;

// Internal imports
use crate::session::Session;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// An object used to write CSV archive files.
#[derive(Default)]
pub struct Archiver {
    writer: Option<Writer<File>>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Cannot open the archive file: {0}")]
    FileError(std::io::Error),

    #[error("Cannot write the record: {0}")]
    CsvError(csv::Error),

    #[error("The archiver has not been initialised")]
    NotInitialised,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Archiver {
    /// Create a new archiver from a paricular path relative to the session's
    /// archive root.
    pub fn from_path<P: AsRef<Path>>(session: &Session, path: P) -> Result<Self, ArchiveError> {
        Self::from_file_path(session.arch_root.join(path))
    }

    /// Create a new archiver writing to the given file, truncating it if it exists.
    pub fn from_file_path<P: AsRef<Path>>(path: P) -> Result<Self, ArchiveError> {
        let file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .create(true)
            .open(path)
            .map_err(ArchiveError::FileError)?;

        let w = WriterBuilder::new().has_headers(true).from_writer(file);

        Ok(Self { writer: Some(w) })
    }

    /// Serialise a record into the archive.
    pub fn serialise<T: Serialize>(&mut self, record: T) -> Result<(), ArchiveError> {
        match self.writer {
            Some(ref mut w) => {
                w.serialize(record).map_err(ArchiveError::CsvError)?;
                w.flush().map_err(ArchiveError::FileError)
            }
            None => Err(ArchiveError::NotInitialised),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Serialize)]
    struct Row {
        time_s: f64,
        feasible: bool,
    }

    #[test]
    fn test_archive_rows() {
        let path = std::env::temp_dir().join("util_archive_test_rows.csv");

        let mut arch = Archiver::from_file_path(&path).unwrap();
        arch.serialise(Row { time_s: 0.5, feasible: true }).unwrap();
        arch.serialise(Row { time_s: 1.0, feasible: false }).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "time_s,feasible\n0.5,true\n1.0,false\n");

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_default_archiver_errors() {
        assert!(matches!(
            Archiver::default().serialise(Row { time_s: 0.0, feasible: true }),
            Err(ArchiveError::NotInitialised)
        ));
    }
}
