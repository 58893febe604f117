use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::verify::Verification;

/// One highlighted row of the release listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadRecord {
    pub name: String,
    pub location: String,
    pub expected_digest: String,
}

/// Resolved inputs of a single download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferTarget {
    pub destination: PathBuf,
    pub source: String,
    pub expected_digest: String,
}

impl TransferTarget {
    /// Builds the target for `record` inside `output_dir`.
    ///
    /// Only the last path component of the record name is used, so a listing
    /// cannot place the artifact outside `output_dir`.
    pub fn from_record(record: DownloadRecord, output_dir: &Path) -> Result<Self> {
        let file_name = Path::new(&record.name)
            .file_name()
            .ok_or_else(|| {
                Error::fs(
                    output_dir.join(&record.name),
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        "record name has no file component",
                    ),
                )
            })?
            .to_owned();

        Ok(Self {
            destination: output_dir.join(file_name),
            source: record.location,
            expected_digest: record.expected_digest,
        })
    }
}

#[derive(Debug)]
pub struct Report {
    pub record: DownloadRecord,
    pub path: PathBuf,
    pub bytes: u64,
    /// Time spent on the transfer itself.
    pub elapsed: Duration,
    pub verification: Verification,
}
