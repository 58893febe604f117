use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use log::debug;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Outcome of comparing a file's digest with the listed one.
///
/// A mismatch is a normal result, not an error; only read failures are
/// reported through [`Error`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Matched,
    Mismatch { expected: String, actual: String },
}

impl Verification {
    pub fn is_match(&self) -> bool {
        matches!(self, Verification::Matched)
    }
}

impl fmt::Display for Verification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verification::Matched => write!(f, "SHA256 value verified, ok"),
            Verification::Mismatch { expected, actual } => {
                write!(f, "SHA256 values don't match: expected {expected}, got {actual}")
            }
        }
    }
}

/// Lowercase hex SHA-256 of everything `reader` yields.
pub fn sha256_hex<R: Read>(mut reader: R) -> io::Result<String> {
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Streams `path` through SHA-256 and compares, case-sensitively, with
/// `expected_hex`.
pub fn verify(path: &Path, expected_hex: &str) -> Result<Verification> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let actual = sha256_hex(io::BufReader::new(file)).map_err(|e| Error::io(path, e))?;
    debug!("sha256 of {} is {actual}", path.display());

    if actual == expected_hex {
        Ok(Verification::Matched)
    } else {
        Ok(Verification::Mismatch {
            expected: expected_hex.to_string(),
            actual,
        })
    }
}
