//! Error types and handling for the rattlescan library
//!
//! I/O failures always carry the path, the phase that failed and the byte
//! offset reached, so callers can act on them without guessing.

use std::{
    fmt::{self, Display, Formatter},
    io,
    path::{Path, PathBuf},
    result::Result as StdResult,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Custom result type for rattlescan operations
pub type Result<T> = StdResult<T, Error>;

/// Step of an operation during which an error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Open,
    Read,
    Seek,
    Write,
    Flush,
    Verify,
    Truncate,
    Rename,
    Remove,
}

impl Display for Phase {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Open => "open",
            Phase::Read => "read",
            Phase::Seek => "seek",
            Phase::Write => "write",
            Phase::Flush => "flush",
            Phase::Verify => "verify",
            Phase::Truncate => "truncate",
            Phase::Rename => "rename",
            Phase::Remove => "remove",
        };
        f.write_str(name)
    }
}

/// Readback mismatch detected while verifying a wipe pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationFailure {
    /// Zero-based index of the pass in its plan
    pub pass_index: usize,
    /// First mismatching byte offset
    pub offset_start: u64,
    /// One past the last mismatching byte of the failing chunk
    pub offset_end: u64,
    pub expected: u8,
    pub observed: u8,
    /// Mismatching bytes counted inside the failing chunk
    pub mismatched_bytes: u64,
}

impl Display for VerificationFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pass {} readback mismatch in bytes {}..{} (expected {:#04x}, observed {:#04x}, {} bytes differ)",
            self.pass_index + 1,
            self.offset_start,
            self.offset_end,
            self.expected,
            self.observed,
            self.mismatched_bytes
        )
    }
}

/// Core error type for rattlescan operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("I/O error during {phase} of {} at byte {offset}: {source}", path.display())]
    Io {
        path: PathBuf,
        phase: Phase,
        /// Bytes successfully consumed or written before the failure
        offset: u64,
        #[source]
        source: io::Error,
    },

    #[error("File not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Permission denied during {phase} of {}", path.display())]
    PermissionDenied { path: PathBuf, phase: Phase },

    #[error("Not a regular file: {}", path.display())]
    NotRegularFile { path: PathBuf },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Verification error: {0}")]
    Verification(VerificationFailure),

    #[error("Operation cancelled during {phase} at byte {offset}")]
    Cancelled { phase: Phase, offset: u64 },

    #[error("Invalid wipe plan: {0}")]
    InvalidPlan(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl Error {
    /// Classifies an `io::Error` into the dedicated not-found / permission
    /// variants, falling back to `Error::Io` with full context.
    pub fn from_io(path: &Path, phase: Phase, offset: u64, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound => Error::NotFound {
                path: path.to_path_buf(),
            },
            io::ErrorKind::PermissionDenied => Error::PermissionDenied {
                path: path.to_path_buf(),
                phase,
            },
            _ => Error::Io {
                path: path.to_path_buf(),
                phase,
                offset,
                source,
            },
        }
    }

    /// Phase of the operation this error belongs to, when known
    pub fn phase(&self) -> Option<Phase> {
        match self {
            Error::Io { phase, .. }
            | Error::PermissionDenied { phase, .. }
            | Error::Cancelled { phase, .. } => Some(*phase),
            Error::NotFound { .. } | Error::NotRegularFile { .. } => Some(Phase::Open),
            Error::Verification(_) => Some(Phase::Verify),
            _ => None,
        }
    }
}

/// Failure reported by a metadata extractor. Never aborts an analysis.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ExtractionError {
    #[error("Unsupported file type: {0}")]
    Unsupported(String),

    #[error("Extraction failed: {0}")]
    Failed(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
