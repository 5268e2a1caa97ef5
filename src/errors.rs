//! Crate-wide error taxonomy.
//!
//! Mirrors the kinds distinguished in the design: configuration failures are
//! reported before any mining starts, KB I/O failures abort the run, and
//! rule-transition failures never escape the candidate boundary (they are
//! represented by [`crate::rule::core::UpdateStatus`], not by these types).

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while resolving CLI flags / config files into a [`crate::config::Config`].
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for -{flag}: {value} ({reason})")]
    InvalidFlag {
        flag: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("failed to load configuration: {0}")]
    Figment(#[from] figment::Error),

    #[error("missing required input path/name (-I)")]
    MissingInput,
}

/// Errors raised while reading or writing a KB on the local file system.
#[derive(Error, Debug)]
pub enum KbIoError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed relation file {path}: expected {expected} integers, found {found}")]
    BadRelationFile {
        path: PathBuf,
        expected: usize,
        found: usize,
    },

    #[error("malformed relation catalog entry at {path}:{line}: {reason}")]
    BadCatalogLine {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("missing constant map file for numeration block {0}")]
    MissingMapFile(usize),

    #[error("relation '{0}' not found in KB")]
    UnknownRelation(String),
}

impl KbIoError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        KbIoError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Top-level error returned by the driver binary.
#[derive(Error, Debug)]
pub enum SincError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    KbIo(#[from] KbIoError),

    #[error("invariant violated: {0}")]
    Internal(String),
}
