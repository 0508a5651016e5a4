// Crate error type

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced at the boundary of the filter: input files, configuration and outputs.
///
/// The filtering core itself never fails once constructed; degenerate geometry,
/// non-causal timestamps and ill-conditioned covariances are handled in place.
#[derive(Debug, Error)]
pub enum Error {
    /// Reading or writing a file failed
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A measurement line could not be parsed
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },

    /// Filter configuration is invalid
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Filter configuration file is not valid JSON
    #[error("invalid configuration file: {0}")]
    ConfigFile(#[from] serde_json::Error),

    /// An output sink failed to write a row
    #[error("output error: {0}")]
    Output(String),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
