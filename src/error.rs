use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by scanning and folder opening.
///
/// Per-entry filesystem failures inside a folder walk are not errors; they
/// are counted on the measurement and the walk moves on.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("no storage volumes found to scan")]
    NoVolumes,

    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build scan thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("path does not exist: {0}")]
    NotFound(PathBuf),

    #[error("could not open folder {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, ScanError>;
