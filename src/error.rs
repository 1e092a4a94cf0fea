//! Error types for scanning, configuration and merging.

use std::path::PathBuf;

use thiserror::Error;

/// Per-file failures. These never abort a run: the file contributes an
/// empty result and the failure is recorded in the run statistics.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{} is not valid UTF-8", path.display())]
    Encoding { path: PathBuf },
    #[error("{} exceeds the {limit_kb} KiB size limit", path.display())]
    TooLarge { path: PathBuf, limit_kb: u64 },
    #[error("read task for {} was cancelled", path.display())]
    Cancelled { path: PathBuf },
}

impl ScanError {
    /// The file this failure belongs to.
    pub fn path(&self) -> &PathBuf {
        match self {
            ScanError::Read { path, .. }
            | ScanError::Encoding { path }
            | ScanError::TooLarge { path, .. }
            | ScanError::Cancelled { path } => path,
        }
    }
}

/// Problems with the configuration file or overrides.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("reading config: {0}")]
    Io(#[from] std::io::Error),
    #[error("parsing config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("limit must be a positive integer, got {0}")]
    InvalidLimit(i64),
    #[error("max_in_flight must be a positive integer, got {0}")]
    InvalidConcurrency(i64),
    #[error("max_file_kb must be a positive integer, got {0}")]
    InvalidFileSize(i64),
    #[error("unknown service category {0:?}, expected business or utility")]
    UnknownCategory(String),
    #[error("invalid glob {pattern:?}: {source}")]
    InvalidGlob {
        pattern: String,
        #[source]
        source: globset::Error,
    },
}

/// Raised by the aggregator only under the `error` conflict policy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AggregateError {
    #[error("conflicting {field} for {route}: {first:?} ({first_file}) vs {second:?} ({second_file})")]
    Conflict {
        route: String,
        field: String,
        first: String,
        first_file: String,
        second: String,
        second_file: String,
    },
}
