//! Configuration error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while locating, reading, or validating a config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse YAML config {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },

    /// The file parsed but a server entry is unusable.
    #[error("invalid config: {reason}")]
    Invalid { reason: String },
}
