//! Tool error types.

use thiserror::Error;

/// Errors raised when running a [`Tool`](super::Tool).
#[derive(Debug, Error)]
pub enum ToolError {
    /// No tool with this name is available.
    #[error("tool {name} not found")]
    NotFound { name: String },

    /// The tool was built without an executor.
    #[error("no executor available for tool {name}")]
    MissingExecutor { name: String },

    /// The executor ran and failed.
    #[error("tool {name} failed: {source}")]
    Execution {
        name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}
