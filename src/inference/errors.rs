//! Inference error types.
//!
//! All errors implement `std::error::Error` via `thiserror`. Structured logging
//! is the caller's responsibility; these types carry the context needed to build
//! meaningful log entries.

use thiserror::Error;

/// Errors that can occur during inference operations.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// The configured endpoint URL could not be parsed.
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl {
        url: String,
        reason: String,
    },

    /// The chat request could not be sent or its body could not be read.
    #[error("chat request to {endpoint} failed: {reason}")]
    ChatRequest {
        endpoint: String,
        reason: String,
    },

    /// Non-2xx HTTP response from the model endpoint.
    #[error("HTTP {status}: {body}")]
    HttpError {
        status: u16,
        body: String,
    },

    /// NDJSON parsing or chunk-level error.
    #[error("stream error: {reason}")]
    StreamError {
        reason: String,
    },

    /// A tool could not be converted into Ollama's function-tool shape.
    #[error("failed to convert tool {tool}: {reason}")]
    ToolConversion {
        tool: String,
        reason: String,
    },

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,
}

impl InferenceError {
    /// Check if this error is an Ollama tool call parse failure (HTTP 500).
    ///
    /// Ollama returns HTTP 500 with `"error parsing tool call"` when the model
    /// generates malformed JSON in tool call arguments.
    pub fn is_tool_call_parse_error(&self) -> bool {
        matches!(
            self,
            InferenceError::HttpError { status: 500, body }
                if body.contains("error parsing tool call")
        )
    }
}
