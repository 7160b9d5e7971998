//! MCP Client error types.

use thiserror::Error;

/// Errors that can occur during MCP client operations.
#[derive(Debug, Error)]
pub enum McpError {
    /// The server process could not be spawned or the handshake failed.
    #[error("failed to connect to MCP server '{name}': {reason}")]
    ConnectionFailed {
        name: String,
        reason: String,
    },

    /// A connection with the same id is already registered.
    #[error("server with ID {id} already exists")]
    DuplicateConnection {
        id: String,
    },

    /// No connection is registered.
    #[error("no servers connected")]
    NoConnections,

    /// Every connected server advertised zero tools.
    #[error("no tools found")]
    NoTools,

    /// A provider's input schema could not be converted to the common shape.
    #[error("failed to convert input schema for tool {tool}: {reason}")]
    SchemaConversion {
        tool: String,
        reason: String,
    },

    /// The display name is malformed or its connection is no longer registered.
    #[error("unknown tool: '{name}'")]
    UnknownTool {
        name: String,
    },

    /// The provider failed to run the tool.
    #[error("failed to call tool {tool}: {reason}")]
    ExecutionFailed {
        tool: String,
        reason: String,
    },

    /// JSON-RPC communication error (malformed message, I/O error).
    #[error("transport error for server '{server}': {reason}")]
    TransportError {
        server: String,
        reason: String,
    },

    /// Server returned a JSON-RPC error response.
    #[error("server error [{code}]: {message}")]
    ServerError {
        code: i32,
        message: String,
        data: Option<serde_json::Value>,
    },

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,
}
