//! MCP Client — JSON-RPC over stdio for a set of MCP tool servers.
//!
//! This module handles:
//! - Spawning MCP server child processes and the initialize handshake
//! - JSON-RPC 2.0 communication over process stdio
//! - Aggregating every server's tools under `<server-id>:<tool>` names
//! - Routing tool calls back to the server that owns them
//!
//! [`McpClient`] is the entry point; [`McpSession`] is the per-server seam.

pub mod client;
pub mod convert;
pub mod errors;
pub mod lifecycle;
pub mod session;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use client::{generate_server_id, split_tool_name, McpClient, McpToolExecutor};
pub use convert::{convert_via_json, ConversionError};
pub use errors::McpError;
pub use session::{McpSession, StdioSession};
pub use types::{CallToolResult, Implementation, LaunchDescriptor, McpToolDefinition};
