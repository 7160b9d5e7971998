//! Tool abstraction: one invocable capability, independent of its provider.
//!
//! A [`Tool`] carries what the model needs to see (name, description,
//! parameter schema) plus a bound [`ToolExecutor`] that knows how to run it.
//! The MCP client produces tools; the inference client consumes them.

pub mod errors;
pub mod types;

pub use errors::ToolError;
pub use types::{ParameterSchema, PropertyDefinition, Tool, ToolExecutor, ToolFunction, ToolOutput};
