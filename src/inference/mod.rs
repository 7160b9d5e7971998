//! Inference Client — Ollama `/api/chat` client with tool calling.
//!
//! This module handles all communication with the local model endpoint:
//! - Non-streaming and streaming chat requests
//! - NDJSON response parsing and accumulation
//! - Declaring common tools in Ollama's function-tool shape
//! - Running the tool calls the model asks for

pub mod client;
pub mod errors;
pub mod streaming;
pub mod types;

// Re-exports for convenience
pub use client::{OllamaClient, OllamaOptions};
pub use errors::InferenceError;
pub use types::{ChatMessage, ChatResponse, Role, ToolCall, ToolDefinition};
