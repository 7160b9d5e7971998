//! Shared types for the inference client.
//!
//! These mirror Ollama's `/api/chat` request and response bodies.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::mcp_client::convert::convert_via_json;
use crate::tool::Tool;

use super::errors::InferenceError;

// ─── Messages ────────────────────────────────────────────────────────────────

/// Message role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    #[default]
    Assistant,
    Tool,
}

/// A single message in the conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    /// Assistant messages may contain tool calls.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Tool results name the tool they answer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    /// A `tool` message carrying one call's result.
    pub fn tool_result(tool_name: &str, content: impl Into<String>) -> Self {
        Self {
            tool_name: Some(tool_name.to_string()),
            ..Self::with_role(Role::Tool, content)
        }
    }

    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_name: None,
        }
    }
}

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub function: ToolCallFunction,
}

/// Function name and already-decoded JSON arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallFunction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Map<String, serde_json::Value>,
}

impl ToolCall {
    pub fn new(name: &str, arguments: serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            function: ToolCallFunction {
                index: None,
                name: name.to_string(),
                arguments,
            },
        }
    }
}

// ─── Request / Response ──────────────────────────────────────────────────────

/// Request body for `POST /api/chat`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
    pub stream: bool,
}

/// One NDJSON chunk of a `/api/chat` response.
///
/// A non-streaming reply is a single chunk with `done: true`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default)]
    pub message: ChatMessage,
    #[serde(default)]
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eval_count: Option<u64>,
}

// ─── Tool Declarations ───────────────────────────────────────────────────────

/// Tool declaration in Ollama's function-tool shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub r#type: String,
    pub function: FunctionDefinition,
}

/// Function definition within a tool declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: FunctionParameters,
}

/// Parameter schema as Ollama expects it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionParameters {
    #[serde(rename = "type", default)]
    pub r#type: String,
    #[serde(rename = "$defs", default, skip_serializing_if = "Option::is_none")]
    pub defs: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<serde_json::Value>,
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, FunctionProperty>,
}

/// A single property of a function's parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionProperty {
    #[serde(rename = "type", default)]
    pub r#type: PropertyType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<serde_json::Value>,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "enum", default, skip_serializing_if = "Vec::is_empty")]
    pub r#enum: Vec<serde_json::Value>,
}

/// A property's JSON type: one name, or a union of names.
///
/// Serialized as a bare string when it holds exactly one name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyType(pub Vec<String>);

impl Serialize for PropertyType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0.as_slice() {
            [single] => serializer.serialize_str(single),
            many => many.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for PropertyType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            One(String),
            Many(Vec<String>),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::One(s) => PropertyType(vec![s]),
            Raw::Many(v) => PropertyType(v),
        })
    }
}

impl ToolDefinition {
    /// Convert a common tool into Ollama's declaration shape.
    pub fn from_tool(tool: &Tool) -> Result<Self, InferenceError> {
        let parameters: FunctionParameters =
            convert_via_json(&tool.function.parameters).map_err(|e| {
                InferenceError::ToolConversion {
                    tool: tool.function.name.clone(),
                    reason: e.to_string(),
                }
            })?;

        Ok(Self {
            r#type: "function".to_string(),
            function: FunctionDefinition {
                name: tool.function.name.clone(),
                description: tool.function.description.clone(),
                parameters,
            },
        })
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
