//! Common tool types shared by the MCP client and the inference client.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use tokio_util::sync::CancellationToken;

use super::errors::ToolError;

/// Runs one tool. Each provider kind supplies its own implementation.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(
        &self,
        arguments: serde_json::Map<String, serde_json::Value>,
        cancel: &CancellationToken,
    ) -> Result<ToolOutput, ToolError>;
}

/// A tool's output after the provider's content fragments were collapsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub text: String,
    /// Set when the provider reported a logical tool error.
    pub is_error: bool,
}

/// A tool as exposed to the model.
#[derive(Clone, Serialize, Deserialize)]
pub struct Tool {
    /// Globally unique display name.
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub function: ToolFunction,
    #[serde(skip)]
    pub executor: Option<Arc<dyn ToolExecutor>>,
}

impl Tool {
    /// Run the tool through its bound executor.
    pub async fn execute(
        &self,
        arguments: serde_json::Map<String, serde_json::Value>,
        cancel: &CancellationToken,
    ) -> Result<ToolOutput, ToolError> {
        let executor = self.executor.as_ref().ok_or_else(|| ToolError::MissingExecutor {
            name: self.name.clone(),
        })?;
        executor.execute(arguments, cancel).await
    }
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("title", &self.title)
            .field("function", &self.function)
            .field("has_executor", &self.executor.is_some())
            .finish()
    }
}

/// The function definition of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolFunction {
    pub name: String,
    pub description: String,
    pub parameters: ParameterSchema,
}

/// Schema for function parameters.
///
/// Providers are loose about optional fields: `null` reads as the field's
/// default, and a missing or `null` top-level `type` reads as `"object"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Usually `"object"`.
    #[serde(rename = "type", default = "object_type", deserialize_with = "null_as_object_type")]
    pub r#type: String,
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    #[serde(
        default,
        deserialize_with = "null_properties_as_default",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub properties: BTreeMap<String, PropertyDefinition>,
    #[serde(rename = "$defs", default, skip_serializing_if = "Option::is_none")]
    pub defs: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<serde_json::Value>,
}

impl Default for ParameterSchema {
    fn default() -> Self {
        Self {
            r#type: object_type(),
            required: Vec::new(),
            properties: BTreeMap::new(),
            defs: None,
            items: None,
        }
    }
}

/// A single property in a parameter schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyDefinition {
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub r#type: String,
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<serde_json::Value>,
    #[serde(
        rename = "enum",
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub r#enum: Vec<serde_json::Value>,
}

fn object_type() -> String {
    "object".to_string()
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn null_as_object_type<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(object_type))
}

/// `"properties": {"x": null}` yields an empty definition for `x`.
fn null_properties_as_default<'de, D>(
    deserializer: D,
) -> Result<BTreeMap<String, PropertyDefinition>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, Option<PropertyDefinition>>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(name, definition)| (name, definition.unwrap_or_default()))
        .collect())
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl ToolExecutor for Echo {
        async fn execute(
            &self,
            arguments: serde_json::Map<String, serde_json::Value>,
            _cancel: &CancellationToken,
        ) -> Result<ToolOutput, ToolError> {
            Ok(ToolOutput {
                text: serde_json::Value::Object(arguments).to_string(),
                is_error: false,
            })
        }
    }

    fn tool(executor: Option<Arc<dyn ToolExecutor>>) -> Tool {
        Tool {
            name: "srv:echo".into(),
            description: "Echo".into(),
            title: None,
            function: ToolFunction {
                name: "srv:echo".into(),
                description: "Echo".into(),
                parameters: ParameterSchema::default(),
            },
            executor,
        }
    }

    #[tokio::test]
    async fn test_execute_without_executor_fails() {
        let err = tool(None)
            .execute(serde_json::Map::new(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::MissingExecutor { ref name } if name == "srv:echo"));
    }

    #[tokio::test]
    async fn test_execute_delegates_to_executor() {
        let mut args = serde_json::Map::new();
        args.insert("a".into(), serde_json::json!(1));
        let out = tool(Some(Arc::new(Echo)))
            .execute(args, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out.text, r#"{"a":1}"#);
    }

    #[test]
    fn test_executor_is_not_serialized() {
        let json = serde_json::to_value(tool(Some(Arc::new(Echo)))).unwrap();
        assert!(json.get("executor").is_none());
        assert!(json.get("title").is_none());
        assert_eq!(json["function"]["parameters"]["type"], "object");
    }

    #[test]
    fn test_schema_nulls_read_as_defaults() {
        let schema: ParameterSchema = serde_json::from_value(serde_json::json!({
            "type": "object",
            "required": null,
            "properties": {
                "path": {"type": "string", "description": null, "enum": null},
                "anything": null
            }
        }))
        .unwrap();
        assert!(schema.required.is_empty());
        assert_eq!(schema.properties["path"].r#type, "string");
        assert_eq!(schema.properties["path"].description, "");
        assert!(schema.properties["path"].r#enum.is_empty());
        assert_eq!(schema.properties["anything"], PropertyDefinition::default());

        let schema: ParameterSchema =
            serde_json::from_value(serde_json::json!({"properties": null})).unwrap();
        assert!(schema.properties.is_empty());
    }

    #[test]
    fn test_schema_without_type_is_an_object() {
        let schema: ParameterSchema = serde_json::from_value(serde_json::json!({
            "properties": {"q": {"type": "string"}}
        }))
        .unwrap();
        assert_eq!(schema.r#type, "object");

        let schema: ParameterSchema =
            serde_json::from_value(serde_json::json!({"type": null})).unwrap();
        assert_eq!(schema.r#type, "object");
        assert_eq!(schema, ParameterSchema::default());
    }
}
