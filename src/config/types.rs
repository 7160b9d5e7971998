//! Configuration file shape.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::env::interpolate_env_vars;
use crate::mcp_client::types::LaunchDescriptor;

/// Default Ollama endpoint when the file omits one.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Default model when the file omits one.
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.2";

/// One MCP server to launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub name: String,
    pub command: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Variables set for the child on top of the inherited environment.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
}

impl ServerConfig {
    pub fn new(name: &str, command: &str, args: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            command: command.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            environment: BTreeMap::new(),
        }
    }

    /// Build the launch descriptor, expanding environment references in the
    /// command, every argument, and every environment value.
    pub fn launch_descriptor(&self) -> LaunchDescriptor {
        LaunchDescriptor {
            name: self.name.clone(),
            program: interpolate_env_vars(&self.command),
            args: self.args.iter().map(|a| interpolate_env_vars(a)).collect(),
            env: self
                .environment
                .iter()
                .map(|(k, v)| (k.clone(), interpolate_env_vars(v)))
                .collect(),
        }
    }
}

/// Where the inference server lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OllamaConfig {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_model")]
    pub model: String,
}

fn default_url() -> String {
    DEFAULT_OLLAMA_URL.to_string()
}

fn default_model() -> String {
    DEFAULT_OLLAMA_MODEL.to_string()
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            model: default_model(),
        }
    }
}

/// Top-level YAML document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
    #[serde(default)]
    pub ollama: OllamaConfig,
}
