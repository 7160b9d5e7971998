//! YAML configuration: which MCP servers to launch and where Ollama lives.

pub mod env;
pub mod errors;
pub mod loader;
pub mod types;

pub use errors::ConfigError;
pub use loader::{
    default_config_paths, fallback_config, load_config_from_file, load_config_with_ollama,
    load_or_fallback, ConfigSource, LoadedConfig,
};
pub use types::{ConfigFile, OllamaConfig, ServerConfig};
