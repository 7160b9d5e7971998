//! Config file discovery and loading.
//!
//! An explicit path must load. Without one, the default locations are tried
//! in order, and if none exists a built-in single-server setup is used.

use std::path::{Path, PathBuf};

use super::errors::ConfigError;
use super::env::interpolate_env_vars;
use super::types::{ConfigFile, OllamaConfig, ServerConfig, DEFAULT_OLLAMA_MODEL, DEFAULT_OLLAMA_URL};

/// Model used with the built-in fallback server.
pub const FALLBACK_OLLAMA_MODEL: &str = "qwen3:14b";

/// Where a loaded configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    Fallback,
}

/// A configuration together with its origin.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: ConfigFile,
    pub source: ConfigSource,
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Load and validate the server list from a YAML file.
pub fn load_config_from_file(path: &Path) -> Result<Vec<ServerConfig>, ConfigError> {
    Ok(read_config_file(path)?.servers)
}

/// Load servers and the Ollama section, filling Ollama defaults.
///
/// `url` and `model` are interpolated like server values; empty results fall
/// back to the defaults.
pub fn load_config_with_ollama(path: &Path) -> Result<ConfigFile, ConfigError> {
    let mut file = read_config_file(path)?;
    file.ollama = OllamaConfig {
        url: non_empty_or(interpolate_env_vars(&file.ollama.url), DEFAULT_OLLAMA_URL),
        model: non_empty_or(interpolate_env_vars(&file.ollama.model), DEFAULT_OLLAMA_MODEL),
    };
    Ok(file)
}

/// Load `explicit` if given; otherwise the first default path, or the
/// built-in fallback when no file exists.
pub fn load_or_fallback(explicit: Option<&Path>) -> Result<LoadedConfig, ConfigError> {
    match explicit {
        Some(path) => Ok(LoadedConfig {
            config: load_config_with_ollama(path)?,
            source: ConfigSource::File(path.to_path_buf()),
        }),
        None => load_from_candidates(&default_config_paths()),
    }
}

/// Load the first existing candidate, or the built-in fallback.
pub fn load_from_candidates(candidates: &[PathBuf]) -> Result<LoadedConfig, ConfigError> {
    match first_existing(candidates) {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading MCP configuration");
            Ok(LoadedConfig {
                config: load_config_with_ollama(&path)?,
                source: ConfigSource::File(path),
            })
        }
        None => {
            tracing::info!("no MCP configuration file found, using built-in memory server");
            Ok(LoadedConfig {
                config: fallback_config(),
                source: ConfigSource::Fallback,
            })
        }
    }
}

/// The built-in setup: the reference memory server and `qwen3:14b`.
pub fn fallback_config() -> ConfigFile {
    ConfigFile {
        servers: vec![ServerConfig::new(
            "memory-server",
            "npx",
            &["-y", "@modelcontextprotocol/server-memory"],
        )],
        ollama: OllamaConfig {
            url: DEFAULT_OLLAMA_URL.to_string(),
            model: FALLBACK_OLLAMA_MODEL.to_string(),
        },
    }
}

/// Default search locations, in priority order.
///
/// Working-directory paths come first, then the user's home directory.
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = ["mcp.yaml", "mcp.yml", "config/mcp.yaml", "config/mcp.yml"]
        .iter()
        .map(PathBuf::from)
        .collect();

    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".mcp.yaml"));
        paths.push(home.join(".mcp.yml"));
        paths.push(home.join(".config").join("mcp.yaml"));
        paths.push(home.join(".config").join("mcp.yml"));
    }

    paths
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn read_config_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let file: ConfigFile = serde_yaml::from_str(&raw).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    validate_servers(&file.servers)?;
    Ok(file)
}

/// Every server needs a name and a command.
fn validate_servers(servers: &[ServerConfig]) -> Result<(), ConfigError> {
    for (index, server) in servers.iter().enumerate() {
        if server.name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                reason: format!("server at index {index} has empty name"),
            });
        }
        if server.command.trim().is_empty() {
            return Err(ConfigError::Invalid {
                reason: format!("server {} has empty command", server.name),
            });
        }
    }
    Ok(())
}

fn first_existing(candidates: &[PathBuf]) -> Option<PathBuf> {
    candidates.iter().find(|p| p.is_file()).cloned()
}

fn non_empty_or(value: String, default: &str) -> String {
    if value.trim().is_empty() {
        default.to_string()
    } else {
        value
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &tempfile::TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    const SAMPLE: &str = r#"
servers:
  - name: filesystem
    command: npx
    args: ["-y", "@modelcontextprotocol/server-filesystem", "/tmp"]
  - name: github
    command: github-mcp
    environment:
      GITHUB_TOKEN: "${GITHUB_TOKEN}"
ollama:
  url: http://gpu-box:11434
  model: qwen3:14b
"#;

    #[test]
    fn test_load_config_with_ollama() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "mcp.yaml", SAMPLE);

        let file = load_config_with_ollama(&path).unwrap();
        assert_eq!(file.servers.len(), 2);
        assert_eq!(file.servers[0].args[2], "/tmp");
        assert_eq!(file.servers[1].environment["GITHUB_TOKEN"], "${GITHUB_TOKEN}");
        assert_eq!(file.ollama.url, "http://gpu-box:11434");
        assert_eq!(file.ollama.model, "qwen3:14b");
    }

    #[test]
    fn test_load_config_from_file_servers_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "mcp.yaml", SAMPLE);
        let servers = load_config_from_file(&path).unwrap();
        assert_eq!(servers[1].name, "github");
    }

    #[test]
    fn test_missing_ollama_section_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "mcp.yaml", "servers:\n  - name: a\n    command: a-server\n");
        let file = load_config_with_ollama(&path).unwrap();
        assert_eq!(file.ollama.url, DEFAULT_OLLAMA_URL);
        assert_eq!(file.ollama.model, DEFAULT_OLLAMA_MODEL);
    }

    #[test]
    fn test_empty_ollama_values_use_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "mcp.yaml", "servers: []\nollama:\n  url: \"\"\n  model: \"\"\n");
        let file = load_config_with_ollama(&path).unwrap();
        assert_eq!(file.ollama, OllamaConfig::default());
    }

    #[test]
    fn test_empty_name_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "mcp.yaml", "servers:\n  - name: \"\"\n    command: x\n");
        let err = load_config_from_file(&path).unwrap_err();
        assert!(err.to_string().contains("index 0 has empty name"), "{err}");
    }

    #[test]
    fn test_empty_command_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "mcp.yaml", "servers:\n  - name: broken\n    command: \"\"\n");
        let err = load_config_from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn test_malformed_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "mcp.yaml", "servers: [unclosed\n");
        assert!(matches!(
            load_config_with_ollama(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_or_fallback(Some(&dir.path().join("nope.yaml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_candidates_first_existing_wins() {
        let dir = tempfile::tempdir().unwrap();
        let second = write(&dir, "second.yaml", "servers:\n  - name: two\n    command: t\n");
        let third = write(&dir, "third.yaml", "servers:\n  - name: three\n    command: t\n");
        let candidates = vec![dir.path().join("first.yaml"), second.clone(), third];

        let loaded = load_from_candidates(&candidates).unwrap();
        assert_eq!(loaded.source, ConfigSource::File(second));
        assert_eq!(loaded.config.servers[0].name, "two");
    }

    #[test]
    fn test_candidates_none_exist_uses_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_from_candidates(&[dir.path().join("mcp.yaml")]).unwrap();
        assert_eq!(loaded.source, ConfigSource::Fallback);
        assert_eq!(loaded.config.servers[0].name, "memory-server");
        assert_eq!(
            loaded.config.servers[0].args,
            vec!["-y", "@modelcontextprotocol/server-memory"]
        );
        assert_eq!(loaded.config.ollama.model, FALLBACK_OLLAMA_MODEL);
    }

    #[test]
    fn test_default_paths_order() {
        let paths = default_config_paths();
        assert_eq!(paths[0], PathBuf::from("mcp.yaml"));
        assert_eq!(paths[3], PathBuf::from("config/mcp.yml"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(paths[4], home.join(".mcp.yaml"));
            assert_eq!(paths.len(), 8);
        }
    }
}
