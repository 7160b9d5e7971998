//! ttobot: a tool-calling bridge between a local Ollama model and a set of
//! MCP tool servers.
//!
//! - `mcp_client`: spawns MCP servers, aggregates their tools, routes calls
//! - `tool`: the provider-independent tool abstraction
//! - `inference`: Ollama `/api/chat` client
//! - `agent`: the question/tool-call/answer loop
//! - `config`: YAML configuration and default-path discovery

pub mod agent;
pub mod config;
pub mod inference;
pub mod mcp_client;
pub mod tool;

#[cfg(test)]
pub(crate) mod testing;

/// Default log filter when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "ttobot=info,warn";

/// Initialize the tracing subscriber.
///
/// Logs go to stderr so stdout carries only the answer. `RUST_LOG`
/// overrides the default filter; `json` switches to one JSON object per line.
pub fn init_tracing(json: bool) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let builder = fmt::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }

    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        pid = std::process::id(),
        "ttobot starting"
    );
}
