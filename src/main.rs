//! ttobot command-line entry point.
//!
//! ```bash
//! ttobot "What is in /tmp?"
//! ttobot --config ./mcp.yaml --model qwen3:14b "Summarise my notes"
//! ```

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;

use ttobot::agent::{Agent, DEFAULT_MAX_ROUNDS};
use ttobot::config::{self, ConfigSource};
use ttobot::inference::{OllamaClient, OllamaOptions};
use ttobot::mcp_client::McpClient;

/// Ask a local Ollama model a question, letting it call MCP tools.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML config file (default: search mcp.yaml, config/mcp.yaml, ~/.mcp.yaml, ...)
    #[arg(long, env = "TTOBOT_CONFIG")]
    config: Option<PathBuf>,

    /// Ollama base URL (overrides the config file)
    #[arg(long, env = "OLLAMA_URL")]
    url: Option<String>,

    /// Model name (overrides the config file)
    #[arg(long, env = "OLLAMA_MODEL")]
    model: Option<String>,

    /// Maximum model round trips
    #[arg(long, default_value_t = DEFAULT_MAX_ROUNDS)]
    max_rounds: usize,

    /// Emit logs as JSON lines
    #[arg(long, default_value_t = false)]
    log_json: bool,

    /// The question to ask
    #[arg(required = true)]
    question: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    ttobot::init_tracing(args.log_json);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted, cancelling");
                cancel.cancel();
            }
        });
    }

    let mcp = McpClient::new(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    let result = run(&args, &mcp, &cancel).await;
    mcp.close_all().await;
    result
}

async fn run(args: &Args, mcp: &McpClient, cancel: &CancellationToken) -> Result<()> {
    let loaded = config::load_or_fallback(args.config.as_deref())
        .context("failed to load configuration")?;
    match &loaded.source {
        ConfigSource::File(path) => tracing::info!(path = %path.display(), "configuration loaded"),
        ConfigSource::Fallback => tracing::info!("using built-in configuration"),
    }
    let settings = loaded.config;

    let failures = mcp.connect_each(&settings.servers, cancel).await;
    for (name, error) in &failures {
        eprintln!("warning: server {name} unavailable: {error}");
    }
    if mcp.connection_count().await == 0 {
        bail!("failed to connect to any MCP server");
    }

    let tools = mcp.tools(cancel).await.context("failed to get tools")?;
    tracing::info!(count = tools.len(), "tools available");

    let mut ollama = OllamaClient::new(OllamaOptions {
        url: args.url.clone().unwrap_or(settings.ollama.url),
        model: args.model.clone().unwrap_or(settings.ollama.model),
    })
    .context("failed to create Ollama client")?;
    ollama.set_tools(tools);

    let question = args.question.join(" ");
    println!("Question: {question}");

    let agent = Agent::new(ollama).with_max_rounds(args.max_rounds);
    let outcome = agent.run(&question, cancel).await.context("chat request failed")?;

    for (i, call) in outcome.transcript.iter().enumerate() {
        println!("Tool {}: {}", i + 1, call.name);
        if !call.arguments.is_empty() {
            println!("  Arguments: {}", serde_json::Value::Object(call.arguments.clone()));
        }
        println!("  Result: {}", call.result);
    }

    if !outcome.answer.is_empty() {
        println!("Response: {}", outcome.answer);
    }
    if outcome.exhausted {
        eprintln!(
            "warning: stopped after {} rounds with tool calls still pending",
            outcome.rounds
        );
    }

    Ok(())
}
