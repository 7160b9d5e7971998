//! Server process lifecycle management.
//!
//! Spawns MCP server child processes and performs the initialization
//! handshake. Each server runs as a separate OS process communicating via
//! JSON-RPC over stdio.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{ChildStderr, Command};
use tokio_util::sync::CancellationToken;

use super::errors::McpError;
use super::session::StdioSession;
use super::transport::StdioTransport;
use super::types::{Implementation, LaunchDescriptor};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Timeout for the initialize handshake.
///
/// `npx`-launched servers may download their package on first start.
const INIT_TIMEOUT: Duration = Duration::from_secs(60);

/// Maximum stderr captured for a failed start.
const STDERR_CAPTURE_LIMIT: usize = 2000;

// ─── Spawning ────────────────────────────────────────────────────────────────

/// Spawn a single MCP server process and perform the initialization handshake.
///
/// The child is killed when the returned session is dropped, and on any
/// failure before the session exists.
pub async fn spawn_server(
    descriptor: &LaunchDescriptor,
    client_info: &Implementation,
    cancel: &CancellationToken,
) -> Result<StdioSession, McpError> {
    let name = descriptor.name.as_str();

    let mut cmd = Command::new(&descriptor.program);
    cmd.args(&descriptor.args);
    for (key, value) in &descriptor.env {
        cmd.env(key, value);
    }

    // Windows: prevent console window from appearing for child processes
    #[cfg(target_os = "windows")]
    {
        const CREATE_NO_WINDOW: u32 = 0x08000000;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }

    cmd.stdin(std::process::Stdio::piped());
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());
    cmd.kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| McpError::ConnectionFailed {
        name: name.to_string(),
        reason: format!("failed to spawn '{}': {e}", descriptor.program),
    })?;

    let stdin = child.stdin.take().ok_or(McpError::ConnectionFailed {
        name: name.to_string(),
        reason: "failed to capture stdin".into(),
    })?;

    let stdout = child.stdout.take().ok_or(McpError::ConnectionFailed {
        name: name.to_string(),
        reason: "failed to capture stdout".into(),
    })?;

    let stderr_handle = child.stderr.take();

    let transport = StdioTransport::new(name, Box::new(stdin), Box::new(BufReader::new(stdout)));

    let handshake = StdioSession::handshake(transport, client_info, cancel);
    let session = match tokio::time::timeout(INIT_TIMEOUT, handshake).await {
        Ok(Ok(session)) => session,
        Ok(Err(McpError::Cancelled)) => {
            let _ = child.kill().await;
            return Err(McpError::Cancelled);
        }
        Ok(Err(e)) => {
            let _ = child.kill().await;
            let stderr_ctx = read_stderr_on_failure(stderr_handle).await;
            if !stderr_ctx.is_empty() {
                tracing::warn!(server = name, stderr = %stderr_ctx, "server stderr captured on failure");
            }
            return Err(McpError::ConnectionFailed {
                name: name.to_string(),
                reason: format!("{e}{}", format_stderr_suffix(&stderr_ctx)),
            });
        }
        Err(_) => {
            let _ = child.kill().await;
            let stderr_ctx = read_stderr_on_failure(stderr_handle).await;
            return Err(McpError::ConnectionFailed {
                name: name.to_string(),
                reason: format!(
                    "initialization timed out after {}s{}",
                    INIT_TIMEOUT.as_secs(),
                    format_stderr_suffix(&stderr_ctx)
                ),
            });
        }
    };

    if let Some(stderr) = stderr_handle {
        forward_stderr(name.to_string(), stderr);
    }

    tracing::info!(
        server = name,
        program = %descriptor.program,
        pid = child.id().unwrap_or_default(),
        "MCP server started"
    );

    Ok(session.with_process(child))
}

/// Relay a running server's stderr into the log so the pipe never fills up.
///
/// The task ends on its own when the process closes stderr.
fn forward_stderr(server: String, stderr: ChildStderr) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::debug!(server = %server, "{line}");
        }
    });
}

/// Read any available stderr output from a failed server process.
///
/// Uses a short timeout to avoid blocking if stderr is empty or the process
/// is still writing.
async fn read_stderr_on_failure(stderr_handle: Option<ChildStderr>) -> String {
    let Some(mut stderr) = stderr_handle else {
        return String::new();
    };

    let mut buf = String::new();
    match tokio::time::timeout(Duration::from_millis(500), stderr.read_to_string(&mut buf)).await
    {
        Ok(Ok(_)) => {
            if buf.len() > STDERR_CAPTURE_LIMIT {
                let mut cut = STDERR_CAPTURE_LIMIT;
                while !buf.is_char_boundary(cut) {
                    cut -= 1;
                }
                buf.truncate(cut);
                buf.push_str("...(truncated)");
            }
            buf
        }
        _ => String::new(),
    }
}

/// Format a stderr suffix for error messages (empty string if no stderr).
fn format_stderr_suffix(stderr: &str) -> String {
    if stderr.trim().is_empty() {
        String::new()
    } else {
        format!(" | stderr: {}", stderr.trim())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
