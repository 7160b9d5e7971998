//! Test doubles shared across module tests.
//!
//! - [`ScriptedServer`]: an in-process MCP server speaking line-delimited
//!   JSON-RPC over `tokio::io::duplex` pipes.
//! - [`MockHttpServer`]: a one-request-per-connection HTTP server on a random
//!   local port that replays canned responses and records request bodies.

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::mcp_client::transport::StdioTransport;
#[cfg(unix)]
use crate::config::ServerConfig;
use crate::mcp_client::types::LaunchDescriptor;

// ─── Scripted MCP server ─────────────────────────────────────────────────────

/// Handler result: a JSON-RPC `result`, or an error `(code, message)`.
pub type ScriptReply = Result<Value, (i32, String)>;

/// Handle to a running scripted server.
pub struct ScriptedServer {
    handle: JoinHandle<Vec<(String, Value)>>,
}

impl ScriptedServer {
    /// Start a server that answers every request via `handler(method, params)`.
    ///
    /// Notifications are recorded but not answered. The server stops when the
    /// client closes its write half.
    pub fn spawn<F>(handler: F) -> (StdioTransport, ScriptedServer)
    where
        F: Fn(&str, &Value) -> ScriptReply + Send + 'static,
    {
        let (client_out, server_in) = tokio::io::duplex(64 * 1024);
        let (mut server_out, client_in) = tokio::io::duplex(64 * 1024);

        let handle = tokio::spawn(async move {
            let mut seen = Vec::new();
            let mut lines = BufReader::new(server_in).lines();

            while let Ok(Some(line)) = lines.next_line().await {
                let Ok(msg) = serde_json::from_str::<Value>(&line) else {
                    continue;
                };
                let method = msg["method"].as_str().unwrap_or_default().to_string();
                let params = msg.get("params").cloned().unwrap_or(Value::Null);
                seen.push((method.clone(), params.clone()));

                let Some(id) = msg.get("id").cloned() else {
                    continue;
                };
                let reply = match handler(&method, &params) {
                    Ok(result) => serde_json::json!({"jsonrpc": "2.0", "id": id, "result": result}),
                    Err((code, message)) => serde_json::json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "error": {"code": code, "message": message},
                    }),
                };
                let mut out = reply.to_string();
                out.push('\n');
                if server_out.write_all(out.as_bytes()).await.is_err() {
                    break;
                }
            }
            seen
        });

        let transport = StdioTransport::new(
            "scripted",
            Box::new(client_out),
            Box::new(BufReader::new(client_in)),
        );
        (transport, ScriptedServer { handle })
    }

    /// Wait for the server to stop and return every `(method, params)` it saw.
    pub async fn finish(self) -> Vec<(String, Value)> {
        self.handle.await.unwrap_or_default()
    }

    /// Stop the server abruptly, as if its process died.
    pub fn abort(self) {
        self.handle.abort();
    }
}

// ─── Shell MCP server ────────────────────────────────────────────────────────

/// POSIX sh MCP server exposing one tool named by its first argument;
/// calling it answers `hello from <tool>`.
#[cfg(unix)]
const ECHO_SERVER_SCRIPT: &str = r#"
while IFS= read -r line; do
  id=$(printf '%s\n' "$line" | sed -n 's/.*"id":\([0-9][0-9]*\).*/\1/p')
  [ -z "$id" ] && continue
  case "$line" in
    *'"method":"initialize"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"protocolVersion":"2025-06-18","capabilities":{"tools":{}},"serverInfo":{"name":"sh"}}}\n' "$id" ;;
    *'"method":"tools/list"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"tools":[{"name":"%s","description":"shell tool","inputSchema":{"type":"object"}}]}}\n' "$id" "$1" ;;
    *'"method":"tools/call"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"content":[{"type":"text","text":"hello from %s"}]}}\n' "$id" "$1" ;;
    *)
      printf '{"jsonrpc":"2.0","id":%s,"error":{"code":-32601,"message":"unknown method"}}\n' "$id" ;;
  esac
done
"#;

/// A real child-process MCP server written in POSIX sh.
///
/// Exposes a single tool named `tool_name`; calling it answers
/// `hello from <tool_name>`.
#[cfg(unix)]
pub fn shell_mcp_server(name: &str, tool_name: &str) -> LaunchDescriptor {
    LaunchDescriptor::new(name, "sh", &["-c", ECHO_SERVER_SCRIPT, name, tool_name])
}

/// The same server as [`shell_mcp_server`], as a configuration entry.
///
/// The script is written to `dir` so that no `$` in it goes through
/// environment expansion.
#[cfg(unix)]
pub fn shell_server_config(dir: &std::path::Path, name: &str, tool_name: &str) -> ServerConfig {
    let path = dir.join(format!("{name}.sh"));
    std::fs::write(&path, ECHO_SERVER_SCRIPT).unwrap();
    let script = path.to_string_lossy().into_owned();
    ServerConfig::new(name, "sh", &[script.as_str(), tool_name])
}

/// A sh MCP server that answers `initialize` and then exits.
#[cfg(unix)]
pub fn shell_mcp_server_exiting_after_handshake(name: &str) -> LaunchDescriptor {
    const SCRIPT: &str = r#"
IFS= read -r line
id=$(printf '%s\n' "$line" | sed -n 's/.*"id":\([0-9][0-9]*\).*/\1/p')
printf '{"jsonrpc":"2.0","id":%s,"result":{"protocolVersion":"2025-06-18","capabilities":{"tools":{}}}}\n' "$id"
IFS= read -r line
exit 0
"#;
    LaunchDescriptor::new(name, "sh", &["-c", SCRIPT, name])
}

// ─── Mock HTTP server ────────────────────────────────────────────────────────

/// A canned HTTP server that serves `responses` in order, one per connection.
pub struct MockHttpServer {
    pub base_url: String,
    handle: JoinHandle<Vec<String>>,
}

impl MockHttpServer {
    /// Bind to a random port and serve `(status, body)` pairs in order.
    pub async fn start(responses: Vec<(u16, String)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let mut bodies = Vec::new();
            for (status, body) in responses {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                bodies.push(read_request_body(&mut socket).await);

                let response = format!(
                    "HTTP/1.1 {status} OK\r\nContent-Type: application/x-ndjson\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
            bodies
        });

        Self {
            base_url: format!("http://{addr}"),
            handle,
        }
    }

    /// Wait until every canned response was served; returns the request bodies.
    pub async fn finish(self) -> Vec<String> {
        self.handle.await.unwrap_or_default()
    }
}

/// Read one HTTP request and return its body as text.
async fn read_request_body(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        if let Some(pos) = find_subslice(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return String::new(),
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    };

    let headers = String::from_utf8_lossy(&buf[..header_end]).to_ascii_lowercase();
    let content_length = headers
        .lines()
        .find_map(|l| l.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }

    String::from_utf8_lossy(&buf[header_end..]).into_owned()
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
