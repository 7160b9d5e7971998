//! JSON-RPC over stdio transport.
//!
//! Handles low-level communication with MCP server child processes:
//! - Writing JSON-RPC requests to stdin
//! - Reading JSON-RPC responses from stdout
//! - Line-delimited JSON protocol (one JSON object per line)
//! - Answering server-initiated requests that arrive while a response is pending

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::errors::McpError;
use super::types::{error_codes, IncomingMessage, JsonRpcRequest, JsonRpcResponse};

// ─── Request ID Generator ────────────────────────────────────────────────────

/// Global monotonic request ID counter.
static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Generate a unique request ID.
pub fn next_request_id() -> u64 {
    NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

// ─── Transport ───────────────────────────────────────────────────────────────

/// Write half of a transport (a child's stdin in production).
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Read half of a transport (a child's buffered stdout in production).
pub type BoxedReader = Box<dyn AsyncBufRead + Send + Unpin>;

/// Bi-directional JSON-RPC transport over a line-oriented byte stream.
pub struct StdioTransport {
    server_name: String,
    /// `None` once the transport has been closed.
    writer: Mutex<Option<BoxedWriter>>,
    reader: Mutex<BoxedReader>,
    /// Set when the peer hung up or a write did not complete. A broken
    /// transport refuses further writes.
    broken: AtomicBool,
}

impl StdioTransport {
    /// Create a new transport from a writer/reader pair.
    pub fn new(server_name: &str, writer: BoxedWriter, reader: BoxedReader) -> Self {
        Self {
            server_name: server_name.to_string(),
            writer: Mutex::new(Some(writer)),
            reader: Mutex::new(reader),
            broken: AtomicBool::new(false),
        }
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// True once stdout hit EOF or a write failed or was interrupted.
    pub fn is_broken(&self) -> bool {
        self.broken.load(Ordering::SeqCst)
    }

    /// Send a JSON-RPC request and wait for the matching response.
    ///
    /// The reader lock is held for the whole exchange, so concurrent callers
    /// on the same transport are served one at a time. Lines that are not
    /// the awaited response (log output, notifications, stale responses of
    /// cancelled requests) are skipped.
    ///
    /// Cancelling while the request line is only partly written leaves the
    /// peer's input unframed, so the transport is marked broken.
    pub async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
        cancel: &CancellationToken,
    ) -> Result<JsonRpcResponse, McpError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(McpError::Cancelled),
            result = self.exchange(method, params) => result,
        }
    }

    async fn exchange(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, McpError> {
        let id = next_request_id();
        let req = JsonRpcRequest::new(id, method, params);

        let json = serde_json::to_string(&req).map_err(|e| self.transport_error(format!(
            "failed to serialize request: {e}"
        )))?;

        let mut reader = self.reader.lock().await;
        self.write_line(json).await?;

        // Read response lines until we find one with matching id
        let mut line_buf = String::new();
        loop {
            line_buf.clear();
            let bytes_read = reader.read_line(&mut line_buf).await.map_err(|e| {
                self.broken.store(true, Ordering::SeqCst);
                self.transport_error(format!("failed to read from stdout: {e}"))
            })?;

            if bytes_read == 0 {
                self.broken.store(true, Ordering::SeqCst);
                return Err(self.transport_error(
                    "server stdout closed (process may have exited)".into(),
                ));
            }

            let trimmed = line_buf.trim();
            if trimmed.is_empty() {
                continue;
            }

            let incoming = match serde_json::from_str::<IncomingMessage>(trimmed) {
                Ok(msg) => msg,
                Err(_) => {
                    tracing::debug!(server = %self.server_name, line = %trimmed, "skipping non-JSON server output");
                    continue;
                }
            };

            if let Some(ref server_method) = incoming.method {
                if let Some(request_id) = incoming.id {
                    self.answer_server_request(server_method, request_id).await?;
                }
                continue;
            }

            match serde_json::from_str::<JsonRpcResponse>(trimmed) {
                Ok(resp) if resp.id == id => return Ok(resp),
                Ok(resp) => {
                    tracing::debug!(
                        server = %self.server_name,
                        expected = id,
                        got = resp.id,
                        "skipping response for another request"
                    );
                }
                Err(_) => continue,
            }
        }
    }

    /// Reply to a request the server sent us. Only `ping` is supported.
    async fn answer_server_request(
        &self,
        method: &str,
        request_id: serde_json::Value,
    ) -> Result<(), McpError> {
        let reply = if method == "ping" {
            serde_json::json!({"jsonrpc": "2.0", "id": request_id, "result": {}})
        } else {
            tracing::debug!(server = %self.server_name, method, "rejecting server-initiated request");
            serde_json::json!({
                "jsonrpc": "2.0",
                "id": request_id,
                "error": {
                    "code": error_codes::METHOD_NOT_FOUND,
                    "message": format!("method not supported by client: {method}"),
                },
            })
        };
        self.write_line(reply.to_string()).await
    }

    /// Send a JSON-RPC notification (no response expected).
    pub async fn notify(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), McpError> {
        let mut notification = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
        });
        if let Some(params) = params {
            notification["params"] = params;
        }
        self.write_line(notification.to_string()).await
    }

    /// Close the write half. The server sees EOF on stdin, which is the
    /// stdio transport's shutdown signal.
    pub async fn close(&self) {
        let mut writer = self.writer.lock().await;
        if let Some(mut w) = writer.take() {
            let _ = w.shutdown().await;
        }
    }

    async fn write_line(&self, mut json: String) -> Result<(), McpError> {
        json.push('\n');

        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| self.transport_error("transport is closed".into()))?;
        if self.is_broken() {
            return Err(self.transport_error("transport is broken".into()));
        }

        // Disarmed only after a complete, flushed line. Errors and
        // cancellation in between leave the transport broken.
        let poison = PoisonOnDrop::arm(&self.broken);
        writer
            .write_all(json.as_bytes())
            .await
            .map_err(|e| self.transport_error(format!("failed to write to stdin: {e}")))?;
        writer
            .flush()
            .await
            .map_err(|e| self.transport_error(format!("failed to flush stdin: {e}")))?;
        poison.disarm();
        Ok(())
    }

    fn transport_error(&self, reason: String) -> McpError {
        McpError::TransportError {
            server: self.server_name.clone(),
            reason,
        }
    }
}

/// Marks a transport broken unless disarmed before it drops.
struct PoisonOnDrop<'a> {
    flag: &'a AtomicBool,
    armed: bool,
}

impl<'a> PoisonOnDrop<'a> {
    fn arm(flag: &'a AtomicBool) -> Self {
        Self { flag, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PoisonOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.flag.store(true, Ordering::SeqCst);
        }
    }
}

// ─── Response Helpers ────────────────────────────────────────────────────────

/// Extract the result from a JSON-RPC response, converting errors to `McpError`.
pub fn extract_result(response: JsonRpcResponse) -> Result<serde_json::Value, McpError> {
    if let Some(err) = response.error {
        return Err(McpError::ServerError {
            code: err.code,
            message: err.message,
            data: err.data,
        });
    }

    response.result.ok_or(McpError::ServerError {
        code: error_codes::INTERNAL_ERROR,
        message: "response missing both result and error".into(),
        data: None,
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────
