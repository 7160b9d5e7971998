//! MCP sessions: one live connection to one tool provider.
//!
//! The registry only needs three things from a connection: enumerate tools,
//! call a tool, and shut down. [`McpSession`] is that seam; [`StdioSession`]
//! is the implementation backed by a spawned child process.

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Child;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::errors::McpError;
use super::transport::{extract_result, StdioTransport};
use super::types::{
    CallToolResult, Implementation, InitializeResult, ListToolsResult, PROTOCOL_VERSION,
};

/// Timeout for graceful shutdown before force-killing.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// A live connection to an MCP tool provider.
#[async_trait]
pub trait McpSession: Send + Sync {
    /// Identifier furnished by the provider. Empty when the transport has
    /// no notion of a session id (stdio never does).
    fn session_id(&self) -> &str;

    /// Fetch one page of the provider's tool list.
    async fn list_tools(
        &self,
        cursor: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ListToolsResult, McpError>;

    /// Invoke a tool by its native (unprefixed) name.
    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Map<String, serde_json::Value>,
        cancel: &CancellationToken,
    ) -> Result<CallToolResult, McpError>;

    /// Shut the connection down. Further calls fail.
    async fn close(&self);

    /// False once the provider is known to be gone. The registry drops
    /// sessions that report false.
    async fn is_alive(&self) -> bool {
        true
    }
}

// ─── StdioSession ────────────────────────────────────────────────────────────

/// An MCP session over a child process's stdin/stdout.
pub struct StdioSession {
    transport: StdioTransport,
    /// The server process, when this session owns one.
    process: Mutex<Option<Child>>,
}

impl StdioSession {
    /// Perform the MCP initialization handshake over `transport`.
    ///
    /// Sends `initialize`, validates the response, then sends
    /// `notifications/initialized`.
    pub async fn handshake(
        transport: StdioTransport,
        client_info: &Implementation,
        cancel: &CancellationToken,
    ) -> Result<Self, McpError> {
        let params = serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": client_info,
        });

        let response = transport.request("initialize", Some(params), cancel).await?;
        let result = extract_result(response)?;

        let server_info: InitializeResult =
            serde_json::from_value(result).map_err(|e| McpError::ConnectionFailed {
                name: transport.server_name().to_string(),
                reason: format!("failed to parse initialize response: {e}"),
            })?;

        transport.notify("notifications/initialized", None).await?;

        tracing::debug!(
            server = transport.server_name(),
            protocol = server_info.protocol_version.as_deref().unwrap_or("unknown"),
            remote = server_info
                .server_info
                .as_ref()
                .and_then(|i| i.name.as_deref())
                .unwrap_or("unknown"),
            "MCP handshake complete"
        );

        Ok(Self {
            transport,
            process: Mutex::new(None),
        })
    }

    /// Attach the child process so that `close` reaps it.
    pub fn with_process(mut self, child: Child) -> Self {
        self.process = Mutex::new(Some(child));
        self
    }

}

#[async_trait]
impl McpSession for StdioSession {
    fn session_id(&self) -> &str {
        ""
    }

    async fn list_tools(
        &self,
        cursor: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ListToolsResult, McpError> {
        let params = cursor.map(|c| serde_json::json!({ "cursor": c }));
        let response = self.transport.request("tools/list", params, cancel).await?;
        let result = extract_result(response)?;

        serde_json::from_value(result).map_err(|e| McpError::TransportError {
            server: self.transport.server_name().to_string(),
            reason: format!("malformed tools/list result: {e}"),
        })
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Map<String, serde_json::Value>,
        cancel: &CancellationToken,
    ) -> Result<CallToolResult, McpError> {
        let params = serde_json::json!({
            "name": name,
            "arguments": arguments,
        });
        let response = self.transport.request("tools/call", Some(params), cancel).await?;
        let result = extract_result(response)?;

        serde_json::from_value(result).map_err(|e| McpError::TransportError {
            server: self.transport.server_name().to_string(),
            reason: format!("malformed tools/call result: {e}"),
        })
    }

    /// Alive while the transport is intact and the attached process, if any,
    /// has not exited.
    async fn is_alive(&self) -> bool {
        if self.transport.is_broken() {
            return false;
        }
        match self.process.lock().await.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => true,
        }
    }

    async fn close(&self) {
        // Closing stdin is the stdio shutdown signal.
        self.transport.close().await;

        let Some(mut child) = self.process.lock().await.take() else {
            return;
        };

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(server = self.transport.server_name(), %status, "MCP server exited");
            }
            _ => {
                tracing::warn!(
                    server = self.transport.server_name(),
                    "MCP server did not exit after stdin closed, killing"
                );
                let _ = child.kill().await;
            }
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedServer;

    #[tokio::test]
    async fn test_handshake_sends_initialize_then_initialized() {
        let (transport, server) = ScriptedServer::spawn(|method, _params| match method {
            "initialize" => Ok(serde_json::json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {"tools": {}},
                "serverInfo": {"name": "fs", "version": "0.1.0"}
            })),
            _ => Err((-32601, "unexpected".to_string())),
        });

        let session = StdioSession::handshake(
            transport,
            &Implementation::new("ttobot", "1.0.0"),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(session.session_id(), "");
        assert!(session.is_alive().await);

        session.close().await;
        let seen = server.finish().await;
        assert_eq!(seen[0].0, "initialize");
        assert_eq!(seen[0].1["clientInfo"]["name"], "ttobot");
        assert_eq!(seen[1].0, "notifications/initialized");
    }

    #[tokio::test]
    async fn test_handshake_error_is_propagated() {
        let (transport, _server) = ScriptedServer::spawn(|_, _| Err((-32603, "boom".to_string())));

        let result = StdioSession::handshake(
            transport,
            &Implementation::new("ttobot", "1.0.0"),
            &CancellationToken::new(),
        )
        .await;
        assert!(matches!(result, Err(McpError::ServerError { code: -32603, .. })));
    }

    #[tokio::test]
    async fn test_list_and_call_over_transport() {
        let (transport, server) = ScriptedServer::spawn(|method, params| match method {
            "initialize" => Ok(serde_json::json!({"capabilities": {}})),
            "tools/list" => Ok(serde_json::json!({
                "tools": [{"name": "echo", "description": "Echo back",
                           "inputSchema": {"type": "object"}}]
            })),
            "tools/call" => Ok(serde_json::json!({
                "content": [{"type": "text", "text": params["arguments"]["msg"].clone()}]
            })),
            _ => Err((-32601, "no such method".to_string())),
        });

        let cancel = CancellationToken::new();
        let session =
            StdioSession::handshake(transport, &Implementation::new("t", "1"), &cancel)
                .await
                .unwrap();

        let page = session.list_tools(None, &cancel).await.unwrap();
        assert_eq!(page.tools[0].name, "echo");

        let mut args = serde_json::Map::new();
        args.insert("msg".into(), serde_json::json!("hi"));
        let result = session.call_tool("echo", args, &cancel).await.unwrap();
        let content = result.content.unwrap();
        assert_eq!(CallToolResult::fragment_text(&content[0]), Some("hi"));

        session.close().await;
        let seen = server.finish().await;
        assert_eq!(seen[3].0, "tools/call");
        assert_eq!(seen[3].1["name"], "echo");
    }

    #[tokio::test]
    async fn test_session_is_dead_after_server_hangs_up() {
        let (transport, server) = ScriptedServer::spawn(|method, _params| match method {
            "initialize" => Ok(serde_json::json!({"capabilities": {}})),
            _ => Err((-32601, "no such method".to_string())),
        });
        let cancel = CancellationToken::new();
        let session = StdioSession::handshake(transport, &Implementation::new("t", "1"), &cancel)
            .await
            .unwrap();
        assert!(session.is_alive().await);

        server.abort();
        let err = session.list_tools(None, &cancel).await.unwrap_err();
        assert!(matches!(err, McpError::TransportError { .. }));
        assert!(!session.is_alive().await);
    }
}
