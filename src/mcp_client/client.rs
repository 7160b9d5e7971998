//! MCP Client: the multi-server registry.
//!
//! Owns every live session, merges their tools into one namespace
//! (`<server-id>:<tool>`), and routes tool calls back to the owning session.
//! This is the primary API used by the inference client and the CLI.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use super::convert::convert_via_json;
use super::errors::McpError;
use super::lifecycle;
use super::session::McpSession;
use super::types::{CallToolResult, Implementation, LaunchDescriptor, McpToolDefinition};
use crate::config::ServerConfig;
use crate::tool::{ParameterSchema, Tool, ToolError, ToolExecutor, ToolFunction, ToolOutput};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Separator between server id and native tool name in display names.
pub const TOOL_NAME_SEPARATOR: char = ':';

/// Returned when a tool call succeeds without any content.
const EMPTY_RESULT_TEXT: &str = "Tool executed successfully";

// ─── Server IDs ──────────────────────────────────────────────────────────────

/// Resolve the registry id for a session.
///
/// Uses the provider's id when it has one, otherwise
/// `mcp-server-<UTC timestamp>-<8 hex chars>`.
pub fn generate_server_id(original_id: &str) -> String {
    if !original_id.is_empty() {
        return original_id.to_string();
    }

    let timestamp = chrono::Utc::now().format("%Y%m%d-%H%M%S");
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("mcp-server-{timestamp}-{}", &suffix[..8])
}

/// Split a display name into `(server_id, native_name)` on the first separator.
pub fn split_tool_name(display_name: &str) -> Option<(&str, &str)> {
    let (server_id, tool_name) = display_name.split_once(TOOL_NAME_SEPARATOR)?;
    if server_id.is_empty() || tool_name.is_empty() {
        return None;
    }
    Some((server_id, tool_name))
}

// ─── McpClient ───────────────────────────────────────────────────────────────

type SessionMap = HashMap<String, Arc<dyn McpSession>>;

/// Registry of live MCP sessions.
///
/// Cloning is cheap and yields a handle to the same registry. All access to
/// the session map goes through one reader/writer lock: listing and
/// execution read, connecting and closing write.
#[derive(Clone)]
pub struct McpClient {
    client_info: Arc<Implementation>,
    servers: Arc<RwLock<SessionMap>>,
}

impl McpClient {
    /// Create an empty registry that identifies itself as `name`/`version`.
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            client_info: Arc::new(Implementation::new(name, version)),
            servers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    // ─── Connecting ──────────────────────────────────────────────────────

    /// Spawn a server, perform the handshake, and register the session.
    ///
    /// Returns the id the session was registered under.
    pub async fn connect(
        &self,
        descriptor: &LaunchDescriptor,
        cancel: &CancellationToken,
    ) -> Result<String, McpError> {
        let session = lifecycle::spawn_server(descriptor, &self.client_info, cancel).await?;
        self.register_session(Arc::new(session)).await
    }

    /// Register an already-established session.
    ///
    /// If the resolved id is taken, the new session is closed and
    /// `DuplicateConnection` is returned; the existing session is untouched.
    pub async fn register_session(&self, session: Arc<dyn McpSession>) -> Result<String, McpError> {
        let server_id = generate_server_id(session.session_id());

        {
            let mut servers = self.servers.write().await;
            if !servers.contains_key(&server_id) {
                servers.insert(server_id.clone(), session);
                tracing::info!(server_id = %server_id, total = servers.len(), "MCP server registered");
                return Ok(server_id);
            }
        }

        tracing::warn!(server_id = %server_id, "rejecting duplicate MCP server id");
        session.close().await;
        Err(McpError::DuplicateConnection { id: server_id })
    }

    /// Connect to the server described by one configuration entry.
    pub async fn connect_from_config(
        &self,
        config: &ServerConfig,
        cancel: &CancellationToken,
    ) -> Result<String, McpError> {
        self.connect(&config.launch_descriptor(), cancel).await
    }

    /// Connect to every configured server, stopping at the first failure.
    ///
    /// Servers connected before the failure stay registered.
    pub async fn connect_many(
        &self,
        configs: &[ServerConfig],
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, McpError> {
        let mut ids = Vec::with_capacity(configs.len());
        for config in configs {
            let id = self
                .connect_from_config(config, cancel)
                .await
                .map_err(|e| tag_connect_error(&config.name, e))?;
            ids.push(id);
        }
        Ok(ids)
    }

    /// Connect to every configured server, continuing past failures.
    ///
    /// Returns the servers that failed to connect.
    pub async fn connect_each(
        &self,
        configs: &[ServerConfig],
        cancel: &CancellationToken,
    ) -> Vec<(String, McpError)> {
        let mut errors = Vec::new();
        for config in configs {
            if cancel.is_cancelled() {
                errors.push((config.name.clone(), McpError::Cancelled));
                continue;
            }
            if let Err(e) = self.connect_from_config(config, cancel).await {
                tracing::warn!(server = %config.name, error = %e, "MCP server failed to start");
                errors.push((config.name.clone(), e));
            }
        }
        errors
    }

    // ─── Closing ─────────────────────────────────────────────────────────

    /// Remove a session from the registry and shut it down.
    ///
    /// Returns `false` if no session was registered under `server_id`.
    pub async fn close(&self, server_id: &str) -> bool {
        let removed = self.servers.write().await.remove(server_id);
        match removed {
            Some(session) => {
                session.close().await;
                tracing::info!(server_id, "MCP server closed");
                true
            }
            None => false,
        }
    }

    /// Shut down every registered session.
    pub async fn close_all(&self) {
        let drained: Vec<(String, Arc<dyn McpSession>)> =
            self.servers.write().await.drain().collect();
        for (server_id, session) in drained {
            session.close().await;
            tracing::debug!(server_id = %server_id, "MCP server closed");
        }
    }

    // ─── Tool Discovery ──────────────────────────────────────────────────

    /// List every tool of every registered server.
    ///
    /// Sessions whose provider is gone are dropped from the registry first,
    /// and so is any session whose listing fails because it disconnected.
    /// Any other listing failure aborts the whole listing. Ordering across
    /// servers follows map iteration and is not stable.
    pub async fn tools(&self, cancel: &CancellationToken) -> Result<Vec<Tool>, McpError> {
        self.prune_disconnected().await;

        let sessions = self.snapshot().await;

        if sessions.is_empty() {
            return Err(McpError::NoConnections);
        }

        let mut result = Vec::new();
        let mut listed = 0;

        for (server_id, session) in &sessions {
            match self.list_server_tools(server_id, &**session, cancel).await {
                Ok(tools) => {
                    listed += 1;
                    result.extend(tools);
                }
                Err(McpError::Cancelled) => return Err(McpError::Cancelled),
                Err(e) if !session.is_alive().await => {
                    tracing::warn!(server_id = %server_id, error = %e, "MCP server disconnected");
                    self.remove_session(server_id, session).await;
                }
                Err(e) => return Err(e),
            }
        }

        if listed == 0 {
            return Err(McpError::NoConnections);
        }
        if result.is_empty() {
            return Err(McpError::NoTools);
        }

        tracing::debug!(servers = listed, tools = result.len(), "listed MCP tools");
        Ok(result)
    }

    /// Drain one server's paginated tool list.
    async fn list_server_tools(
        &self,
        server_id: &str,
        session: &dyn McpSession,
        cancel: &CancellationToken,
    ) -> Result<Vec<Tool>, McpError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = session
                .list_tools(cursor.as_deref(), cancel)
                .await
                .map_err(|e| match e {
                    McpError::Cancelled => McpError::Cancelled,
                    other => McpError::TransportError {
                        server: server_id.to_string(),
                        reason: format!("failed to list tools: {other}"),
                    },
                })?;

            for definition in page.tools {
                tools.push(self.build_tool(server_id, definition)?);
            }

            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => return Ok(tools),
            }
        }
    }

    /// Build the common tool for one provider definition.
    fn build_tool(&self, server_id: &str, definition: McpToolDefinition) -> Result<Tool, McpError> {
        let display_name = format!("{server_id}{TOOL_NAME_SEPARATOR}{}", definition.name);

        let parameters = match definition.input_schema {
            Some(ref schema) => {
                convert_via_json::<_, ParameterSchema>(schema).map_err(|e| {
                    McpError::SchemaConversion {
                        tool: definition.name.clone(),
                        reason: e.to_string(),
                    }
                })?
            }
            None => ParameterSchema::default(),
        };

        Ok(Tool {
            name: display_name.clone(),
            description: definition.description.clone(),
            title: definition.title,
            function: ToolFunction {
                name: display_name,
                description: definition.description,
                parameters,
            },
            executor: Some(Arc::new(McpToolExecutor {
                client: self.clone(),
                server_id: server_id.to_string(),
                tool_name: definition.name,
            })),
        })
    }

    // ─── Tool Execution ──────────────────────────────────────────────────

    /// Execute a tool by display name.
    pub async fn execute(
        &self,
        display_name: &str,
        arguments: serde_json::Map<String, serde_json::Value>,
        cancel: &CancellationToken,
    ) -> Result<ToolOutput, McpError> {
        let (server_id, tool_name) =
            split_tool_name(display_name).ok_or_else(|| McpError::UnknownTool {
                name: display_name.to_string(),
            })?;
        self.call_on_server(server_id, tool_name, arguments, cancel)
            .await
    }

    /// Call `tool_name` on the session registered as `server_id`.
    ///
    /// The read lock is held only for the lookup, so a slow tool never
    /// blocks connects or closes.
    async fn call_on_server(
        &self,
        server_id: &str,
        tool_name: &str,
        arguments: serde_json::Map<String, serde_json::Value>,
        cancel: &CancellationToken,
    ) -> Result<ToolOutput, McpError> {
        let unknown = || McpError::UnknownTool {
            name: format!("{server_id}{TOOL_NAME_SEPARATOR}{tool_name}"),
        };

        let session = self
            .servers
            .read()
            .await
            .get(server_id)
            .cloned()
            .ok_or_else(unknown)?;

        if !session.is_alive().await {
            tracing::warn!(server_id, "MCP server disconnected");
            self.remove_session(server_id, &session).await;
            return Err(unknown());
        }

        tracing::debug!(server_id, tool = tool_name, "calling MCP tool");

        let result = match session.call_tool(tool_name, arguments, cancel).await {
            Ok(result) => result,
            Err(McpError::Cancelled) => return Err(McpError::Cancelled),
            Err(e) => {
                if !session.is_alive().await {
                    tracing::warn!(server_id, error = %e, "MCP server disconnected during call");
                    self.remove_session(server_id, &session).await;
                }
                return Err(McpError::ExecutionFailed {
                    tool: tool_name.to_string(),
                    reason: e.to_string(),
                });
            }
        };

        if result.is_error {
            tracing::warn!(server_id, tool = tool_name, "MCP tool reported an error");
        }

        Ok(collapse_content(result))
    }

    // ─── Disconnects ─────────────────────────────────────────────────────

    /// Registered sessions, copied out so no lock is held while using them.
    async fn snapshot(&self) -> Vec<(String, Arc<dyn McpSession>)> {
        self.servers
            .read()
            .await
            .iter()
            .map(|(id, session)| (id.clone(), session.clone()))
            .collect()
    }

    /// Drop every session whose provider is gone.
    async fn prune_disconnected(&self) {
        let sessions = self.snapshot().await;

        for (server_id, session) in sessions {
            if !session.is_alive().await {
                tracing::warn!(server_id = %server_id, "MCP server disconnected");
                self.remove_session(&server_id, &session).await;
            }
        }
    }

    /// Remove `session` if it is still the one registered under `server_id`,
    /// then reap it.
    async fn remove_session(&self, server_id: &str, session: &Arc<dyn McpSession>) {
        let removed = {
            let mut servers = self.servers.write().await;
            let is_current = servers
                .get(server_id)
                .is_some_and(|current| Arc::ptr_eq(current, session));
            if is_current {
                servers.remove(server_id)
            } else {
                None
            }
        };
        if let Some(session) = removed {
            session.close().await;
            tracing::info!(server_id, "MCP server removed");
        }
    }

    // ─── Status ──────────────────────────────────────────────────────────

    /// Number of registered sessions.
    pub async fn connection_count(&self) -> usize {
        self.servers.read().await.len()
    }

    /// Ids of all registered sessions, sorted.
    pub async fn connection_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.servers.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Reverse lookup: the id a given session is registered under.
    pub async fn connection_id_of(&self, session: &Arc<dyn McpSession>) -> Option<String> {
        self.servers
            .read()
            .await
            .iter()
            .find(|(_, s)| Arc::ptr_eq(s, session))
            .map(|(id, _)| id.clone())
    }
}

/// Tag a connect failure with the configured server name.
///
/// Errors that already carry their own kind pass through unchanged.
fn tag_connect_error(name: &str, error: McpError) -> McpError {
    match error {
        McpError::ConnectionFailed { .. }
        | McpError::DuplicateConnection { .. }
        | McpError::Cancelled => error,
        other => McpError::ConnectionFailed {
            name: name.to_string(),
            reason: other.to_string(),
        },
    }
}

/// Concatenate a tool result's fragments into one string.
///
/// Text fragments are appended as-is; other fragments as their JSON
/// encoding, skipping any that fail to serialize.
fn collapse_content(result: CallToolResult) -> ToolOutput {
    let Some(fragments) = result.content else {
        return ToolOutput {
            text: EMPTY_RESULT_TEXT.to_string(),
            is_error: result.is_error,
        };
    };

    let mut text = String::new();
    for fragment in &fragments {
        match CallToolResult::fragment_text(fragment) {
            Some(t) => text.push_str(t),
            None => {
                if let Ok(json) = serde_json::to_string(fragment) {
                    text.push_str(&json);
                }
            }
        }
    }

    ToolOutput {
        text,
        is_error: result.is_error,
    }
}

// ─── McpToolExecutor ─────────────────────────────────────────────────────────

/// Runs a listed tool on the session it came from.
pub struct McpToolExecutor {
    client: McpClient,
    server_id: String,
    /// Native tool name, without the server prefix.
    tool_name: String,
}

#[async_trait]
impl ToolExecutor for McpToolExecutor {
    async fn execute(
        &self,
        arguments: serde_json::Map<String, serde_json::Value>,
        cancel: &CancellationToken,
    ) -> Result<ToolOutput, ToolError> {
        self.client
            .call_on_server(&self.server_id, &self.tool_name, arguments, cancel)
            .await
            .map_err(|e| ToolError::Execution {
                name: format!("{}{TOOL_NAME_SEPARATOR}{}", self.server_id, self.tool_name),
                source: Box::new(e),
            })
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
