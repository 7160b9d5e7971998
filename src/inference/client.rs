//! Ollama inference client.
//!
//! Sends chat requests to an Ollama `/api/chat` endpoint, declares the
//! available tools, and runs the tool calls the model asks for.

use std::time::Duration;

use futures::StreamExt;
use reqwest::Client as HttpClient;
use tokio_util::sync::CancellationToken;

use super::errors::InferenceError;
use super::streaming::{parse_ndjson_stream, ResponseAccumulator};
use super::types::{ChatMessage, ChatRequest, ChatResponse, ToolCall, ToolDefinition};
use crate::tool::{Tool, ToolError};

// ─── Constants ───────────────────────────────────────────────────────────────

/// TCP connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Total request timeout.
///
/// Local models can take minutes on a large context before the first token.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Prefix of the message sent back to the model when a tool call fails.
const TOOL_FAILURE_PREFIX: &str = "Tool execution failed";

// ─── OllamaClient ────────────────────────────────────────────────────────────

/// Where to reach Ollama and which model to use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OllamaOptions {
    pub url: String,
    pub model: String,
}

/// Client for an Ollama chat endpoint.
///
/// Holds the tools the model may call. Tools are resolved by display name
/// against this set only; the client never re-lists them.
pub struct OllamaClient {
    http: HttpClient,
    /// Full `/api/chat` URL.
    endpoint: String,
    model: String,
    tools: Vec<Tool>,
}

impl OllamaClient {
    /// Create a client. Does NOT check connectivity; that happens on the
    /// first request.
    pub fn new(options: OllamaOptions) -> Result<Self, InferenceError> {
        let url = reqwest::Url::parse(&options.url).map_err(|e| InferenceError::InvalidUrl {
            url: options.url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(InferenceError::InvalidUrl {
                url: options.url.clone(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }

        let endpoint = format!("{}/api/chat", options.url.trim_end_matches('/'));

        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| InferenceError::ChatRequest {
                endpoint: endpoint.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            endpoint,
            model: options.model,
            tools: Vec::new(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Replace the set of tools declared to the model.
    pub fn set_tools(&mut self, tools: Vec<Tool>) {
        self.tools = tools;
    }

    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    // ─── Chat ────────────────────────────────────────────────────────────

    /// Send a non-streaming chat request and return the complete reply.
    ///
    /// The body is still read as NDJSON; content from every chunk is
    /// concatenated and tool calls are collected from all of them.
    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        cancel: &CancellationToken,
    ) -> Result<ChatResponse, InferenceError> {
        self.run_chat(messages, false, cancel, |_| {}).await
    }

    /// Send a streaming chat request, calling `on_chunk` for every chunk.
    ///
    /// Returns the accumulated reply once the stream ends.
    pub async fn chat_stream<F>(
        &self,
        messages: &[ChatMessage],
        cancel: &CancellationToken,
        on_chunk: F,
    ) -> Result<ChatResponse, InferenceError>
    where
        F: FnMut(&ChatResponse),
    {
        self.run_chat(messages, true, cancel, on_chunk).await
    }

    async fn run_chat<F>(
        &self,
        messages: &[ChatMessage],
        stream: bool,
        cancel: &CancellationToken,
        mut on_chunk: F,
    ) -> Result<ChatResponse, InferenceError>
    where
        F: FnMut(&ChatResponse),
    {
        let request = self.build_request(messages, stream)?;

        // Log the request metadata (not the full body, it can be huge)
        tracing::info!(
            endpoint = %self.endpoint,
            model = %request.model,
            message_count = request.messages.len(),
            tool_count = request.tools.len(),
            stream,
            "sending chat request"
        );

        let response = self.send(&request, cancel).await?;

        let chunks = parse_ndjson_stream(response);
        futures::pin_mut!(chunks);

        let mut accumulator = ResponseAccumulator::new();
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(InferenceError::Cancelled),
                next = chunks.next() => next,
            };
            match next {
                Some(Ok(chunk)) => {
                    on_chunk(&chunk);
                    accumulator.push(chunk);
                }
                Some(Err(e)) => return Err(e),
                None => break,
            }
        }

        let response = accumulator.finish()?;

        if response.message.tool_calls.is_empty() {
            tracing::debug!("chat response completed without tool calls");
        } else {
            for call in &response.message.tool_calls {
                tracing::info!(
                    tool = %call.function.name,
                    arguments = %serde_json::Value::Object(call.function.arguments.clone()),
                    "model requested tool call"
                );
            }
        }

        Ok(response)
    }

    fn build_request(
        &self,
        messages: &[ChatMessage],
        stream: bool,
    ) -> Result<ChatRequest, InferenceError> {
        let tools = self
            .tools
            .iter()
            .map(ToolDefinition::from_tool)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ChatRequest {
            model: self.model.clone(),
            messages: messages.to_vec(),
            tools,
            stream,
        })
    }

    async fn send(
        &self,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response, InferenceError> {
        let pending = self.http.post(&self.endpoint).json(request).send();

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(InferenceError::Cancelled),
            result = pending => result.map_err(|e| InferenceError::ChatRequest {
                endpoint: self.endpoint.clone(),
                reason: e.to_string(),
            })?,
        };

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(InferenceError::HttpError {
                status: status.as_u16(),
                body: body_text,
            });
        }

        Ok(response)
    }

    // ─── Tool Calls ──────────────────────────────────────────────────────

    /// Run one tool call against the tools set via [`set_tools`](Self::set_tools).
    pub async fn execute_tool_call(
        &self,
        call: &ToolCall,
        cancel: &CancellationToken,
    ) -> Result<String, ToolError> {
        let name = call.function.name.as_str();
        let tool = self
            .tools
            .iter()
            .find(|t| t.function.name == name)
            .ok_or_else(|| ToolError::NotFound {
                name: name.to_string(),
            })?;

        tracing::debug!(tool = name, "executing tool call");

        let output = tool.execute(call.function.arguments.clone(), cancel).await?;
        if output.is_error {
            tracing::warn!(tool = name, result = %output.text, "tool reported an error");
        }
        Ok(output.text)
    }

    /// Run every tool call in `response`, in order.
    ///
    /// Produces one `tool` message per call. A failed call becomes a
    /// `"Tool execution failed: ..."` message so the model can react to it;
    /// only cancellation aborts the batch.
    pub async fn handle_tool_calls(
        &self,
        response: &ChatResponse,
        cancel: &CancellationToken,
    ) -> Result<Vec<ChatMessage>, InferenceError> {
        let calls = &response.message.tool_calls;
        let mut messages = Vec::with_capacity(calls.len());

        for call in calls {
            if cancel.is_cancelled() {
                return Err(InferenceError::Cancelled);
            }

            let content = match self.execute_tool_call(call, cancel).await {
                Ok(text) => text,
                Err(_) if cancel.is_cancelled() => return Err(InferenceError::Cancelled),
                Err(e) => {
                    tracing::warn!(tool = %call.function.name, error = %e, "tool call failed");
                    format!("{TOOL_FAILURE_PREFIX}: {e}")
                }
            };
            messages.push(ChatMessage::tool_result(&call.function.name, content));
        }

        if !messages.is_empty() {
            tracing::debug!(count = messages.len(), "created tool result messages");
        }
        Ok(messages)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
