//! Agent: the question/tool-call/answer loop.
//!
//! Sends the conversation to the model, runs any tool calls it asks for,
//! feeds the results back, and repeats until the model answers without
//! tools or the round limit is reached.

use tokio_util::sync::CancellationToken;

use crate::inference::{ChatMessage, InferenceError, OllamaClient};

/// Default number of model round trips per question.
pub const DEFAULT_MAX_ROUNDS: usize = 5;

/// System prompt used unless one is supplied.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant with access to various \
tools. Use the appropriate tools to answer user questions whenever possible.";

/// One executed tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub name: String,
    pub arguments: serde_json::Map<String, serde_json::Value>,
    /// Text returned to the model, including failure messages.
    pub result: String,
}

/// What a finished run produced.
#[derive(Debug, Clone)]
pub struct AgentOutcome {
    /// The model's last content.
    pub answer: String,
    pub transcript: Vec<ToolInvocation>,
    /// Full conversation, system prompt included.
    pub messages: Vec<ChatMessage>,
    /// Model round trips used.
    pub rounds: usize,
    /// True when the round limit was hit while the model still wanted tools.
    pub exhausted: bool,
}

/// Drives one conversation against an [`OllamaClient`].
pub struct Agent {
    client: OllamaClient,
    system_prompt: String,
    max_rounds: usize,
}

impl Agent {
    pub fn new(client: OllamaClient) -> Self {
        Self {
            client,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// At least one round always runs.
    pub fn with_max_rounds(mut self, rounds: usize) -> Self {
        self.max_rounds = rounds.max(1);
        self
    }

    /// Answer `question`, calling tools as the model requests.
    pub async fn run(
        &self,
        question: &str,
        cancel: &CancellationToken,
    ) -> Result<AgentOutcome, InferenceError> {
        let mut messages = vec![
            ChatMessage::system(self.system_prompt.as_str()),
            ChatMessage::user(question),
        ];
        let mut transcript = Vec::new();
        let mut answer = String::new();

        for round in 1..=self.max_rounds {
            let response = match self.client.chat(&messages, cancel).await {
                Ok(response) => response,
                Err(e) => {
                    if e.is_tool_call_parse_error() {
                        tracing::warn!(round, "model produced malformed tool call arguments");
                    }
                    return Err(e);
                }
            };

            answer = response.message.content.clone();

            if response.message.tool_calls.is_empty() {
                messages.push(response.message);
                tracing::info!(round, tool_calls = transcript.len(), "agent finished");
                return Ok(AgentOutcome {
                    answer,
                    transcript,
                    messages,
                    rounds: round,
                    exhausted: false,
                });
            }

            tracing::info!(round, count = response.message.tool_calls.len(), "running tool calls");
            let results = self.client.handle_tool_calls(&response, cancel).await?;

            for (call, result) in response.message.tool_calls.iter().zip(&results) {
                transcript.push(ToolInvocation {
                    name: call.function.name.clone(),
                    arguments: call.function.arguments.clone(),
                    result: result.content.clone(),
                });
            }

            messages.push(response.message);
            messages.extend(results);
        }

        tracing::warn!(max_rounds = self.max_rounds, "round limit reached with pending tool calls");
        Ok(AgentOutcome {
            answer,
            transcript,
            messages,
            rounds: self.max_rounds,
            exhausted: true,
        })
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
