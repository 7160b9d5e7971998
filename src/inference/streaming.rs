//! NDJSON response parser for Ollama's `/api/chat`.
//!
//! Reads a `reqwest::Response` as a byte stream, splits on newlines, parses
//! each line as a [`ChatResponse`] chunk, and accumulates content and tool
//! calls across chunks.

use futures::stream::{self, Stream, StreamExt};

use super::errors::InferenceError;
use super::types::{ChatResponse, ToolCall};

// ─── NDJSON line parser ──────────────────────────────────────────────────────

/// Parse an NDJSON HTTP body into `ChatResponse` chunks.
///
/// Lines may span network reads; a trailing line without a newline is
/// parsed when the body ends.
pub fn parse_ndjson_stream(
    response: reqwest::Response,
) -> impl Stream<Item = Result<ChatResponse, InferenceError>> {
    let byte_stream = response.bytes_stream();

    stream::unfold(
        (byte_stream, Vec::<u8>::new(), false),
        |(mut byte_stream, mut buffer, finished)| async move {
            if finished {
                return None;
            }
            loop {
                // Process complete lines (each JSON object ends with \n)
                while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                    let line_bytes: Vec<u8> = buffer.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&line_bytes);
                    match parse_chat_line(&line) {
                        Ok(Some(chunk)) => return Some((Ok(chunk), (byte_stream, buffer, false))),
                        Ok(None) => continue,
                        Err(e) => return Some((Err(e), (byte_stream, buffer, true))),
                    }
                }

                match byte_stream.next().await {
                    Some(Ok(bytes)) => buffer.extend_from_slice(&bytes),
                    Some(Err(e)) => {
                        return Some((
                            Err(InferenceError::StreamError {
                                reason: format!("stream read error: {e}"),
                            }),
                            (byte_stream, buffer, true),
                        ));
                    }
                    None => {
                        let rest = String::from_utf8_lossy(&buffer).into_owned();
                        buffer.clear();
                        return match parse_chat_line(&rest) {
                            Ok(Some(chunk)) => Some((Ok(chunk), (byte_stream, buffer, true))),
                            Ok(None) => None,
                            Err(e) => Some((Err(e), (byte_stream, buffer, true))),
                        };
                    }
                }
            }
        },
    )
}

/// Parse one NDJSON line. Blank lines yield `None`.
///
/// Ollama reports mid-stream failures as `{"error": "..."}` lines.
pub fn parse_chat_line(line: &str) -> Result<Option<ChatResponse>, InferenceError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let value: serde_json::Value =
        serde_json::from_str(trimmed).map_err(|e| InferenceError::StreamError {
            reason: format!("failed to parse chunk: {e} (data: {trimmed})"),
        })?;

    if let Some(message) = value.get("error").and_then(|e| e.as_str()) {
        return Err(InferenceError::StreamError {
            reason: message.to_string(),
        });
    }

    serde_json::from_value(value)
        .map(Some)
        .map_err(|e| InferenceError::StreamError {
            reason: format!("malformed chat chunk: {e}"),
        })
}

// ─── Accumulation ────────────────────────────────────────────────────────────

/// Folds a sequence of chunks into one complete response.
///
/// Content is concatenated in arrival order and tool calls are collected
/// from every chunk. Metadata (`done`, `done_reason`, counters) comes from
/// the last chunk.
#[derive(Debug, Default)]
pub struct ResponseAccumulator {
    content: String,
    tool_calls: Vec<ToolCall>,
    last: Option<ChatResponse>,
}

impl ResponseAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, mut chunk: ChatResponse) {
        self.content.push_str(&chunk.message.content);
        self.tool_calls.append(&mut chunk.message.tool_calls);
        self.last = Some(chunk);
    }

    pub fn finish(self) -> Result<ChatResponse, InferenceError> {
        let mut response = self.last.ok_or_else(|| InferenceError::StreamError {
            reason: "empty response body".into(),
        })?;
        response.message.content = self.content;
        response.message.tool_calls = self.tool_calls;
        Ok(response)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::types::{ChatMessage, Role};

    fn chunk(content: &str, calls: &[&str], done: bool) -> ChatResponse {
        ChatResponse {
            model: "m".into(),
            message: ChatMessage {
                role: Role::Assistant,
                content: content.into(),
                tool_calls: calls
                    .iter()
                    .map(|n| ToolCall::new(n, serde_json::Map::new()))
                    .collect(),
                tool_name: None,
            },
            done,
            ..ChatResponse::default()
        }
    }

    #[test]
    fn test_parse_chat_line_blank() {
        assert!(parse_chat_line("   \r\n").unwrap().is_none());
    }

    #[test]
    fn test_parse_chat_line_chunk() {
        let line = r#"{"model":"m","message":{"role":"assistant","content":"Hel"},"done":false}"#;
        let chunk = parse_chat_line(line).unwrap().unwrap();
        assert_eq!(chunk.message.content, "Hel");
        assert!(!chunk.done);
    }

    #[test]
    fn test_parse_chat_line_error_object() {
        let err = parse_chat_line(r#"{"error":"model 'nope' not found"}"#).unwrap_err();
        assert!(err.to_string().contains("model 'nope' not found"));
    }

    #[test]
    fn test_parse_chat_line_garbage() {
        assert!(matches!(
            parse_chat_line("not json"),
            Err(InferenceError::StreamError { .. })
        ));
    }

    #[test]
    fn test_accumulator_concatenates_content_and_collects_calls() {
        let mut acc = ResponseAccumulator::new();
        acc.push(chunk("Hel", &[], false));
        acc.push(chunk("lo", &["a:one"], false));
        let mut last = chunk("", &["b:two"], true);
        last.done_reason = Some("stop".into());
        acc.push(last);

        let response = acc.finish().unwrap();
        assert_eq!(response.message.content, "Hello");
        let names: Vec<&str> = response
            .message
            .tool_calls
            .iter()
            .map(|c| c.function.name.as_str())
            .collect();
        assert_eq!(names, vec!["a:one", "b:two"]);
        assert!(response.done);
        assert_eq!(response.done_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn test_accumulator_empty_is_error() {
        let acc = ResponseAccumulator::new();
        assert!(acc.finish().is_err());
    }
}
