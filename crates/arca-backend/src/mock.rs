//! Mock SSE byte streams for testing.
//!
//! Produces the same bytes an OpenAI-compatible endpoint would send, so the
//! frame reader, delta interpreter and assembler can be exercised end to end
//! without HTTP.

use std::pin::Pin;
use std::time::Duration;

use async_stream::stream;
use bytes::Bytes;
use futures::Stream;
use serde_json::{json, Value};
use tokio::time::sleep;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Configurable mock frames.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// A reasoning delta.
    Thinking { content: String },
    /// A content delta.
    Text { content: String },
    /// One tool-call fragment. Unset fields are omitted from the payload.
    ToolCall {
        index: Option<usize>,
        id: Option<String>,
        name: Option<String>,
        arguments: Option<String>,
    },
    /// A frame carrying only a finish reason.
    Finish { reason: String },
    /// A `data:` frame with this exact payload.
    Raw { data: String },
    /// An `event: error` frame in the proxy's `{code, message}` shape.
    Error { message: String },
    /// Delay before the next frame.
    Delay { ms: u64 },
}

/// Configuration for a mock byte stream.
#[derive(Debug, Clone)]
pub struct MockConfig {
    pub responses: Vec<MockResponse>,
    /// Optional delay before each frame (ms).
    pub chunk_delay_ms: Option<u64>,
    /// Split every frame into byte chunks of this size.
    pub chunk_size: Option<usize>,
    /// Use `\r\n` line endings.
    pub crlf: bool,
    /// End with `data: [DONE]`.
    pub send_done: bool,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            responses: Vec::new(),
            chunk_delay_ms: None,
            chunk_size: None,
            crlf: false,
            send_done: true,
        }
    }
}

impl MockConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responses(mut self, responses: Vec<MockResponse>) -> Self {
        self.responses = responses;
        self
    }

    pub fn with_chunk_delay(mut self, ms: u64) -> Self {
        self.chunk_delay_ms = Some(ms);
        self
    }

    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = Some(size.max(1));
        self
    }

    pub fn with_crlf(mut self) -> Self {
        self.crlf = true;
        self
    }

    pub fn without_done(mut self) -> Self {
        self.send_done = false;
        self
    }

    pub fn with_finish(mut self, reason: &str) -> Self {
        self.responses.push(MockResponse::Finish {
            reason: reason.to_string(),
        });
        self
    }

    /// The full byte payload this config produces, as one string.
    pub fn to_wire(&self) -> String {
        let mut wire: String = self
            .responses
            .iter()
            .filter_map(|response| encode_response(response, self.crlf))
            .collect();
        if self.send_done {
            wire.push_str(&encode_frame(None, "[DONE]", self.crlf));
        }
        wire
    }
}

fn chunk_payload(delta: Value) -> String {
    json!({
        "object": "chat.completion.chunk",
        "choices": [{"index": 0, "delta": delta, "finish_reason": null}]
    })
    .to_string()
}

fn encode_frame(event: Option<&str>, data: &str, crlf: bool) -> String {
    let eol = if crlf { "\r\n" } else { "\n" };
    let mut frame = String::new();
    if let Some(event) = event {
        frame.push_str(&format!("event: {event}{eol}"));
    }
    for line in data.split('\n') {
        frame.push_str(&format!("data: {line}{eol}"));
    }
    frame.push_str(eol);
    frame
}

fn encode_response(response: &MockResponse, crlf: bool) -> Option<String> {
    let frame = match response {
        MockResponse::Thinking { content } => encode_frame(
            None,
            &chunk_payload(json!({ "reasoning_content": content })),
            crlf,
        ),
        MockResponse::Text { content } => {
            encode_frame(None, &chunk_payload(json!({ "content": content })), crlf)
        }
        MockResponse::ToolCall {
            index,
            id,
            name,
            arguments,
        } => {
            let mut call = serde_json::Map::new();
            if let Some(index) = index {
                call.insert("index".into(), json!(index));
            }
            if let Some(id) = id {
                call.insert("id".into(), json!(id));
                call.insert("type".into(), json!("function"));
            }
            let mut function = serde_json::Map::new();
            if let Some(name) = name {
                function.insert("name".into(), json!(name));
            }
            if let Some(arguments) = arguments {
                function.insert("arguments".into(), json!(arguments));
            }
            call.insert("function".into(), Value::Object(function));
            encode_frame(
                None,
                &chunk_payload(json!({ "tool_calls": [Value::Object(call)] })),
                crlf,
            )
        }
        MockResponse::Finish { reason } => encode_frame(
            None,
            &json!({"choices": [{"index": 0, "delta": {}, "finish_reason": reason}]}).to_string(),
            crlf,
        ),
        MockResponse::Raw { data } => encode_frame(None, data, crlf),
        MockResponse::Error { message } => encode_frame(
            Some("error"),
            &json!({"code": "UPSTREAM_ERROR", "message": message}).to_string(),
            crlf,
        ),
        MockResponse::Delay { .. } => return None,
    };
    Some(frame)
}

/// Create an SSE byte stream from mock config.
pub fn mock_sse_stream(config: MockConfig) -> ByteStream {
    Box::pin(stream! {
        let chunk_size = config.chunk_size;

        for response in &config.responses {
            if let Some(delay_ms) = config.chunk_delay_ms {
                sleep(Duration::from_millis(delay_ms)).await;
            }

            if let MockResponse::Delay { ms } = response {
                sleep(Duration::from_millis(*ms)).await;
                continue;
            }

            if let Some(frame) = encode_response(response, config.crlf) {
                for chunk in split_bytes(frame.into_bytes(), chunk_size) {
                    yield Ok::<Bytes, std::io::Error>(chunk);
                }
            }
        }

        if config.send_done {
            let done = encode_frame(None, "[DONE]", config.crlf);
            for chunk in split_bytes(done.into_bytes(), chunk_size) {
                yield Ok::<Bytes, std::io::Error>(chunk);
            }
        }
    })
}

fn split_bytes(bytes: Vec<u8>, chunk_size: Option<usize>) -> Vec<Bytes> {
    match chunk_size {
        Some(size) => bytes
            .chunks(size)
            .map(|chunk| Bytes::copy_from_slice(chunk))
            .collect(),
        None => vec![Bytes::from(bytes)],
    }
}

/// Built-in fixtures for common scenarios.
pub mod fixtures {
    use super::*;

    /// Text streamed in the given chunks.
    pub fn streaming_text(chunks: &[&str]) -> MockConfig {
        let responses = chunks
            .iter()
            .map(|chunk| MockResponse::Text {
                content: (*chunk).to_string(),
            })
            .collect();

        MockConfig::new().with_responses(responses)
    }

    /// Reasoning followed by an answer.
    pub fn thinking_then_text(thinking: &str, text: &str) -> MockConfig {
        MockConfig::new()
            .with_responses(vec![
                MockResponse::Thinking {
                    content: thinking.to_string(),
                },
                MockResponse::Text {
                    content: text.to_string(),
                },
            ])
            .with_finish("stop")
    }

    /// One tool call: the first fragment carries index, id and name, later
    /// fragments only the index and an argument chunk.
    pub fn tool_call_chunks(id: &str, name: &str, argument_chunks: &[&str]) -> MockConfig {
        let mut responses = vec![MockResponse::ToolCall {
            index: Some(0),
            id: Some(id.to_string()),
            name: Some(name.to_string()),
            arguments: Some(String::new()),
        }];
        responses.extend(argument_chunks.iter().map(|chunk| MockResponse::ToolCall {
            index: Some(0),
            id: None,
            name: None,
            arguments: Some((*chunk).to_string()),
        }));

        MockConfig::new()
            .with_responses(responses)
            .with_finish("tool_calls")
    }

    /// Text, then an error frame.
    pub fn error_mid_stream(text_before: &str, error: &str) -> MockConfig {
        MockConfig::new().with_responses(vec![
            MockResponse::Text {
                content: text_before.to_string(),
            },
            MockResponse::Error {
                message: error.to_string(),
            },
        ])
    }
}
