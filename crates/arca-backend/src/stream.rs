//! Transport-independent streaming pipeline: frames → deltas → callbacks and
//! tool-call assembly → one [`ChatCompletion`].

use arca_protocol::{
    AssistantMessage, ChatCompletion, FinishReason, Role, ToolCallFragment,
};
use bytes::Bytes;
use futures::Stream;
use tokio_util::sync::CancellationToken;

use crate::assembler::ToolCallAssembler;
use crate::delta::Delta;
use crate::error::BackendError;
use crate::sse::{FrameReader, ReadOutcome};

type TextCallback<'a> = Box<dyn FnMut(&str) + Send + 'a>;
type FragmentCallback<'a> = Box<dyn FnMut(&ToolCallFragment) + Send + 'a>;

/// Incremental callbacks, invoked in arrival order. Empty text never fires.
#[derive(Default)]
pub struct StreamHandlers<'a> {
    on_delta: Option<TextCallback<'a>>,
    on_thinking_delta: Option<TextCallback<'a>>,
    on_tool_call_fragment: Option<FragmentCallback<'a>>,
}

impl<'a> StreamHandlers<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_delta(mut self, callback: impl FnMut(&str) + Send + 'a) -> Self {
        self.on_delta = Some(Box::new(callback));
        self
    }

    pub fn on_thinking_delta(mut self, callback: impl FnMut(&str) + Send + 'a) -> Self {
        self.on_thinking_delta = Some(Box::new(callback));
        self
    }

    pub fn on_tool_call_fragment(
        mut self,
        callback: impl FnMut(&ToolCallFragment) + Send + 'a,
    ) -> Self {
        self.on_tool_call_fragment = Some(Box::new(callback));
        self
    }
}

/// How a streamed response ended.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamOutcome {
    Completed(ChatCompletion),
    /// Cancelled by the caller. Text already delivered through the callbacks
    /// stays valid; no completion is produced.
    Cancelled,
}

impl StreamOutcome {
    pub fn completion(self) -> Option<ChatCompletion> {
        match self {
            StreamOutcome::Completed(completion) => Some(completion),
            StreamOutcome::Cancelled => None,
        }
    }
}

/// Accumulates one response across deltas.
#[derive(Debug, Default)]
struct ResponseBuilder {
    content: String,
    reasoning: String,
    assembler: ToolCallAssembler,
    finish_reason: Option<FinishReason>,
    message_tool_calls: Vec<ToolCallFragment>,
}

impl ResponseBuilder {
    fn absorb(&mut self, delta: Delta, handlers: &mut StreamHandlers<'_>) {
        if !delta.content.is_empty() {
            if let Some(on_delta) = handlers.on_delta.as_mut() {
                on_delta(&delta.content);
            }
            self.content.push_str(&delta.content);
        }

        if !delta.reasoning.is_empty() {
            if let Some(on_thinking) = handlers.on_thinking_delta.as_mut() {
                on_thinking(&delta.reasoning);
            }
            self.reasoning.push_str(&delta.reasoning);
        }

        for fragment in &delta.tool_call_fragments {
            if let Some(on_fragment) = handlers.on_tool_call_fragment.as_mut() {
                on_fragment(fragment);
            }
            self.assembler.apply(fragment);
        }

        let message_calls = delta.message_tool_call_fragments();
        if !message_calls.is_empty() {
            self.message_tool_calls = message_calls;
        }

        if delta.finish_reason.is_some() {
            self.finish_reason = delta.finish_reason;
        }
    }

    fn finish(mut self) -> ChatCompletion {
        // Non-streaming vendors deliver calls only on the full message
        if self.assembler.is_empty() && !self.message_tool_calls.is_empty() {
            self.assembler.apply_fragments(&self.message_tool_calls);
        }

        let tool_calls = self.assembler.to_list();
        let finish_reason = self.finish_reason.unwrap_or(if tool_calls.is_empty() {
            FinishReason::Stop
        } else {
            FinishReason::ToolCalls
        });

        ChatCompletion::single(
            AssistantMessage {
                role: Role::Assistant,
                content: self.content,
                reasoning_content: Some(self.reasoning).filter(|r| !r.is_empty()),
                tool_calls: Some(tool_calls).filter(|calls| !calls.is_empty()),
            },
            finish_reason,
        )
    }
}

/// Drive a raw SSE byte stream to completion.
///
/// Malformed payloads are skipped; `event: error` frames and transport
/// failures end the stream with an error.
pub async fn drive_stream<S, E>(
    bytes: S,
    handlers: &mut StreamHandlers<'_>,
    cancel: &CancellationToken,
) -> Result<StreamOutcome, BackendError>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Into<BackendError>,
{
    let mut reader = FrameReader::new(bytes);
    let mut response = ResponseBuilder::default();

    loop {
        match reader.next(cancel).await? {
            ReadOutcome::Frame(frame) => response.absorb(Delta::parse(&frame.data), handlers),
            ReadOutcome::Done => break,
            ReadOutcome::Cancelled => return Ok(StreamOutcome::Cancelled),
        }
    }

    Ok(StreamOutcome::Completed(response.finish()))
}
