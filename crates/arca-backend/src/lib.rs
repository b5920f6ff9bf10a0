//! arca-backend: Streaming chat backend for the card-editing assistant.
//!
//! Reads an OpenAI-compatible SSE response, normalizes vendor payload shapes,
//! reassembles tool calls from fragments, and hands text to the caller as it
//! arrives.

pub mod assembler;
pub mod client;
pub mod delta;
pub mod error;
pub mod mock;
pub mod sse;
pub mod stream;

pub use assembler::ToolCallAssembler;
pub use client::{ChatClient, ClientOptions};
pub use delta::Delta;
pub use error::{BackendError, ErrorCode};
pub use mock::{MockConfig, MockResponse};
pub use sse::{Frame, FrameDecoder, FrameReader, ReadOutcome};
pub use stream::{drive_stream, StreamHandlers, StreamOutcome};
