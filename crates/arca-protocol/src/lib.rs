//! arca-protocol: Shared types for the card-editing assistant.
//!
//! These types sit between the streaming backend, the review/undo core,
//! and whatever document or UI layer drives them. They carry no transport
//! or rendering logic.

pub mod message;
pub mod tool_call;

pub use message::{
    AssistantMessage, ChatCompletion, ChatMessage, ChatRequest, CompletionChoice, FinishReason,
    Role,
};
pub use tool_call::{AssembledToolCall, FunctionCall, ToolCallFragment};
