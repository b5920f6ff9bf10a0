//! Tool-call types: the partial fragments a stream delivers and the
//! assembled calls reconstructed from them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Partial description of one function call, as delivered by one frame.
///
/// Every field is optional because vendors disagree on which of them are
/// repeated on continuation frames.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ToolCallFragment {
    /// Position in the final call list.
    pub index: Option<usize>,
    /// Opaque id, stable per call.
    pub id: Option<String>,
    /// Call type; `"function"` when never given.
    pub kind: Option<String>,
    pub function_name: Option<String>,
    /// Argument text to append. Non-string JSON values are stringified
    /// before appending.
    pub arguments: Option<Value>,
}

impl ToolCallFragment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.function_name = Some(name.into());
        self
    }

    pub fn with_arguments(mut self, chunk: impl Into<String>) -> Self {
        self.arguments = Some(Value::String(chunk.into()));
        self
    }

    pub fn with_argument_value(mut self, value: Value) -> Self {
        self.arguments = Some(value);
        self
    }

    /// The argument chunk as text, or `None` when there is nothing to append.
    pub fn arguments_text(&self) -> Option<String> {
        match self.arguments.as_ref()? {
            Value::Null => None,
            Value::String(text) => Some(text.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// Name and JSON-encoded arguments of an assembled call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

/// A complete tool invocation reconstructed from fragments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssembledToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionCall,
}
