//! Normalizes one frame's JSON payload into a [`Delta`].
//!
//! Upstream vendors are not uniform: text may be a string, a list of typed
//! parts, or an object wrapping either; reasoning text hides under several
//! names; some vendors send a full `message` instead of a `delta`. All of that
//! variance is absorbed here so the rest of the pipeline sees one shape.

use arca_protocol::{FinishReason, ToolCallFragment};
use serde_json::{Map, Value};

/// Maximum nesting followed when flattening text values.
const MAX_TEXT_DEPTH: usize = 6;

const CONTENT_KEYS: &[&str] = &["content", "text"];
const REASONING_KEYS: &[&str] = &[
    "reasoning_content",
    "reasoning",
    "thinking",
    "reasoning_text",
    "thought",
];
/// Keys consulted, in order, when a text value is an object.
const NESTED_TEXT_KEYS: &[&str] = &["text", "content", "value"];

/// Normalized decoding of one frame.
///
/// Empty strings mean "no update", never "clear".
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Delta {
    pub content: String,
    pub reasoning: String,
    pub tool_call_fragments: Vec<ToolCallFragment>,
    pub finish_reason: Option<FinishReason>,
    /// Full message object, present when the vendor sent a non-streaming shape.
    pub raw_message: Option<Value>,
}

impl Delta {
    /// Parse a frame's data permissively. Malformed JSON yields an empty delta.
    pub fn parse(data: &str) -> Delta {
        match serde_json::from_str::<Value>(data) {
            Ok(value) => Delta::from_value(&value),
            Err(e) => {
                log::debug!("[arca:delta] ignoring malformed payload ({e}): {data}");
                Delta::default()
            }
        }
    }

    pub fn from_value(payload: &Value) -> Delta {
        let choice = payload
            .get("choices")
            .and_then(|choices| choices.get(0))
            .unwrap_or(payload);
        let delta = choice.get("delta");
        let message = choice.get("message").filter(|m| m.is_object());

        let text_sources = [delta, message];

        Delta {
            content: first_text(&text_sources, CONTENT_KEYS),
            reasoning: first_text(&text_sources, REASONING_KEYS),
            tool_call_fragments: delta
                .and_then(|d| d.get("tool_calls"))
                .and_then(Value::as_array)
                .map(|calls| calls.iter().filter_map(parse_fragment).collect())
                .unwrap_or_default(),
            finish_reason: choice
                .get("finish_reason")
                .and_then(Value::as_str)
                .filter(|reason| !reason.is_empty())
                .map(FinishReason::from),
            raw_message: message.cloned(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
            && self.reasoning.is_empty()
            && self.tool_call_fragments.is_empty()
            && self.finish_reason.is_none()
            && self.raw_message.is_none()
    }

    /// Tool calls carried by a full message, as fragments with positional
    /// indices.
    pub fn message_tool_call_fragments(&self) -> Vec<ToolCallFragment> {
        self.raw_message
            .as_ref()
            .and_then(|m| m.get("tool_calls"))
            .and_then(Value::as_array)
            .map(|calls| {
                calls
                    .iter()
                    .enumerate()
                    .filter_map(|(position, call)| {
                        let mut fragment = parse_fragment(call)?;
                        fragment.index = Some(position);
                        Some(fragment)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// The shapes a text-bearing field is known to take.
enum TextShape<'a> {
    Plain(&'a str),
    Parts(&'a [Value]),
    Nested(&'a Map<String, Value>),
    Absent,
}

impl<'a> From<&'a Value> for TextShape<'a> {
    fn from(value: &'a Value) -> Self {
        match value {
            Value::String(text) => TextShape::Plain(text),
            Value::Array(parts) => TextShape::Parts(parts),
            Value::Object(map) => TextShape::Nested(map),
            Value::Null | Value::Bool(_) | Value::Number(_) => TextShape::Absent,
        }
    }
}

fn flatten_text(value: &Value, depth: usize) -> String {
    if depth >= MAX_TEXT_DEPTH {
        return String::new();
    }
    match TextShape::from(value) {
        TextShape::Plain(text) => text.to_string(),
        TextShape::Parts(parts) => parts
            .iter()
            .map(|part| flatten_text(part, depth + 1))
            .collect(),
        TextShape::Nested(map) => NESTED_TEXT_KEYS
            .iter()
            .filter_map(|key| map.get(*key))
            .map(|inner| flatten_text(inner, depth + 1))
            .find(|text| !text.is_empty())
            .unwrap_or_default(),
        TextShape::Absent => String::new(),
    }
}

/// First non-empty flattened text among `keys`, checking each source in order.
fn first_text(sources: &[Option<&Value>], keys: &[&str]) -> String {
    sources
        .iter()
        .flatten()
        .copied()
        .flat_map(|source| keys.iter().filter_map(move |key| source.get(*key)))
        .map(|value| flatten_text(value, 0))
        .find(|text| !text.is_empty())
        .unwrap_or_default()
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn parse_fragment(value: &Value) -> Option<ToolCallFragment> {
    let call = value.as_object()?;
    let function = call.get("function");

    Some(ToolCallFragment {
        index: call
            .get("index")
            .and_then(Value::as_u64)
            .and_then(|index| usize::try_from(index).ok()),
        id: non_empty_str(call.get("id")),
        kind: non_empty_str(call.get("type")),
        function_name: non_empty_str(function.and_then(|f| f.get("name"))),
        arguments: function
            .and_then(|f| f.get("arguments"))
            .filter(|args| !args.is_null())
            .cloned(),
    })
}
