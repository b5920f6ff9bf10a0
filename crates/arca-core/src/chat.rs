//! One-shot chat turn: stream a completion, turn the model's edit tool calls
//! into field changes, show them as diffs and optionally write them back.

use std::fmt::Write as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use arca_backend::{BackendError, ChatClient, StreamHandlers, StreamOutcome};
use arca_protocol::{AssembledToolCall, ChatMessage, ChatRequest};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::cache::RowCache;
use crate::config::{Config, ConfigError};
use crate::document::{Document, DocumentError, FieldPath, JsonDocument};
use crate::item::{DiffItem, Operation};
use crate::ledger::{AppliedEntry, UndoLedger};

pub const EDIT_TOOL: &str = "edit_card";

const SYSTEM_PROMPT: &str = "You help edit a character card stored as JSON. \
Answer the user briefly. When the user asks for changes, call the edit_card tool \
with one change per field, using dot/bracket paths such as data.description or \
data.character_book.entries[0].content.";

#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{path}: invalid card JSON: {source}")]
    Card {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid edit_card arguments: {0}")]
    InvalidArguments(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default)]
pub struct ChatArgs {
    pub instruction: String,
    /// Card JSON file given to the model and, with `write`, updated in place.
    pub card: Option<PathBuf>,
    pub write: bool,
}

#[derive(Debug, Deserialize)]
struct EditArguments {
    #[serde(default)]
    summary: String,
    changes: Vec<ProposedChange>,
}

#[derive(Debug, Deserialize)]
struct ProposedChange {
    path: String,
    #[serde(default = "default_operation")]
    operation: Operation,
    #[serde(default)]
    value: Option<Value>,
}

fn default_operation() -> Operation {
    Operation::Set
}

/// JSON schema of the edit tool offered to the model.
pub fn edit_tool() -> Value {
    json!({
        "type": "function",
        "function": {
            "name": EDIT_TOOL,
            "description": "Propose changes to fields of the character card.",
            "parameters": {
                "type": "object",
                "properties": {
                    "summary": { "type": "string" },
                    "changes": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "path": { "type": "string" },
                                "operation": {
                                    "type": "string",
                                    "enum": ["set", "append", "remove", "move"]
                                },
                                "value": {}
                            },
                            "required": ["path"]
                        }
                    }
                },
                "required": ["changes"]
            }
        }
    })
}

/// Build an entry from the edit tool calls of one response, reading `before`
/// values from the current document. Returns `None` when there are no edits.
///
/// Each item is keyed by its call id and position, so repeated changes to
/// one path stay individually rejectable.
pub fn proposed_entry(
    doc: &JsonDocument,
    entry_id: &str,
    calls: &[AssembledToolCall],
) -> Result<Option<AppliedEntry>, ChatError> {
    let mut items = Vec::new();
    let mut summaries = Vec::new();

    let edit_calls = calls.iter().filter(|call| call.function.name == EDIT_TOOL);
    for (call_position, call) in edit_calls.enumerate() {
        let args: EditArguments = serde_json::from_str(&call.function.arguments)?;
        if !args.summary.is_empty() {
            summaries.push(args.summary);
        }
        let call_id = call
            .id
            .clone()
            .unwrap_or_else(|| format!("{entry_id}-call{call_position}"));
        for (position, change) in args.changes.into_iter().enumerate() {
            let path = FieldPath::parse(&change.path)?;
            let before = match change.operation {
                Operation::Append => None,
                _ => doc.get(&path),
            };
            let after = match change.operation {
                Operation::Remove => None,
                _ => change.value,
            };
            items.push(
                DiffItem::new(change.path, change.operation, before, after)
                    .with_id(format!("{call_id}:{position}")),
            );
        }
    }

    if items.is_empty() {
        return Ok(None);
    }
    Ok(Some(
        AppliedEntry::new(entry_id, items).with_summary(summaries.join("; ")),
    ))
}

/// Render every change of an entry as a folded unified diff.
pub fn format_entry(entry: &AppliedEntry, cache: &mut RowCache) -> String {
    let mut out = String::new();
    if !entry.summary.is_empty() {
        let _ = writeln!(out, "# {}", entry.summary);
    }
    for item in &entry.items {
        let _ = writeln!(out, "@@ {} ({})", item.path, item.operation.as_str());
        let view = cache.view(&item.before_text(), &item.after_text());
        out.push_str(&view.format_unified());
    }
    out
}

fn read_card(path: &Path) -> Result<JsonDocument, ChatError> {
    let text = std::fs::read_to_string(path).map_err(|source| ChatError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let value: Value = serde_json::from_str(&text).map_err(|source| ChatError::Card {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(JsonDocument::new(value))
}

fn write_card(path: &Path, doc: &JsonDocument) -> Result<(), ChatError> {
    let text = serde_json::to_string_pretty(doc.root()).map_err(|source| ChatError::Card {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, text + "\n").map_err(|source| ChatError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn build_request(client: &ChatClient, args: &ChatArgs, doc: Option<&JsonDocument>) -> ChatRequest {
    let mut messages = vec![ChatMessage::system(SYSTEM_PROMPT)];
    if let Some(doc) = doc {
        let card = serde_json::to_string_pretty(doc.root()).unwrap_or_default();
        messages.push(ChatMessage::system(format!("Current card:\n{card}")));
    }
    messages.push(ChatMessage::user(args.instruction.clone()));

    let request = client.request(messages);
    if doc.is_some() {
        request.with_tools(vec![edit_tool()], Some(json!("auto")))
    } else {
        request
    }
}

/// Run one chat turn. Returns the process exit code.
pub async fn run_chat(config: &Config, args: &ChatArgs) -> i32 {
    match chat(config, args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("[arca:chat] error: {e}");
            if let ChatError::Backend(backend) = &e {
                log::debug!("[arca:chat] error code {:?}", backend.code());
            }
            1
        }
    }
}

/// Print the models the configured endpoint offers, one per line.
pub async fn run_models(config: &Config) -> i32 {
    match list_models(config).await {
        Ok(models) => {
            for model in models {
                println!("{model}");
            }
            0
        }
        Err(e) => {
            eprintln!("[arca:models] error: {e}");
            1
        }
    }
}

async fn list_models(config: &Config) -> Result<Vec<String>, ChatError> {
    let api_key = config.backend.resolve_api_key()?;
    let client = ChatClient::new(&config.backend.client_options(api_key))?;
    Ok(client.list_models().await?)
}

async fn chat(config: &Config, args: &ChatArgs) -> Result<i32, ChatError> {
    let api_key = config.backend.resolve_api_key()?;
    let client = ChatClient::new(&config.backend.client_options(api_key))?;

    let mut doc = match &args.card {
        Some(path) => Some(read_card(path)?),
        None => None,
    };
    let request = build_request(&client, args, doc.as_ref());

    let cancel = CancellationToken::new();
    let watcher = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            watcher.cancel();
        }
    });

    let mut handlers = StreamHandlers::new()
        .on_delta(|text| {
            let mut stdout = std::io::stdout();
            let _ = stdout.write_all(text.as_bytes());
            let _ = stdout.flush();
        })
        .on_thinking_delta(|text| {
            let _ = std::io::stderr().write_all(text.as_bytes());
        });

    let outcome = client
        .stream_complete_chat(&request, &mut handlers, &cancel)
        .await?;
    println!();

    let completion = match outcome {
        StreamOutcome::Completed(completion) => completion,
        StreamOutcome::Cancelled => {
            eprintln!("[arca:chat] cancelled");
            return Ok(130);
        }
    };
    let Some(message) = completion.message() else {
        return Ok(0);
    };
    let calls = message.tool_calls.as_deref().unwrap_or_default();
    for call in calls.iter().filter(|call| call.function.name != EDIT_TOOL) {
        eprintln!("[arca:chat] ignoring tool call {}", call.function.name);
    }

    let Some(doc) = doc.as_mut() else {
        return Ok(0);
    };
    let Some(entry) = proposed_entry(doc, "turn-1", calls)? else {
        return Ok(0);
    };

    let mut cache = RowCache::new(config.diff.cache_capacity, config.diff.options());
    print!("{}", format_entry(&entry, &mut cache));

    if args.write {
        if let Some(path) = &args.card {
            let mut ledger = UndoLedger::from_config(&config.ledger);
            ledger.apply_entry(doc, entry)?;
            write_card(path, doc)?;
            eprintln!("[arca:chat] wrote {}", path.display());
        }
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arca_protocol::FunctionCall;

    fn call(name: &str, arguments: Value) -> AssembledToolCall {
        AssembledToolCall {
            id: Some("call_1".to_string()),
            kind: "function".to_string(),
            function: FunctionCall {
                name: name.to_string(),
                arguments: arguments.to_string(),
            },
        }
    }

    fn card() -> JsonDocument {
        JsonDocument::new(json!({
            "data": {"name": "Aria", "description": "A bard.", "tags": ["music"]}
        }))
    }

    #[test]
    fn proposed_entry_reads_before_values() {
        let calls = vec![call(
            EDIT_TOOL,
            json!({
                "summary": "make her a knight",
                "changes": [
                    {"path": "data.description", "value": "A knight."},
                    {"path": "data.tags[1]", "operation": "append", "value": "armor"},
                    {"path": "data.name", "operation": "remove"}
                ]
            }),
        )];

        let entry = proposed_entry(&card(), "e1", &calls).unwrap().unwrap();
        assert_eq!(entry.summary, "make her a knight");
        assert_eq!(entry.items.len(), 3);
        assert_eq!(entry.items[0].before, Some(json!("A bard.")));
        assert_eq!(entry.items[0].after, Some(json!("A knight.")));
        assert_eq!(entry.items[1].before, None);
        assert_eq!(entry.items[2].before, Some(json!("Aria")));
        assert_eq!(entry.items[2].after, None);
    }

    #[test]
    fn repeated_changes_to_one_path_are_rejected_separately() {
        let calls = vec![call(
            EDIT_TOOL,
            json!({"changes": [
                {"path": "data.tags[1]", "operation": "append", "value": "armor"},
                {"path": "data.tags[1]", "operation": "append", "value": "shield"}
            ]}),
        )];
        let entry = proposed_entry(&card(), "e1", &calls).unwrap().unwrap();
        let keys: Vec<String> = entry.items.iter().map(DiffItem::key).collect();
        assert_eq!(keys, vec!["call_1:0", "call_1:1"]);

        let mut doc = card();
        let mut ledger = UndoLedger::default();
        ledger.apply_entry(&mut doc, entry).unwrap();
        assert_eq!(doc.root()["data"]["tags"], json!(["music", "shield", "armor"]));

        assert!(ledger.reject_item(&mut doc, "e1", "call_1:1").ok);
        assert_eq!(doc.root()["data"]["tags"], json!(["music", "armor"]));
        assert!(ledger.reject_item(&mut doc, "e1", "call_1:0").ok);
        assert_eq!(doc.root(), card().root());
        assert!(ledger.is_empty());
    }

    #[test]
    fn calls_without_ids_get_positional_keys() {
        let rename = |to: &str| {
            let mut unnamed = call(
                EDIT_TOOL,
                json!({"changes": [{"path": "data.name", "value": to}]}),
            );
            unnamed.id = None;
            unnamed
        };
        let (first, second) = (rename("Bree"), rename("Cora"));

        let entry = proposed_entry(&card(), "e1", &[first, second]).unwrap().unwrap();
        let keys: Vec<String> = entry.items.iter().map(DiffItem::key).collect();
        assert_eq!(keys, vec!["e1-call0:0", "e1-call1:0"]);
    }

    #[test]
    fn other_tools_and_empty_edits_yield_nothing() {
        let calls = vec![
            call("lookup", json!({"q": "x"})),
            call(EDIT_TOOL, json!({"changes": []})),
        ];
        assert!(proposed_entry(&card(), "e1", &calls).unwrap().is_none());
    }

    #[test]
    fn malformed_arguments_are_errors() {
        let mut bad = call(EDIT_TOOL, json!({}));
        bad.function.arguments = "{\"changes\": [".to_string();
        assert!(matches!(
            proposed_entry(&card(), "e1", &[bad]),
            Err(ChatError::InvalidArguments(_))
        ));

        let bad_path = call(EDIT_TOOL, json!({"changes": [{"path": "a..b"}]}));
        assert!(matches!(
            proposed_entry(&card(), "e1", &[bad_path]),
            Err(ChatError::Document(_))
        ));
    }

    #[test]
    fn format_entry_shows_each_change() {
        let calls = vec![call(
            EDIT_TOOL,
            json!({"changes": [{"path": "data.description", "value": "A knight."}]}),
        )];
        let entry = proposed_entry(&card(), "e1", &calls).unwrap().unwrap();
        let text = format_entry(&entry, &mut RowCache::default());

        assert!(text.contains("@@ data.description (set)"));
        assert!(text.contains("- A bard."));
        assert!(text.contains("+ A knight."));
    }

    #[test]
    fn edit_tool_schema_names_the_tool() {
        assert_eq!(edit_tool()["function"]["name"], EDIT_TOOL);
    }
}
