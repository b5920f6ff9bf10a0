//! Reconstructs complete tool calls from streamed fragments.
//!
//! Vendors disagree on whether continuation fragments repeat `index`, `id`
//! or the function name. Guessing wrong silently corrupts the JSON argument
//! string, so each fragment is routed to a slot by the most explicit signal
//! it carries, falling back to positional continuation only when nothing
//! else identifies it.

use std::collections::{BTreeMap, HashMap};

use arca_protocol::{AssembledToolCall, FunctionCall, ToolCallFragment};
use serde_json::Value;

const DEFAULT_CALL_KIND: &str = "function";

#[derive(Debug, Clone, Default)]
struct Slot {
    id: Option<String>,
    kind: Option<String>,
    name: Option<String>,
    /// Append-only.
    arguments: String,
}

impl Slot {
    fn is_empty(&self) -> bool {
        self.id.is_none() && self.name.is_none() && self.arguments.is_empty()
    }

    fn is_anonymous(&self) -> bool {
        self.id.is_none() && self.name.is_none()
    }
}

/// Per-response accumulator. Feed it every fragment in arrival order.
#[derive(Debug, Default)]
pub struct ToolCallAssembler {
    /// Keyed by vendor index, so a huge index costs one entry.
    slots: BTreeMap<usize, Slot>,
    slots_by_id: HashMap<String, usize>,
    last_slot: Option<usize>,
}

impl ToolCallAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply_fragments<'a, I>(&mut self, fragments: I)
    where
        I: IntoIterator<Item = &'a ToolCallFragment>,
    {
        for fragment in fragments {
            self.apply(fragment);
        }
    }

    pub fn apply(&mut self, fragment: &ToolCallFragment) {
        let chunk = fragment.arguments_text();
        let slot_index = self.resolve_slot(fragment, chunk.as_deref());
        self.last_slot = Some(slot_index);

        if let Some(id) = &fragment.id {
            self.slots_by_id.insert(id.clone(), slot_index);
        }

        let slot = self.slots.entry(slot_index).or_default();
        if let Some(id) = &fragment.id {
            slot.id = Some(id.clone());
        }
        if let Some(kind) = &fragment.kind {
            slot.kind = Some(kind.clone());
        }
        // Last write wins: vendors send the full name, usually once
        if let Some(name) = &fragment.function_name {
            slot.name = Some(name.clone());
        }
        if let Some(chunk) = chunk {
            slot.arguments.push_str(&chunk);
        }
    }

    /// Current best reconstruction, empty slots omitted.
    pub fn to_list(&self) -> Vec<AssembledToolCall> {
        self.slots
            .values()
            .filter(|slot| !slot.is_empty())
            .map(|slot| AssembledToolCall {
                id: slot.id.clone(),
                kind: slot
                    .kind
                    .clone()
                    .unwrap_or_else(|| DEFAULT_CALL_KIND.to_string()),
                function: FunctionCall {
                    name: slot.name.clone().unwrap_or_default(),
                    arguments: slot.arguments.clone(),
                },
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.values().all(Slot::is_empty)
    }

    fn resolve_slot(&self, fragment: &ToolCallFragment, chunk: Option<&str>) -> usize {
        // 1. Explicit index
        if let Some(index) = fragment.index {
            return index;
        }

        // 2. An id seen before
        if let Some(slot) = fragment
            .id
            .as_ref()
            .and_then(|id| self.slots_by_id.get(id))
        {
            return *slot;
        }

        let previous = self
            .last_slot
            .and_then(|last| Some((last, self.slots.get(&last)?)));
        if let (Some((last, previous)), Some(chunk)) = (previous, chunk) {
            // 3. Bare argument continuation of the previous slot. A slot bound
            //    to an id only grows through its index or its id.
            let bare_fragment = fragment.id.is_none() && fragment.function_name.is_none();
            if (bare_fragment && previous.id.is_none()) || previous.is_anonymous() {
                return last;
            }

            // 4. Same function name repeated mid-call without an id. Can merge
            //    two quick calls to the same function if the first still looks
            //    incomplete when the second starts.
            let repeats_name = previous.id.is_none()
                && previous.name.is_some()
                && previous.name == fragment.function_name;
            if repeats_name
                && !is_complete_json_object(chunk)
                && !is_complete_json_object(&previous.arguments)
            {
                return last;
            }
        }

        // 5. New slot at the next free position
        self.next_free_slot()
    }

    fn next_free_slot(&self) -> usize {
        match self.slots.last_key_value() {
            None => 0,
            Some((&last, _)) => last.checked_add(1).unwrap_or_else(|| {
                (0..usize::MAX)
                    .find(|key| !self.slots.contains_key(key))
                    .unwrap_or(last)
            }),
        }
    }
}

fn is_complete_json_object(text: &str) -> bool {
    matches!(serde_json::from_str::<Value>(text), Ok(Value::Object(_)))
}
