//! Bounded history of accepted model turns.
//!
//! Entries are kept in arrival order. Only the newest entry can be undone,
//! either whole or one field change at a time; older entries remain viewable
//! until evicted.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::config::LedgerConfig;
use crate::document::{Document, DocumentError};
use crate::item::{DiffItem, ResourceKind};

pub const RECENT_ONLY: &str = "only the most recent change can be undone";
pub const FIELD_ONLY: &str = "only field changes can be rejected individually";
pub const NOT_FOUND: &str = "change not found";

// ---------------------------------------------------------------------------
// AppliedEntry
// ---------------------------------------------------------------------------

/// One accepted model turn and the field changes it made.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedEntry {
    pub id: String,
    pub items: Vec<DiffItem>,
    #[serde(default)]
    pub user_message_id: Option<String>,
    #[serde(default)]
    pub assistant_message_id: Option<String>,
    #[serde(default)]
    pub summary: String,
}

impl AppliedEntry {
    pub fn new(id: impl Into<String>, items: Vec<DiffItem>) -> Self {
        Self {
            id: id.into(),
            items,
            user_message_id: None,
            assistant_message_id: None,
            summary: String::new(),
        }
    }

    pub fn with_messages(
        mut self,
        user_message_id: impl Into<String>,
        assistant_message_id: impl Into<String>,
    ) -> Self {
        self.user_message_id = Some(user_message_id.into());
        self.assistant_message_id = Some(assistant_message_id.into());
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn item(&self, key: &str) -> Option<&DiffItem> {
        self.items.iter().find(|item| item.key() == key)
    }
}

/// Result of rejecting a single change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectOutcome {
    pub ok: bool,
    pub message: Option<String>,
}

impl RejectOutcome {
    fn accepted() -> Self {
        Self {
            ok: true,
            message: None,
        }
    }

    fn refused(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: Some(message.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// UndoLedger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct UndoLedger {
    entries: VecDeque<AppliedEntry>,
    max_entries: usize,
    retry_window: usize,
}

impl Default for UndoLedger {
    fn default() -> Self {
        Self::from_config(&LedgerConfig::default())
    }
}

impl UndoLedger {
    pub fn new(max_entries: usize, retry_window: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            max_entries: max_entries.max(1),
            retry_window,
        }
    }

    pub fn from_config(config: &LedgerConfig) -> Self {
        Self::new(config.max_entries, config.retry_window)
    }

    /// Apply every item of `entry` to the document and record it. If any item
    /// fails, the items already written are reverted and the ledger is left
    /// untouched.
    pub fn apply_entry<D: Document + ?Sized>(
        &mut self,
        doc: &mut D,
        mut entry: AppliedEntry,
    ) -> Result<(), DocumentError> {
        for applied in 0..entry.items.len() {
            if let Err(e) = entry.items[applied].apply(doc) {
                log::warn!(
                    "[arca:ledger] entry {} failed at {}: {e}, rolling back",
                    entry.id,
                    entry.items[applied].path
                );
                for done in entry.items[..applied].iter().rev() {
                    if let Err(e) = done.revert(doc) {
                        log::warn!("[arca:ledger] rollback of {} failed: {e}", done.path);
                    }
                }
                return Err(e);
            }
        }
        self.record_entry(entry);
        Ok(())
    }

    /// Record an entry whose edits are already in the document.
    pub fn record_entry(&mut self, entry: AppliedEntry) {
        log::debug!(
            "[arca:ledger] recorded {} ({} changes)",
            entry.id,
            entry.items.len()
        );
        self.entries.push_back(entry);
        while self.entries.len() > self.max_entries {
            if let Some(evicted) = self.entries.pop_front() {
                log::debug!("[arca:ledger] evicted {}", evicted.id);
            }
        }
    }

    /// Revert the newest entry. Returns false, leaving everything as it was,
    /// when `entry_id` is not the newest entry or the document refuses a write.
    pub fn undo<D: Document + ?Sized>(&mut self, doc: &mut D, entry_id: &str) -> bool {
        let Some(latest) = self.entries.back_mut() else {
            return false;
        };
        if latest.id != entry_id {
            log::debug!("[arca:ledger] undo {entry_id} refused: {RECENT_ONLY}");
            return false;
        }

        let mut failed_at = None;
        for (reverted, item) in latest.items.iter().rev().enumerate() {
            if let Err(e) = item.revert(doc) {
                log::warn!("[arca:ledger] undo of {} failed at {}: {e}", latest.id, item.path);
                failed_at = Some(latest.items.len() - reverted);
                break;
            }
        }
        if let Some(start) = failed_at {
            for done in &mut latest.items[start..] {
                if let Err(e) = done.apply(doc) {
                    log::warn!("[arca:ledger] reapply of {} failed: {e}", done.path);
                }
            }
            return false;
        }

        self.entries.pop_back();
        log::debug!("[arca:ledger] undid {entry_id}");
        true
    }

    /// Revert one field change of the newest entry and drop it from the
    /// entry. The entry goes away with its last change.
    pub fn reject_item<D: Document + ?Sized>(
        &mut self,
        doc: &mut D,
        entry_id: &str,
        item_key: &str,
    ) -> RejectOutcome {
        let Some(latest) = self.entries.back_mut() else {
            return RejectOutcome::refused(RECENT_ONLY);
        };
        if latest.id != entry_id {
            return RejectOutcome::refused(RECENT_ONLY);
        }
        let Some(position) = latest.items.iter().position(|item| item.key() == item_key) else {
            return RejectOutcome::refused(NOT_FOUND);
        };
        if latest.items[position].resource != ResourceKind::Field {
            return RejectOutcome::refused(FIELD_ONLY);
        }

        if let Err(e) = latest.items[position].revert(doc) {
            log::warn!("[arca:ledger] reject of {item_key} failed: {e}");
            return RejectOutcome::refused(format!("could not revert change: {e}"));
        }

        latest.items.remove(position);
        if latest.items.is_empty() {
            self.entries.pop_back();
        }
        log::debug!("[arca:ledger] rejected {item_key} from {entry_id}");
        RejectOutcome::accepted()
    }

    /// Whether `entry_id` is among the newest `retry_window` entries.
    pub fn can_retry(&self, entry_id: &str) -> bool {
        self.entries
            .iter()
            .rev()
            .take(self.retry_window)
            .any(|entry| entry.id == entry_id)
    }

    pub fn entries(&self) -> impl Iterator<Item = &AppliedEntry> {
        self.entries.iter()
    }

    pub fn get(&self, entry_id: &str) -> Option<&AppliedEntry> {
        self.entries.iter().find(|entry| entry.id == entry_id)
    }

    pub fn latest(&self) -> Option<&AppliedEntry> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
