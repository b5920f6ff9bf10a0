//! arca-core: Review and undo logic for the card-editing assistant.
//!
//! Line diffs of proposed field changes, their unified and side-by-side row
//! models, and the ledger that applies and reverts accepted turns against the
//! live document. Exposed as a library for integration testing.

pub mod cache;
pub mod chat;
pub mod config;
pub mod diff;
pub mod document;
pub mod item;
pub mod ledger;
pub mod render;

pub use cache::RowCache;
pub use diff::{diff_lines, split_lines, DiffOp, EditScript, OpKind, MAX_DIFF_LINES};
pub use document::{Document, DocumentError, FieldPath, JsonDocument};
pub use item::{CreatedAncestor, DiffItem, Operation, ResourceKind};
pub use ledger::{AppliedEntry, RejectOutcome, UndoLedger};
pub use render::{DiffOptions, DiffView, FoldOptions, Folded};
