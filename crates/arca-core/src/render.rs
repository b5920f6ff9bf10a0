//! Row models for reviewing an edit script.
//!
//! Two layouts are produced from the same script: a single-column unified view
//! and a two-column split view where adjacent deletions and insertions are
//! paired into change rows. Long unchanged stretches fold into placeholders
//! that keep the hidden rows, so expanding a fold is lossless.

use std::fmt::Write as _;

use crate::diff::{diff_lines_with_limit, DiffOp, EditScript, OpKind, MAX_DIFF_LINES};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FoldOptions {
    /// Context runs longer than this are folded.
    pub threshold: usize,
    /// Rows kept visible on each side of a fold.
    pub context: usize,
}

impl Default for FoldOptions {
    fn default() -> Self {
        Self {
            threshold: 5,
            context: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffOptions {
    pub max_lines: usize,
    pub fold: FoldOptions,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            max_lines: MAX_DIFF_LINES,
            fold: FoldOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Folded<T> {
    Row(T),
    Fold { hidden: Vec<T> },
}

impl<T> Folded<T> {
    pub fn hidden_count(&self) -> usize {
        match self {
            Folded::Row(_) => 0,
            Folded::Fold { hidden } => hidden.len(),
        }
    }

    pub fn is_fold(&self) -> bool {
        matches!(self, Folded::Fold { .. })
    }
}

/// Collapse context runs longer than `options.threshold`, keeping
/// `options.context` rows visible on each side.
pub fn fold_rows<T>(
    rows: Vec<T>,
    is_context: impl Fn(&T) -> bool,
    options: FoldOptions,
) -> Vec<Folded<T>> {
    let mut out = Vec::with_capacity(rows.len());
    let mut run: Vec<T> = Vec::new();

    for row in rows {
        if is_context(&row) {
            run.push(row);
            continue;
        }
        flush_run(&mut out, std::mem::take(&mut run), options);
        out.push(Folded::Row(row));
    }
    flush_run(&mut out, run, options);
    out
}

fn flush_run<T>(out: &mut Vec<Folded<T>>, mut run: Vec<T>, options: FoldOptions) {
    let keep = options.context * 2;
    if run.len() <= options.threshold || run.len() <= keep {
        out.extend(run.into_iter().map(Folded::Row));
        return;
    }

    let tail = run.split_off(run.len() - options.context);
    let hidden = run.split_off(options.context);
    out.extend(run.into_iter().map(Folded::Row));
    out.push(Folded::Fold { hidden });
    out.extend(tail.into_iter().map(Folded::Row));
}

/// Flatten folded rows back into the full row list.
pub fn expand<T: Clone>(rows: &[Folded<T>]) -> Vec<T> {
    let mut out = Vec::new();
    for row in rows {
        match row {
            Folded::Row(row) => out.push(row.clone()),
            Folded::Fold { hidden } => out.extend(hidden.iter().cloned()),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Unified layout
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnifiedRow {
    pub kind: OpKind,
    pub text: String,
    pub old_line: Option<usize>,
    pub new_line: Option<usize>,
}

impl From<&DiffOp> for UnifiedRow {
    fn from(op: &DiffOp) -> Self {
        Self {
            kind: op.kind,
            text: op.text.clone(),
            old_line: op.old_line,
            new_line: op.new_line,
        }
    }
}

pub fn unified_rows(script: &EditScript) -> Vec<UnifiedRow> {
    script.ops.iter().map(UnifiedRow::from).collect()
}

// ---------------------------------------------------------------------------
// Split layout
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitKind {
    Context,
    Change,
    Add,
    Del,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitCell {
    pub line: usize,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitRow {
    pub kind: SplitKind,
    pub left: Option<SplitCell>,
    pub right: Option<SplitCell>,
    /// Present on change rows only.
    pub inline: Option<InlineSpans>,
}

pub fn split_rows(script: &EditScript) -> Vec<SplitRow> {
    let mut rows = Vec::with_capacity(script.ops.len());
    let mut ops = script.ops.iter().peekable();

    while let Some(op) = ops.next() {
        if op.kind == OpKind::Context {
            rows.push(SplitRow {
                kind: SplitKind::Context,
                left: cell(op.old_line, &op.text),
                right: cell(op.new_line, &op.text),
                inline: None,
            });
            continue;
        }

        let mut dels = Vec::new();
        let mut adds = Vec::new();
        let mut next = Some(op);
        while let Some(op) = next {
            if op.kind == OpKind::Del {
                dels.push(op);
            } else {
                adds.push(op);
            }
            next = ops.next_if(|op| op.is_change());
        }

        for i in 0..dels.len().max(adds.len()) {
            rows.push(match (dels.get(i), adds.get(i)) {
                (Some(del), Some(add)) => SplitRow {
                    kind: SplitKind::Change,
                    left: cell(del.old_line, &del.text),
                    right: cell(add.new_line, &add.text),
                    inline: Some(inline_spans(&del.text, &add.text)),
                },
                (Some(del), None) => SplitRow {
                    kind: SplitKind::Del,
                    left: cell(del.old_line, &del.text),
                    right: None,
                    inline: None,
                },
                (None, Some(add)) => SplitRow {
                    kind: SplitKind::Add,
                    left: None,
                    right: cell(add.new_line, &add.text),
                    inline: None,
                },
                (None, None) => continue,
            });
        }
    }

    rows
}

fn cell(line: Option<usize>, text: &str) -> Option<SplitCell> {
    line.map(|line| SplitCell {
        line,
        text: text.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Intra-line highlighting
// ---------------------------------------------------------------------------

/// A changed line cut into a shared prefix, the differing middles, and a
/// shared suffix. Cuts fall on char boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InlineSpans {
    pub prefix: String,
    pub old_middle: String,
    pub new_middle: String,
    pub suffix: String,
}

pub fn inline_spans(old: &str, new: &str) -> InlineSpans {
    let old_chars: Vec<char> = old.chars().collect();
    let new_chars: Vec<char> = new.chars().collect();

    let prefix = old_chars
        .iter()
        .zip(&new_chars)
        .take_while(|(a, b)| a == b)
        .count();
    let max_suffix = old_chars.len().min(new_chars.len()) - prefix;
    let suffix = old_chars
        .iter()
        .rev()
        .zip(new_chars.iter().rev())
        .take(max_suffix)
        .take_while(|(a, b)| a == b)
        .count();

    InlineSpans {
        prefix: old_chars[..prefix].iter().collect(),
        old_middle: old_chars[prefix..old_chars.len() - suffix].iter().collect(),
        new_middle: new_chars[prefix..new_chars.len() - suffix].iter().collect(),
        suffix: old_chars[old_chars.len() - suffix..].iter().collect(),
    }
}

// ---------------------------------------------------------------------------
// DiffView
// ---------------------------------------------------------------------------

/// Everything a review panel needs for one before/after pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffView {
    pub script: EditScript,
    pub unified: Vec<Folded<UnifiedRow>>,
    pub split: Vec<Folded<SplitRow>>,
}

impl DiffView {
    pub fn build(before: &str, after: &str, options: &DiffOptions) -> Self {
        let script = diff_lines_with_limit(before, after, options.max_lines);
        let unified = fold_rows(
            unified_rows(&script),
            |row| row.kind == OpKind::Context,
            options.fold,
        );
        let split = fold_rows(
            split_rows(&script),
            |row| row.kind == SplitKind::Context,
            options.fold,
        );
        Self {
            script,
            unified,
            split,
        }
    }

    /// True when the inputs were too large for an exact diff.
    pub fn too_large(&self) -> bool {
        self.script.too_large
    }

    pub fn format_unified(&self) -> String {
        let mut out = String::new();
        if self.too_large() {
            out.push_str("(large diff, shown as whole-block replace)\n");
        }
        for row in &self.unified {
            match row {
                Folded::Row(row) => {
                    let marker = match row.kind {
                        OpKind::Context => ' ',
                        OpKind::Add => '+',
                        OpKind::Del => '-',
                    };
                    let _ = writeln!(
                        out,
                        "{:>4} {:>4} {marker} {}",
                        line_label(row.old_line),
                        line_label(row.new_line),
                        row.text
                    );
                }
                Folded::Fold { hidden } => {
                    let _ = writeln!(out, "          ... {} unchanged lines ...", hidden.len());
                }
            }
        }
        out
    }

    pub fn format_split(&self, column_width: usize) -> String {
        let mut out = String::new();
        if self.too_large() {
            out.push_str("(large diff, shown as whole-block replace)\n");
        }
        for row in &self.split {
            match row {
                Folded::Row(row) => {
                    let marker = match row.kind {
                        SplitKind::Context => ' ',
                        SplitKind::Change => '~',
                        SplitKind::Add => '+',
                        SplitKind::Del => '-',
                    };
                    let left = format_cell(row.left.as_ref(), row.inline.as_ref(), true, column_width);
                    let right =
                        format_cell(row.right.as_ref(), row.inline.as_ref(), false, column_width);
                    let _ = writeln!(out, "{left} {marker} {right}");
                }
                Folded::Fold { hidden } => {
                    let _ = writeln!(out, "... {} unchanged lines ...", hidden.len());
                }
            }
        }
        out
    }
}

fn line_label(line: Option<usize>) -> String {
    line.map(|n| n.to_string()).unwrap_or_default()
}

fn format_cell(
    cell: Option<&SplitCell>,
    inline: Option<&InlineSpans>,
    old_side: bool,
    width: usize,
) -> String {
    let Some(cell) = cell else {
        return " ".repeat(width + 5);
    };
    let text = match inline {
        Some(spans) => {
            let middle = if old_side {
                &spans.old_middle
            } else {
                &spans.new_middle
            };
            format!("{}[{}]{}", spans.prefix, middle, spans.suffix)
        }
        None => cell.text.clone(),
    };
    let clipped: String = text.chars().take(width).collect();
    let pad = width.saturating_sub(clipped.chars().count());
    format!("{:>4} {clipped}{}", cell.line, " ".repeat(pad))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::diff_lines;

    fn numbered(range: std::ops::Range<usize>) -> String {
        range.map(|i| format!("line {i}\n")).collect()
    }

    #[test]
    fn fold_keeps_context_on_both_sides() {
        let rows: Vec<i32> = vec![0, 0, 0, 0, 0, 0, 0, 0, 1];
        let folded = fold_rows(rows.clone(), |r| *r == 0, FoldOptions::default());

        assert_eq!(folded.len(), 6);
        assert_eq!(folded[0], Folded::Row(0));
        assert_eq!(folded[1], Folded::Row(0));
        assert_eq!(folded[2].hidden_count(), 4);
        assert_eq!(folded[5], Folded::Row(1));
        assert_eq!(expand(&folded), rows);
    }

    #[test]
    fn short_runs_are_not_folded() {
        let rows = vec![0, 0, 0, 0, 0, 1, 0];
        let folded = fold_rows(rows, |r| *r == 0, FoldOptions::default());
        assert!(folded.iter().all(|row| !row.is_fold()));
    }

    #[test]
    fn fold_never_hides_changes() {
        let before = numbered(0..30);
        let after = before.replace("line 10\n", "line ten\n").replace("line 25\n", "");
        let view = DiffView::build(&before, &after, &DiffOptions::default());

        for row in &view.unified {
            if let Folded::Fold { hidden } = row {
                assert!(hidden.iter().all(|r| r.kind == OpKind::Context));
            }
        }
        let expanded = expand(&view.unified);
        assert_eq!(expanded, unified_rows(&view.script));
        assert!(view.unified.iter().filter(|row| row.is_fold()).count() >= 2);
    }

    #[test]
    fn split_pairs_replacements_into_change_rows() {
        let script = diff_lines("a\nold one\nold two\nz", "a\nnew one\nz");
        let rows = split_rows(&script);
        let kinds: Vec<SplitKind> = rows.iter().map(|r| r.kind).collect();

        assert_eq!(
            kinds,
            vec![
                SplitKind::Context,
                SplitKind::Change,
                SplitKind::Del,
                SplitKind::Context
            ]
        );
        let change = &rows[1];
        assert_eq!(change.left.as_ref().map(|c| c.line), Some(2));
        assert_eq!(change.right.as_ref().map(|c| c.text.as_str()), Some("new one"));
        assert_eq!(rows[2].right, None);
        assert_eq!(rows[3].left.as_ref().map(|c| c.line), Some(4));
        assert_eq!(rows[3].right.as_ref().map(|c| c.line), Some(3));
    }

    #[test]
    fn split_pure_insertion() {
        let rows = split_rows(&diff_lines("a", "a\nb\nc"));
        let kinds: Vec<SplitKind> = rows.iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec![SplitKind::Context, SplitKind::Add, SplitKind::Add]);
    }

    #[test]
    fn inline_spans_isolate_the_edited_word() {
        let spans = inline_spans("She is brave and kind", "She is bold and kind");
        assert_eq!(spans.prefix, "She is b");
        assert_eq!(spans.old_middle, "rave");
        assert_eq!(spans.new_middle, "old");
        assert_eq!(spans.suffix, " and kind");
    }

    #[test]
    fn inline_spans_do_not_overlap() {
        let spans = inline_spans("aaa", "aaaa");
        assert_eq!(spans.prefix, "aaa");
        assert_eq!(spans.old_middle, "");
        assert_eq!(spans.new_middle, "a");
        assert_eq!(spans.suffix, "");

        let spans = inline_spans("héllo", "hallo");
        assert_eq!(spans.old_middle, "é");
        assert_eq!(spans.new_middle, "a");
    }

    #[test]
    fn large_view_reports_fallback() {
        let before = numbered(0..500);
        let view = DiffView::build(&before, "short", &DiffOptions::default());
        assert!(view.too_large());
        assert!(view.format_unified().starts_with("(large diff"));
    }

    #[test]
    fn formats_unified_and_split() {
        let view = DiffView::build("keep\nbrave", "keep\nbold", &DiffOptions::default());
        let unified = view.format_unified();
        assert!(unified.contains("- brave"));
        assert!(unified.contains("+ bold"));

        let split = view.format_split(20);
        assert!(split.contains("b[rave]"));
        assert!(split.contains("b[old]"));
    }
}
