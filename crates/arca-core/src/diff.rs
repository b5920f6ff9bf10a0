//! Line diff engine.
//!
//! Computes a line-level edit script between two texts with a longest common
//! subsequence table. Inputs longer than a line ceiling skip the table and
//! degrade to a whole-block replacement.

/// Line ceiling above which the exact diff is skipped.
pub const MAX_DIFF_LINES: usize = 400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Context,
    Add,
    Del,
}

/// One line of an edit script. Line numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DiffOp {
    pub kind: OpKind,
    pub text: String,
    pub old_line: Option<usize>,
    pub new_line: Option<usize>,
}

impl DiffOp {
    fn context(text: &str, old_line: usize, new_line: usize) -> Self {
        Self {
            kind: OpKind::Context,
            text: text.to_string(),
            old_line: Some(old_line),
            new_line: Some(new_line),
        }
    }

    fn del(text: &str, old_line: usize) -> Self {
        Self {
            kind: OpKind::Del,
            text: text.to_string(),
            old_line: Some(old_line),
            new_line: None,
        }
    }

    fn add(text: &str, new_line: usize) -> Self {
        Self {
            kind: OpKind::Add,
            text: text.to_string(),
            old_line: None,
            new_line: Some(new_line),
        }
    }

    pub fn is_change(&self) -> bool {
        self.kind != OpKind::Context
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EditScript {
    pub ops: Vec<DiffOp>,
    /// Set when the inputs exceeded the line ceiling and the script is a
    /// whole-block replacement.
    pub too_large: bool,
}

impl EditScript {
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn has_changes(&self) -> bool {
        self.ops.iter().any(DiffOp::is_change)
    }

    /// (added, removed) line counts.
    pub fn stats(&self) -> (usize, usize) {
        self.ops.iter().fold((0, 0), |(added, removed), op| match op.kind {
            OpKind::Add => (added + 1, removed),
            OpKind::Del => (added, removed + 1),
            OpKind::Context => (added, removed),
        })
    }

    /// Lines of the `before` side, in order.
    pub fn old_lines(&self) -> Vec<&str> {
        self.ops
            .iter()
            .filter(|op| op.kind != OpKind::Add)
            .map(|op| op.text.as_str())
            .collect()
    }

    /// Lines of the `after` side, in order.
    pub fn new_lines(&self) -> Vec<&str> {
        self.ops
            .iter()
            .filter(|op| op.kind != OpKind::Del)
            .map(|op| op.text.as_str())
            .collect()
    }
}

/// Split text into lines, accepting `\n`, `\r\n` and lone `\r` terminators.
/// Empty text has no lines. A trailing terminator ends with an empty line,
/// so `"a\n"` and `"a"` differ.
pub fn split_lines(text: &str) -> Vec<&str> {
    if text.is_empty() {
        return Vec::new();
    }

    let mut lines = Vec::new();
    let bytes = text.as_bytes();
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\n' => {
                lines.push(&text[start..i]);
                start = i + 1;
            }
            b'\r' => {
                lines.push(&text[start..i]);
                if bytes.get(i + 1) == Some(&b'\n') {
                    i += 1;
                }
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    lines.push(&text[start..]);
    lines
}

pub fn diff_lines(before: &str, after: &str) -> EditScript {
    diff_lines_with_limit(before, after, MAX_DIFF_LINES)
}

pub fn diff_lines_with_limit(before: &str, after: &str, max_lines: usize) -> EditScript {
    let old_lines = split_lines(before);
    let new_lines = split_lines(after);

    if old_lines.len().max(new_lines.len()) > max_lines {
        log::debug!(
            "[arca:diff] {}/{} lines exceeds ceiling {max_lines}, using whole-block replace",
            old_lines.len(),
            new_lines.len()
        );
        return whole_block(&old_lines, &new_lines);
    }

    EditScript {
        ops: build_ops(&old_lines, &new_lines),
        too_large: false,
    }
}

fn whole_block(old_lines: &[&str], new_lines: &[&str]) -> EditScript {
    let mut ops = Vec::with_capacity(old_lines.len() + new_lines.len());
    ops.extend(
        old_lines
            .iter()
            .enumerate()
            .map(|(i, line)| DiffOp::del(line, i + 1)),
    );
    ops.extend(
        new_lines
            .iter()
            .enumerate()
            .map(|(i, line)| DiffOp::add(line, i + 1)),
    );
    EditScript {
        ops,
        too_large: true,
    }
}

fn build_ops(old_lines: &[&str], new_lines: &[&str]) -> Vec<DiffOp> {
    let lcs = build_lcs_table(old_lines, new_lines);
    let mut ops = Vec::with_capacity(old_lines.len() + new_lines.len());

    let (mut i, mut j) = (0usize, 0usize);
    while i < old_lines.len() && j < new_lines.len() {
        if old_lines[i] == new_lines[j] {
            ops.push(DiffOp::context(old_lines[i], i + 1, j + 1));
            i += 1;
            j += 1;
        } else if lcs[i + 1][j] >= lcs[i][j + 1] {
            // Ties go to the deletion so removals group ahead of insertions
            ops.push(DiffOp::del(old_lines[i], i + 1));
            i += 1;
        } else {
            ops.push(DiffOp::add(new_lines[j], j + 1));
            j += 1;
        }
    }

    ops.extend(old_lines[i..].iter().enumerate().map(|(k, line)| DiffOp::del(line, i + k + 1)));
    ops.extend(new_lines[j..].iter().enumerate().map(|(k, line)| DiffOp::add(line, j + k + 1)));
    ops
}

/// `table[i][j]` is the LCS length of `old[i..]` and `new[j..]`.
fn build_lcs_table(old_lines: &[&str], new_lines: &[&str]) -> Vec<Vec<usize>> {
    let mut table = vec![vec![0usize; new_lines.len() + 1]; old_lines.len() + 1];

    for i in (0..old_lines.len()).rev() {
        for j in (0..new_lines.len()).rev() {
            table[i][j] = if old_lines[i] == new_lines[j] {
                table[i + 1][j + 1] + 1
            } else {
                table[i + 1][j].max(table[i][j + 1])
            };
        }
    }

    table
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(script: &EditScript) -> Vec<OpKind> {
        script.ops.iter().map(|op| op.kind).collect()
    }

    #[test]
    fn split_lines_handles_every_newline_convention() {
        assert_eq!(split_lines("a\nb\r\nc\rd"), vec!["a", "b", "c", "d"]);
        assert_eq!(split_lines("a\n"), vec!["a", ""]);
        assert_eq!(split_lines("a\n\nb"), vec!["a", "", "b"]);
        assert_eq!(split_lines("\n"), vec!["", ""]);
        assert_eq!(split_lines("a\rb"), vec!["a", "b"]);
        assert!(split_lines("").is_empty());
    }

    #[test]
    fn empty_and_equal_inputs() {
        assert!(diff_lines("", "").is_empty());

        let script = diff_lines("a\nb", "a\nb");
        assert_eq!(kinds(&script), vec![OpKind::Context, OpKind::Context]);
        assert!(!script.has_changes());
    }

    #[test]
    fn total_replacement_deletes_then_adds() {
        let script = diff_lines("a\nb", "c\nd");
        assert_eq!(
            kinds(&script),
            vec![OpKind::Del, OpKind::Del, OpKind::Add, OpKind::Add]
        );
        assert_eq!(script.stats(), (2, 2));
    }

    #[test]
    fn single_line_change_pairs_del_before_add() {
        let script = diff_lines("one\ntwo\nthree", "one\nTWO\nthree");
        assert_eq!(
            kinds(&script),
            vec![OpKind::Context, OpKind::Del, OpKind::Add, OpKind::Context]
        );
        assert_eq!(script.ops[1].old_line, Some(2));
        assert_eq!(script.ops[2].new_line, Some(2));
        assert_eq!(script.ops[3].old_line, Some(3));
        assert_eq!(script.ops[3].new_line, Some(3));
    }

    #[test]
    fn line_numbers_track_each_side() {
        let script = diff_lines("a\nc", "a\nb\nc");
        assert_eq!(
            kinds(&script),
            vec![OpKind::Context, OpKind::Add, OpKind::Context]
        );
        assert_eq!(script.ops[2].old_line, Some(2));
        assert_eq!(script.ops[2].new_line, Some(3));
    }

    #[test]
    fn script_reconstructs_both_sides() {
        let before = "name: Aria\nrole: bard\nmood: calm\nhome: coast";
        let after = "name: Aria\nrole: knight\nhome: coast\nsteed: grey";
        let script = diff_lines(before, after);
        assert_eq!(script.old_lines(), split_lines(before));
        assert_eq!(script.new_lines(), split_lines(after));
    }

    #[test]
    fn round_trip_over_edge_inputs() {
        let long: String = (0..399).map(|i| format!("line {i}\n")).collect();
        let longer: String = (0..400).map(|i| format!("line {i}\n")).collect();
        let pairs = [
            ("", ""),
            ("", "\n"),
            ("\n", "\n\n"),
            ("a\n", "a"),
            ("a\r\n", "a\n\n"),
            ("a\rb", "b\ra"),
            ("one\ntwo", "three\nfour\n"),
            (long.as_str(), longer.as_str()),
            (longer.as_str(), "tail"),
        ];

        for (before, after) in pairs {
            let script = diff_lines(before, after);
            assert_eq!(script.old_lines(), split_lines(before), "{before:?}");
            assert_eq!(script.new_lines(), split_lines(after), "{after:?}");
            let normalized = |text: &str| text.replace("\r\n", "\n").replace('\r', "\n");
            assert_eq!(script.old_lines().join("\n"), normalized(before));
            assert_eq!(script.new_lines().join("\n"), normalized(after));
            assert_eq!(script.has_changes(), normalized(before) != normalized(after));
        }
    }

    #[test]
    fn trailing_newline_is_a_change() {
        let script = diff_lines("Aria is a bard.\n", "Aria is a bard.");
        assert!(script.has_changes());
        assert_eq!(script.stats(), (0, 1));
        assert_eq!(script.old_lines(), vec!["Aria is a bard.", ""]);
        assert_eq!(script.new_lines(), vec!["Aria is a bard."]);
    }

    #[test]
    fn crlf_and_lf_inputs_compare_equal() {
        let script = diff_lines("a\r\nb\r\n", "a\nb\n");
        assert!(!script.has_changes());
    }

    #[test]
    fn oversized_input_degrades_to_whole_block() {
        let before = (0..401).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        let after = before.replace("line 200", "changed");
        let script = diff_lines(&before, &after);

        assert!(script.too_large);
        assert_eq!(script.stats(), (401, 401));
        assert!(script.ops[..401].iter().all(|op| op.kind == OpKind::Del));
        assert!(script.ops[401..].iter().all(|op| op.kind == OpKind::Add));
    }

    #[test]
    fn ceiling_is_inclusive() {
        let before = (0..400).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        let after = before.replace("line 200", "changed");
        let script = diff_lines(&before, &after);

        assert!(!script.too_large);
        assert_eq!(script.stats(), (1, 1));
    }

    #[test]
    fn custom_limit() {
        let script = diff_lines_with_limit("a\nb\nc", "a\nb\nd", 2);
        assert!(script.too_large);
        assert_eq!(script.stats(), (3, 3));
    }
}
