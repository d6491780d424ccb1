//! Line-based unified diff between two snapshots
//!
//! Each snapshot is rendered as sorted `key: value` lines and the two line
//! sequences are compared textually. A changed compound value shows up as a
//! whole-line replacement; no structural diffing happens here.

use std::cmp::{max, min};
use std::mem;

use crate::Snapshot;

/// Lines of unchanged context kept around each change
pub const CONTEXT_LINES: usize = 3;

/// Diff two snapshots into unified-diff lines.
///
/// Identical snapshots produce an empty result.
pub fn diff(before: &Snapshot, after: &Snapshot) -> Vec<String> {
    unified_diff(&before.render_lines(), &after.render_lines(), CONTEXT_LINES)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Equal,
    Delete,
    Insert,
    Replace,
}

/// A region of `a[a1..a2]` mapped onto `b[b1..b2]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Opcode {
    tag: Tag,
    a1: usize,
    a2: usize,
    b1: usize,
    b2: usize,
}

impl Opcode {
    fn new(tag: Tag, a1: usize, a2: usize, b1: usize, b2: usize) -> Self {
        Self { tag, a1, a2, b1, b2 }
    }
}

/// Produce unified-diff lines for two line sequences.
pub fn unified_diff(a: &[String], b: &[String], context: usize) -> Vec<String> {
    let mut out = Vec::new();

    for group in grouped_opcodes(opcodes(a, b), context) {
        let (first, last) = match (group.first(), group.last()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => continue,
        };

        if out.is_empty() {
            out.push("--- ".to_string());
            out.push("+++ ".to_string());
        }
        out.push(format!(
            "@@ -{} +{} @@",
            format_range(first.a1, last.a2),
            format_range(first.b1, last.b2)
        ));

        for op in group {
            if op.tag == Tag::Equal {
                out.extend(a[op.a1..op.a2].iter().map(|line| format!(" {}", line)));
                continue;
            }
            if matches!(op.tag, Tag::Replace | Tag::Delete) {
                out.extend(a[op.a1..op.a2].iter().map(|line| format!("-{}", line)));
            }
            if matches!(op.tag, Tag::Replace | Tag::Insert) {
                out.extend(b[op.b1..op.b2].iter().map(|line| format!("+{}", line)));
            }
        }
    }

    out
}

/// Align two sequences on a longest common subsequence and collapse the
/// alignment into equal / delete / insert / replace regions.
fn opcodes(a: &[String], b: &[String]) -> Vec<Opcode> {
    let (n, m) = (a.len(), b.len());

    // lcs[i][j] = length of the LCS of a[i..] and b[j..]
    let mut lcs = vec![vec![0usize; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i][j] = if a[i] == b[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                max(lcs[i + 1][j], lcs[i][j + 1])
            };
        }
    }

    let mut ops = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < n || j < m {
        let (i1, j1) = (i, j);
        if i < n && j < m && a[i] == b[j] {
            while i < n && j < m && a[i] == b[j] {
                i += 1;
                j += 1;
            }
            ops.push(Opcode::new(Tag::Equal, i1, i, j1, j));
            continue;
        }

        while i < n || j < m {
            if i < n && j < m && a[i] == b[j] {
                break;
            }
            if j >= m || (i < n && lcs[i + 1][j] >= lcs[i][j + 1]) {
                i += 1;
            } else {
                j += 1;
            }
        }
        let tag = match (i > i1, j > j1) {
            (true, true) => Tag::Replace,
            (true, false) => Tag::Delete,
            _ => Tag::Insert,
        };
        ops.push(Opcode::new(tag, i1, i, j1, j));
    }

    ops
}

/// Split opcodes into hunks, keeping `context` equal lines around changes.
fn grouped_opcodes(mut codes: Vec<Opcode>, context: usize) -> Vec<Vec<Opcode>> {
    if codes.is_empty() {
        codes.push(Opcode::new(Tag::Equal, 0, 1, 0, 1));
    }

    if let Some(first) = codes.first_mut() {
        if first.tag == Tag::Equal {
            first.a1 = max(first.a1, first.a2.saturating_sub(context));
            first.b1 = max(first.b1, first.b2.saturating_sub(context));
        }
    }
    if let Some(last) = codes.last_mut() {
        if last.tag == Tag::Equal {
            last.a2 = min(last.a2, last.a1 + context);
            last.b2 = min(last.b2, last.b1 + context);
        }
    }

    let mut groups = Vec::new();
    let mut group = Vec::new();
    for op in codes {
        let (mut a1, mut b1) = (op.a1, op.b1);
        if op.tag == Tag::Equal && op.a2 - a1 > context * 2 {
            group.push(Opcode::new(
                Tag::Equal,
                a1,
                min(op.a2, a1 + context),
                b1,
                min(op.b2, b1 + context),
            ));
            groups.push(mem::take(&mut group));
            a1 = max(a1, op.a2.saturating_sub(context));
            b1 = max(b1, op.b2.saturating_sub(context));
        }
        group.push(Opcode::new(op.tag, a1, op.a2, b1, op.b2));
    }

    let only_equal = group.len() == 1 && group[0].tag == Tag::Equal;
    if !group.is_empty() && !only_equal {
        groups.push(group);
    }
    groups
}

/// Format a hunk range the way unified diffs do (`start,len`, 1-based).
fn format_range(start: usize, stop: usize) -> String {
    let length = stop - start;
    let beginning = if length == 0 { start } else { start + 1 };
    if length == 1 {
        beginning.to_string()
    } else {
        format!("{},{}", beginning, length)
    }
}
