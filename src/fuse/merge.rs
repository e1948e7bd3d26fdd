//! Three-way file merging
//!
//! Line-level merge of two descendants against their common ancestor.
//! Edits that touch disjoint regions of the base combine automatically;
//! overlapping edits are reported as conflicts and never auto-resolved.

use std::ops::Range;

use similar::{DiffTag, TextDiff};

/// Result of merging one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
	Clean(Vec<u8>),
	Conflict,
}

/// Merge raw file contents. Non-UTF-8 content cannot be merged line-wise;
/// it only resolves when one side left the file alone.
pub fn merge_bytes(base: &[u8], ours: &[u8], theirs: &[u8]) -> MergeOutcome {
	if ours == theirs {
		return MergeOutcome::Clean(ours.to_vec());
	}
	if base == ours {
		return MergeOutcome::Clean(theirs.to_vec());
	}
	if base == theirs {
		return MergeOutcome::Clean(ours.to_vec());
	}

	match (
		std::str::from_utf8(base),
		std::str::from_utf8(ours),
		std::str::from_utf8(theirs),
	) {
		(Ok(base), Ok(ours), Ok(theirs)) => merge_text(base, ours, theirs),
		_ => MergeOutcome::Conflict,
	}
}

/// One side's rewrite of a base region
#[derive(Debug, Clone, PartialEq, Eq)]
struct Edit {
	base: Range<usize>,
	lines: Vec<String>,
}

fn side_edits(base: &str, side: &str) -> Vec<Edit> {
	let diff = TextDiff::from_lines(base, side);
	let new_lines = diff.new_slices();
	let mut edits = Vec::new();
	for op in diff.ops() {
		if op.tag() == DiffTag::Equal {
			continue;
		}
		edits.push(Edit {
			base: op.old_range(),
			lines: new_lines[op.new_range()]
				.iter()
				.map(|s| s.to_string())
				.collect(),
		});
	}
	edits
}

/// Two edits collide when their base regions overlap, or when both insert
/// at the same point with different content.
fn collides(a: &Edit, b: &Edit) -> bool {
	if a == b {
		return false;
	}
	let (a_range, b_range) = (&a.base, &b.base);
	if a_range.is_empty() && b_range.is_empty() {
		return a_range.start == b_range.start;
	}
	if a_range.is_empty() {
		return b_range.start < a_range.start && a_range.start < b_range.end;
	}
	if b_range.is_empty() {
		return a_range.start < b_range.start && b_range.start < a_range.end;
	}
	a_range.start < b_range.end && b_range.start < a_range.end
}

pub fn merge_text(base: &str, ours: &str, theirs: &str) -> MergeOutcome {
	let our_edits = side_edits(base, ours);
	let their_edits = side_edits(base, theirs);

	for a in &our_edits {
		for b in &their_edits {
			if collides(a, b) {
				return MergeOutcome::Conflict;
			}
		}
	}

	// Disjoint: splice both edit sets over the base, identical edits once.
	let mut edits: Vec<Edit> = our_edits;
	for edit in their_edits {
		if !edits.contains(&edit) {
			edits.push(edit);
		}
	}
	edits.sort_by_key(|e| (e.base.start, e.base.end));

	let base_diff = TextDiff::from_lines(base, base);
	let base_lines = base_diff.old_slices();
	let mut merged = String::new();
	let mut cursor = 0usize;
	for edit in &edits {
		for line in &base_lines[cursor..edit.base.start] {
			merged.push_str(line);
		}
		for line in &edit.lines {
			merged.push_str(line);
		}
		cursor = edit.base.end;
	}
	for line in &base_lines[cursor..] {
		merged.push_str(line);
	}

	MergeOutcome::Clean(merged.into_bytes())
}
