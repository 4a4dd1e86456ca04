//! Identity newtypes and value objects shared across the crate.

use std::sync::atomic::{AtomicU64, Ordering};

use ropey::Rope;

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_REQUESTER_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of an editable text unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u64);

impl BufferId {
	/// Generates a new unique buffer ID.
	pub fn next() -> Self {
		Self(NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed))
	}
}

/// Token identifying one external holder of a tracker.
///
/// Holders are counted per token, so the same token may request a buffer
/// several times and must release it as many times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequesterId(pub u64);

impl RequesterId {
	/// Generates a new unique requester token.
	pub fn next() -> Self {
		Self(NEXT_REQUESTER_ID.fetch_add(1, Ordering::Relaxed))
	}
}

/// Named partition of a tracker's diff ranges (partial-commit grouping).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChangeGroupId(pub String);

impl ChangeGroupId {
	pub fn new(id: impl Into<String>) -> Self {
		Self(id.into())
	}
}

impl From<&str> for ChangeGroupId {
	fn from(id: &str) -> Self {
		Self(id.to_owned())
	}
}

/// One changed region: half-open line ranges on the baseline (side 1) and
/// current (side 2) text, assigned to exactly one change group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffRange {
	pub start1: u32,
	pub end1: u32,
	pub start2: u32,
	pub end2: u32,
	pub group: ChangeGroupId,
}

/// Baseline identity used for staleness checks. Value-comparable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentInfo {
	pub revision: String,
	pub charset: String,
}

/// Loaded baseline payload.
#[derive(Debug, Clone)]
pub struct BaselineContent {
	pub text: Rope,
}

/// Failures surfaced by individual trackers. Callers log and continue;
/// a misbehaving tracker never aborts a lifecycle loop.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
	#[error("tracker already released")]
	Released,
	#[error("tracker backend failure: {0}")]
	Backend(String),
}

/// True when `ranges` reference more than one distinct change group.
pub(crate) fn is_partial(ranges: &[DiffRange]) -> bool {
	let mut first: Option<&ChangeGroupId> = None;
	for range in ranges {
		match first {
			None => first = Some(&range.group),
			Some(seen) if *seen != range.group => return true,
			Some(_) => {}
		}
	}
	false
}

#[cfg(test)]
mod tests {
	use super::*;

	fn range(group: &str) -> DiffRange {
		DiffRange {
			start1: 0,
			end1: 1,
			start2: 0,
			end2: 1,
			group: group.into(),
		}
	}

	#[test]
	fn partial_requires_two_distinct_groups() {
		assert!(!is_partial(&[]));
		assert!(!is_partial(&[range("a")]));
		assert!(!is_partial(&[range("a"), range("a")]));
		assert!(is_partial(&[range("a"), range("b")]));
	}
}
