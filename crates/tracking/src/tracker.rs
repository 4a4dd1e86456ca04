//! Tracker objects: per-buffer diff state created by providers.

use ropey::Rope;

use crate::types::{BufferId, DiffRange, TrackerError, is_partial};

/// Per-buffer diff state between current content and a baseline.
///
/// Trackers are owned by the lifecycle manager and only ever mutated under
/// its lock. The diff computation itself lives in the host's
/// [`crate::provider::ContentLoader`]; trackers store what it computes.
pub trait ChangeTracker: Send {
	fn buffer(&self) -> BufferId;

	/// Which provider family created this tracker. Providers use it to
	/// recognize their own trackers across re-selection.
	fn kind(&self) -> &'static str;

	/// Current ranges with their change-group assignment.
	fn ranges(&self) -> Vec<DiffRange>;

	/// Replaces the range set. Called by loaders after recomputing the diff.
	fn set_ranges(&mut self, ranges: Vec<DiffRange>);

	/// Installs a freshly loaded baseline.
	fn set_baseline(&mut self, text: Rope);

	fn baseline_text(&self) -> Option<Rope>;

	/// Drops the baseline, leaving the tracker installed but baseline-less.
	fn drop_baseline(&mut self);

	/// Suspends range recomputation.
	fn freeze(&mut self) -> Result<(), TrackerError>;

	/// Resumes range recomputation, applying any state deferred while frozen.
	fn unfreeze(&mut self) -> Result<(), TrackerError>;

	fn is_frozen(&self) -> bool;

	/// Best-effort reinstall of a persisted range→group assignment.
	///
	/// Returns false when the ranges no longer align with the current
	/// content; that is not an error.
	fn apply_state(&mut self, ranges: Vec<DiffRange>) -> bool;

	/// True while a state application is parked (e.g. behind a freeze).
	fn has_pending_state(&self) -> bool {
		false
	}

	/// True when ranges span more than one change group.
	fn is_partial(&self) -> bool {
		is_partial(&self.ranges())
	}

	/// Terminal teardown. The manager calls this exactly once, after the
	/// tracker has left the registry.
	fn release(&mut self);
}

/// Default line-granular tracker.
///
/// Stores ranges and baseline verbatim; while frozen, state applications are
/// parked and replayed on unfreeze.
pub struct LineTracker {
	buffer: BufferId,
	kind: &'static str,
	ranges: Vec<DiffRange>,
	baseline: Option<Rope>,
	frozen: bool,
	pending: Option<Vec<DiffRange>>,
	released: bool,
}

impl LineTracker {
	pub fn new(buffer: BufferId) -> Self {
		Self::with_kind(buffer, "line")
	}

	/// A tracker reporting a provider-specific kind.
	pub fn with_kind(buffer: BufferId, kind: &'static str) -> Self {
		Self {
			buffer,
			kind,
			ranges: Vec::new(),
			baseline: None,
			frozen: false,
			pending: None,
			released: false,
		}
	}

	fn install_ranges(&mut self, ranges: Vec<DiffRange>) -> bool {
		if !ranges_aligned(&ranges) {
			tracing::debug!(buffer = ?self.buffer, "persisted ranges no longer align, skipping");
			return false;
		}
		self.ranges = ranges;
		true
	}
}

/// Ranges must be well-formed and strictly ascending on both sides.
fn ranges_aligned(ranges: &[DiffRange]) -> bool {
	let mut prev: Option<&DiffRange> = None;
	for range in ranges {
		if range.start1 > range.end1 || range.start2 > range.end2 {
			return false;
		}
		if let Some(prev) = prev
			&& (range.start1 < prev.end1 || range.start2 < prev.end2)
		{
			return false;
		}
		prev = Some(range);
	}
	true
}

impl ChangeTracker for LineTracker {
	fn buffer(&self) -> BufferId {
		self.buffer
	}

	fn kind(&self) -> &'static str {
		self.kind
	}

	fn ranges(&self) -> Vec<DiffRange> {
		self.ranges.clone()
	}

	fn set_ranges(&mut self, ranges: Vec<DiffRange>) {
		self.ranges = ranges;
	}

	fn set_baseline(&mut self, text: Rope) {
		self.baseline = Some(text);
	}

	fn baseline_text(&self) -> Option<Rope> {
		self.baseline.clone()
	}

	fn drop_baseline(&mut self) {
		self.baseline = None;
	}

	fn freeze(&mut self) -> Result<(), TrackerError> {
		if self.released {
			return Err(TrackerError::Released);
		}
		self.frozen = true;
		Ok(())
	}

	fn unfreeze(&mut self) -> Result<(), TrackerError> {
		if self.released {
			return Err(TrackerError::Released);
		}
		self.frozen = false;
		if let Some(pending) = self.pending.take() {
			self.install_ranges(pending);
		}
		Ok(())
	}

	fn is_frozen(&self) -> bool {
		self.frozen
	}

	fn apply_state(&mut self, ranges: Vec<DiffRange>) -> bool {
		if self.frozen {
			self.pending = Some(ranges);
			return true;
		}
		self.install_ranges(ranges)
	}

	fn has_pending_state(&self) -> bool {
		self.pending.is_some()
	}

	fn release(&mut self) {
		self.released = true;
		self.ranges.clear();
		self.baseline = None;
		self.pending = None;
	}
}
