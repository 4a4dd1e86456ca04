//! Nested freeze/unfreeze coordination for bulk external operations.
//!
//! The counter is edge-triggered: trackers see `freeze()` exactly once on the
//! 0→1 transition and `unfreeze()` exactly once on 1→0, so nested calls are
//! idempotent in effect. A tracker that fails either call is logged and
//! skipped; the loop always visits every live tracker.

use super::TrackerManager;

impl TrackerManager {
	/// Enters a bulk operation, suspending recomputation on the first call.
	pub fn on_freeze(&self) {
		let mut guard = self.shared.state.lock();
		let state = &mut *guard;
		state.freeze_count += 1;
		if state.freeze_count > 1 {
			return;
		}
		for (buffer, entry) in state.entries.iter_mut() {
			if let Err(err) = entry.tracker.freeze() {
				tracing::warn!(?buffer, error = %err, "tracker freeze failed");
			}
		}
	}

	/// Leaves a bulk operation, resuming recomputation on the last call.
	/// Unbalanced calls are a logged no-op.
	pub fn on_unfreeze(&self) {
		let mut guard = self.shared.state.lock();
		let state = &mut *guard;
		if state.freeze_count == 0 {
			tracing::warn!("unfreeze without matching freeze");
			return;
		}
		state.freeze_count -= 1;
		if state.freeze_count > 0 {
			return;
		}
		for (buffer, entry) in state.entries.iter_mut() {
			if let Err(err) = entry.tracker.unfreeze() {
				tracing::warn!(?buffer, error = %err, "tracker unfreeze failed");
			}
		}
	}

	/// Current freeze nesting depth.
	pub fn freeze_depth(&self) -> u32 {
		self.shared.state.lock().freeze_count
	}
}
