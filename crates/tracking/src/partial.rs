//! Capture and restore of partial (multi-group) range assignments.
//!
//! Only genuinely partial trackers are persisted: a tracker whose ranges all
//! sit in one change group can be rebuilt from a plain refresh. Restoration
//! is best-effort and reports per file; it never raises.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::manager::TrackerManager;
use crate::types::{DiffRange, is_partial};

/// One persisted range with its change-group assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedRange {
	pub start1: u32,
	pub end1: u32,
	pub start2: u32,
	pub end2: u32,
	pub change_group_id: String,
}

impl From<&DiffRange> for PersistedRange {
	fn from(range: &DiffRange) -> Self {
		Self {
			start1: range.start1,
			end1: range.end1,
			start2: range.start2,
			end2: range.end2,
			change_group_id: range.group.0.clone(),
		}
	}
}

impl From<&PersistedRange> for DiffRange {
	fn from(range: &PersistedRange) -> Self {
		Self {
			start1: range.start1,
			end1: range.end1,
			start2: range.start2,
			end2: range.end2,
			group: range.change_group_id.as_str().into(),
		}
	}
}

/// Snapshot of one partial tracker, keyed by file path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialState {
	pub path: PathBuf,
	pub ranges: Vec<PersistedRange>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub vcs_text: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub current_text: Option<String>,
}

/// Per-file restoration result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
	/// Ranges installed on a live tracker.
	Applied,
	/// A refresh is in flight; application parked until it completes.
	Deferred,
	/// No live buffer on the file; the state was dropped.
	SkippedNoBuffer,
	/// Ranges no longer align with current content.
	Failed,
}

impl RestoreOutcome {
	pub fn succeeded(self) -> bool {
		matches!(self, Self::Applied | Self::Deferred)
	}
}

#[derive(Debug, Clone)]
pub struct RestoreReport {
	pub path: PathBuf,
	pub outcome: RestoreOutcome,
}

impl TrackerManager {
	/// Snapshots every live partial tracker.
	///
	/// Full texts are recorded only when the manager was configured with
	/// `capture_texts`.
	pub fn capture_state(&self) -> Vec<PartialState> {
		let snapshots = {
			let guard = self.shared.state.lock();
			guard
				.entries
				.iter()
				.filter_map(|(buffer, entry)| {
					let ranges = entry.tracker.ranges();
					if !is_partial(&ranges) {
						return None;
					}
					Some((*buffer, entry.file.clone(), ranges, entry.tracker.baseline_text()))
				})
				.collect::<Vec<_>>()
		};

		let capture_texts = self.shared.config.capture_texts;
		snapshots
			.into_iter()
			.map(|(buffer, path, ranges, baseline)| PartialState {
				path,
				ranges: ranges.iter().map(PersistedRange::from).collect(),
				vcs_text: capture_texts
					.then(|| baseline.map(|text| text.to_string()))
					.flatten(),
				current_text: capture_texts
					.then(|| self.shared.host.buffer_text(buffer).map(|text| text.to_string()))
					.flatten(),
			})
			.collect()
	}

	/// Reinstalls captured partial states, best-effort.
	///
	/// Each state resolves its file to a live buffer (absent files are
	/// skipped), reuses or installs a tracker via provider re-selection, and
	/// applies immediately unless a refresh is pending, in which case the
	/// application is parked until that refresh delivers. One drain callback
	/// sweeps whatever is still parked when the load queue empties.
	pub fn restore_state(&self, states: Vec<PartialState>) -> Vec<RestoreReport> {
		let mut reports = Vec::with_capacity(states.len());
		let mut any_deferred = false;

		for state in states {
			let path = state.path.clone();
			let Some(buffer) = self.shared.host.buffer_for_file(&path) else {
				tracing::debug!(path = %path.display(), "no live buffer for persisted state, skipping");
				reports.push(RestoreReport {
					path,
					outcome: RestoreOutcome::SkippedNoBuffer,
				});
				continue;
			};

			self.switch_tracker(&path, buffer, false);

			let outcome = if self.has_pending_refresh(buffer) {
				let mut guard = self.shared.state.lock();
				if guard.disposed {
					return reports;
				}
				guard.pending_restore.insert(path.clone(), state);
				any_deferred = true;
				RestoreOutcome::Deferred
			} else {
				let ranges: Vec<DiffRange> = state.ranges.iter().map(Into::into).collect();
				match self.update_tracker(buffer, |tracker| tracker.apply_state(ranges)) {
					Some(true) => RestoreOutcome::Applied,
					Some(false) => RestoreOutcome::Failed,
					None => RestoreOutcome::SkippedNoBuffer,
				}
			};
			reports.push(RestoreReport { path, outcome });
		}

		if any_deferred {
			let weak = std::sync::Arc::downgrade(&self.shared);
			self.shared.loader.add_after_update(move || {
				let Some(shared) = weak.upgrade() else {
					return;
				};
				TrackerManager::from_shared(shared).drain_pending_restorations();
			});
		}
		reports
	}

	/// Sweeps restorations still parked after the load queue drained.
	///
	/// The usual delivery point is refresh completion; this catches states
	/// whose refresh was canceled or discarded.
	fn drain_pending_restorations(&self) {
		let parked = {
			let mut guard = self.shared.state.lock();
			if guard.disposed {
				return;
			}
			guard.pending_restore.drain().collect::<Vec<_>>()
		};
		for (path, state) in parked {
			let buffer = {
				let guard = self.shared.state.lock();
				guard
					.entries
					.iter()
					.find(|(_, entry)| entry.file == path)
					.map(|(buffer, _)| *buffer)
			};
			let Some(buffer) = buffer else {
				tracing::debug!(path = %path.display(), "parked state has no tracker left, dropping");
				continue;
			};
			let ranges: Vec<DiffRange> = state.ranges.iter().map(Into::into).collect();
			let applied = self
				.update_tracker(buffer, |tracker| tracker.apply_state(ranges))
				.unwrap_or(false);
			tracing::debug!(path = %path.display(), applied, "parked partial state swept on drain");
		}
	}
}

/// Serializes states to the persisted JSON list form.
pub fn encode_states(states: &[PartialState]) -> String {
	serde_json::to_string(states).unwrap_or_else(|err| {
		tracing::error!(error = %err, "failed to serialize partial states");
		"[]".to_owned()
	})
}

/// Parses the persisted JSON list form. Malformed entries are skipped with a
/// warning; a malformed payload yields an empty list. Never fatal.
pub fn decode_states(json: &str) -> Vec<PartialState> {
	let values: Vec<serde_json::Value> = match serde_json::from_str(json) {
		Ok(values) => values,
		Err(err) => {
			tracing::warn!(error = %err, "malformed partial-state payload");
			return Vec::new();
		}
	};
	values
		.into_iter()
		.filter_map(|value| match serde_json::from_value::<PartialState>(value) {
			Ok(state) => Some(state),
			Err(err) => {
				tracing::warn!(error = %err, "skipping malformed partial-state entry");
				None
			}
		})
		.collect()
}
