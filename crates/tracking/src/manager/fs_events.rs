//! File-system event handling for tracked files.

use std::path::Path;

use super::TrackerManager;
use crate::types::BufferId;

/// File-system changes the host forwards to the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsEventKind {
	Deleted,
	Renamed,
	Moved,
	PropertyChanged,
}

impl TrackerManager {
	/// Routes one file-system event.
	///
	/// Deletion releases the bound tracker unconditionally. Rename and move
	/// re-key the association under the new path without touching tracker
	/// state. Property changes re-run provider selection with a refresh.
	pub fn on_file_system_event(&self, kind: FsEventKind, file: &Path, new_file: Option<&Path>) {
		match kind {
			FsEventKind::Deleted => self.on_file_deleted(file),
			FsEventKind::Renamed | FsEventKind::Moved => self.on_file_renamed(file, new_file),
			FsEventKind::PropertyChanged => {
				if let Some(buffer) = self.buffer_bound_to(file) {
					self.switch_tracker(file, buffer, true);
				}
			}
		}
	}

	fn on_file_deleted(&self, file: &Path) {
		let released = {
			let mut guard = self.shared.state.lock();
			let state = &mut *guard;
			if state.disposed {
				return;
			}
			state.pending_restore.remove(file);
			let buffer = state
				.entries
				.iter()
				.find(|(_, entry)| entry.file == file)
				.map(|(buffer, _)| *buffer);
			buffer.map(|buffer| (buffer, state.entries.remove(&buffer)))
		};
		if let Some((buffer, entry)) = released {
			self.finalize_release(buffer, entry);
		}
	}

	fn on_file_renamed(&self, file: &Path, new_file: Option<&Path>) {
		let Some(new_file) = new_file else {
			tracing::warn!(file = %file.display(), "rename event without a new path");
			return;
		};
		let mut guard = self.shared.state.lock();
		let state = &mut *guard;
		if state.disposed {
			return;
		}
		if let Some(entry) = state.entries.values_mut().find(|entry| entry.file == file) {
			entry.file = new_file.to_owned();
			tracing::debug!(
				from = %file.display(),
				to = %new_file.display(),
				"tracker re-registered under new path"
			);
		}
		if let Some(mut parked) = state.pending_restore.remove(file) {
			parked.path = new_file.to_owned();
			state.pending_restore.insert(new_file.to_owned(), parked);
		}
	}

	fn buffer_bound_to(&self, file: &Path) -> Option<BufferId> {
		let guard = self.shared.state.lock();
		guard
			.entries
			.iter()
			.find(|(_, entry)| entry.file == file)
			.map(|(buffer, _)| *buffer)
	}
}
