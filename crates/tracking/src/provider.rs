//! Collaborator contracts consumed by the lifecycle manager.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ropey::Rope;

use crate::tracker::ChangeTracker;
use crate::types::{BaselineContent, BufferId, ContentInfo};

/// Supplies baseline content for tracked files.
///
/// `load_content` may block and is only ever invoked on the background
/// worker; everything else runs on the serialized control flow. The two
/// tracker callbacks are invoked under the manager lock and must not call
/// back into the manager.
pub trait ContentLoader: Send + Sync {
	fn is_tracked_file(&self, file: &Path) -> bool;

	/// Baseline identity for staleness checks. `None` means "not currently
	/// loadable" and is not an error.
	fn content_info(&self, file: &Path) -> Option<ContentInfo>;

	/// Whether a reload is warranted. Must return true when `old` is `None`.
	fn should_be_updated(&self, old: Option<&ContentInfo>, new: &ContentInfo) -> bool {
		match old {
			None => true,
			Some(old) => old != new,
		}
	}

	/// Fetches baseline bytes. `None` signals a recoverable load failure.
	fn load_content(&self, file: &Path, info: &ContentInfo) -> Option<BaselineContent>;

	/// Applies a loaded baseline to the tracker, recomputing diff ranges.
	fn set_loaded_content(&self, tracker: &mut dyn ChangeTracker, content: BaselineContent);

	/// Fallback when loading fails irrecoverably.
	fn handle_loading_error(&self, tracker: &mut dyn ChangeTracker) {
		tracker.drop_baseline();
	}
}

/// Creates trackers for the files it claims.
///
/// Providers are consulted in declaration order; the first whose
/// `is_tracked_file` returns true owns the buffer.
pub trait TrackerProvider: Send + Sync {
	fn is_tracked_file(&self, file: &Path) -> bool;

	/// Whether this provider created the given tracker.
	fn is_my_tracker(&self, tracker: &dyn ChangeTracker) -> bool;

	fn create_tracker(&self, buffer: BufferId, file: &Path) -> Option<Box<dyn ChangeTracker>>;

	/// Loader driving background refresh, when the provider has one. A
	/// provider without a loader yields immediately ready, baseline-less
	/// trackers.
	fn content_loader(&self) -> Option<Arc<dyn ContentLoader>> {
		None
	}
}

/// Buffer/file identity seam supplied by the embedding workspace.
pub trait WorkspaceHost: Send + Sync {
	/// Backing file of a live buffer, if it has one.
	fn file_of(&self, buffer: BufferId) -> Option<PathBuf>;

	/// Live buffer currently open on the given file.
	fn buffer_for_file(&self, file: &Path) -> Option<BufferId>;

	/// Current buffer content, for snapshots that record full texts.
	fn buffer_text(&self, buffer: BufferId) -> Option<Rope>;

	/// Cross-cutting registration hook (e.g. commit integration).
	fn on_tracker_installed(&self, _buffer: BufferId) {}

	/// Counterpart of [`Self::on_tracker_installed`].
	fn on_tracker_released(&self, _buffer: BufferId) {}
}
