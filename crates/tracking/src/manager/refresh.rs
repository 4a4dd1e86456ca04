//! Background baseline refresh: the loader backend and result application.

use std::fmt;
use std::sync::{Arc, Weak};

use gutter_loader::{LoadStatus, LoaderBackend};

use super::{ManagerShared, SlotState, TrackerManager};
use crate::provider::ContentLoader;
use crate::types::{BaselineContent, BufferId, ContentInfo, DiffRange};

/// One queued refresh. Equality is buffer identity alone, so the queue holds
/// at most one request per buffer.
pub(crate) struct RefreshRequest {
	pub(crate) buffer: BufferId,
	pub(crate) loader: Arc<dyn ContentLoader>,
}

impl Clone for RefreshRequest {
	fn clone(&self) -> Self {
		Self {
			buffer: self.buffer,
			loader: Arc::clone(&self.loader),
		}
	}
}

impl PartialEq for RefreshRequest {
	fn eq(&self, other: &Self) -> bool {
		self.buffer == other.buffer
	}
}

impl fmt::Debug for RefreshRequest {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RefreshRequest").field("buffer", &self.buffer).finish()
	}
}

pub(crate) struct RefreshData {
	pub(crate) info: ContentInfo,
	pub(crate) content: BaselineContent,
}

/// Bridges the load queue to the manager. Holds only a weak reference so a
/// dropped manager turns in-flight work into cancellations.
pub(crate) struct RefreshBackend {
	pub(crate) manager: Weak<ManagerShared>,
}

impl LoaderBackend for RefreshBackend {
	type Request = RefreshRequest;
	type Data = RefreshData;

	/// Runs on the background worker; the manager lock is taken only for the
	/// initial entry snapshot, never across the actual load.
	fn load_request(&self, request: &RefreshRequest) -> LoadStatus<RefreshData> {
		let Some(shared) = self.manager.upgrade() else {
			return LoadStatus::Canceled;
		};
		let buffer = request.buffer;
		let (file, old_info) = {
			let guard = shared.state.lock();
			match guard.entries.get(&buffer) {
				Some(entry) => (entry.file.clone(), entry.content_info.clone()),
				None => return LoadStatus::Canceled,
			}
		};
		let Some(info) = request.loader.content_info(&file) else {
			tracing::debug!(?buffer, file = %file.display(), "baseline not currently loadable");
			return LoadStatus::Error;
		};
		if !request.loader.should_be_updated(old_info.as_ref(), &info) {
			return LoadStatus::Canceled;
		}
		match request.loader.load_content(&file, &info) {
			Some(content) => LoadStatus::Success(RefreshData { info, content }),
			None => {
				tracing::debug!(?buffer, file = %file.display(), "baseline load failed");
				LoadStatus::Error
			}
		}
	}

	fn handle_result(&self, request: RefreshRequest, status: LoadStatus<RefreshData>) {
		let Some(shared) = self.manager.upgrade() else {
			return;
		};
		TrackerManager::from_shared(shared).apply_refresh_result(request, status);
	}
}

impl TrackerManager {
	/// Applies one refresh result on the serialized control flow.
	///
	/// Results are re-validated before use: the entry must still exist, its
	/// provider's loader must still be the requesting one, and the loaded
	/// info must still be wanted. Anything stale is discarded with cancel
	/// semantics; release during an in-flight load is therefore safe without
	/// interrupting the load itself.
	pub(crate) fn apply_refresh_result(&self, request: RefreshRequest, status: LoadStatus<RefreshData>) {
		let buffer = request.buffer;
		let released = {
			let mut guard = self.shared.state.lock();
			let state = &mut *guard;
			if state.disposed {
				return;
			}
			let Some(entry) = state.entries.get_mut(&buffer) else {
				return;
			};
			match status {
				LoadStatus::Canceled => {
					entry.slot = SlotState::Ready;
					None
				}
				LoadStatus::Error => {
					request.loader.handle_loading_error(entry.tracker.as_mut());
					entry.slot = SlotState::Ready;
					None
				}
				LoadStatus::Success(data) => {
					let current = self
						.shared
						.providers
						.get(entry.provider)
						.and_then(|provider| provider.content_loader());
					let provider_matches =
						current.is_some_and(|loader| Arc::ptr_eq(&loader, &request.loader));
					if !provider_matches {
						tracing::debug!(?buffer, "provider changed mid-flight, discarding result");
						return;
					}
					if !request.loader.should_be_updated(entry.content_info.as_ref(), &data.info) {
						entry.slot = SlotState::Ready;
						return;
					}
					entry.content_info = Some(data.info);
					request.loader.set_loaded_content(entry.tracker.as_mut(), data.content);
					entry.slot = SlotState::Ready;

					if let Some(parked) = state.pending_restore.remove(&entry.file) {
						let ranges: Vec<DiffRange> = parked.ranges.iter().map(Into::into).collect();
						let applied = entry.tracker.apply_state(ranges);
						tracing::debug!(?buffer, applied, "deferred partial state delivered after refresh");
					}

					self.check_release_locked(state, buffer)
				}
			}
		};
		self.finalize_release(buffer, released);
	}
}
