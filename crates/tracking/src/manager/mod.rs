//! Tracker lifecycle: registry, forced holders, provider selection, refresh.
//!
//! One [`TrackerManager`] owns every live tracker for a workspace. All public
//! operations serialize on a single internal mutex; background baseline loads
//! run through a [`SingleThreadLoader`] and re-enter through
//! [`TrackerManager::apply_refresh_result`] under the same mutex. The lock is
//! never held across `load_request` or while registering drain callbacks.
//!
//! Lock ordering is strictly manager → loader.

mod freeze;
mod fs_events;
mod refresh;


use std::path::{Path, PathBuf};
use std::sync::Arc;

use gutter_loader::SingleThreadLoader;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

pub use fs_events::FsEventKind;
use refresh::{RefreshBackend, RefreshRequest};

use crate::partial::PartialState;
use crate::provider::{TrackerProvider, WorkspaceHost};
use crate::tracker::ChangeTracker;
use crate::types::{BufferId, ContentInfo, RequesterId};

/// Manager-wide options.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrackerManagerConfig {
	/// Record full before/after texts in captured partial state.
	pub capture_texts: bool,
}

/// Per-slot load progress. A slot is `Loading` from installation (or a
/// scheduled refresh) until its first result is applied or discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlotState {
	Loading,
	Ready,
}

pub(crate) struct TrackerEntry {
	pub(crate) tracker: Box<dyn ChangeTracker>,
	pub(crate) file: PathBuf,
	pub(crate) provider: usize,
	pub(crate) content_info: Option<ContentInfo>,
	pub(crate) slot: SlotState,
}

#[derive(Default)]
pub(crate) struct ManagerState {
	pub(crate) entries: FxHashMap<BufferId, TrackerEntry>,
	pub(crate) holders: FxHashMap<BufferId, FxHashMap<RequesterId, u32>>,
	pub(crate) freeze_count: u32,
	pub(crate) pending_restore: FxHashMap<PathBuf, PartialState>,
	pub(crate) disposed: bool,
}

pub(crate) struct ManagerShared {
	pub(crate) host: Arc<dyn WorkspaceHost>,
	pub(crate) providers: Vec<Arc<dyn TrackerProvider>>,
	pub(crate) config: TrackerManagerConfig,
	pub(crate) loader: SingleThreadLoader<RefreshBackend>,
	pub(crate) state: Mutex<ManagerState>,
}

/// Owner of all live change trackers for one workspace.
pub struct TrackerManager {
	pub(crate) shared: Arc<ManagerShared>,
}

impl Clone for TrackerManager {
	fn clone(&self) -> Self {
		Self {
			shared: Arc::clone(&self.shared),
		}
	}
}

impl TrackerManager {
	/// Builds a manager over an ordered provider list. Provider priority is
	/// declaration order: the first whose `is_tracked_file` matches wins.
	pub fn new(
		host: Arc<dyn WorkspaceHost>,
		providers: Vec<Arc<dyn TrackerProvider>>,
		config: TrackerManagerConfig,
	) -> Self {
		let shared = Arc::new_cyclic(|weak| ManagerShared {
			host,
			providers,
			config,
			loader: SingleThreadLoader::new(Arc::new(RefreshBackend {
				manager: weak.clone(),
			})),
			state: Mutex::new(ManagerState::default()),
		});
		Self { shared }
	}

	pub(crate) fn from_shared(shared: Arc<ManagerShared>) -> Self {
		Self { shared }
	}

	/// Registers `requester` as a forced holder of `buffer`'s tracker,
	/// installing one on first demand.
	pub fn request_tracker(&self, buffer: BufferId, requester: RequesterId) {
		{
			let mut guard = self.shared.state.lock();
			let state = &mut *guard;
			if state.disposed {
				tracing::error!(?buffer, ?requester, "request_tracker after dispose");
				return;
			}
			*state
				.holders
				.entry(buffer)
				.or_default()
				.entry(requester)
				.or_insert(0) += 1;
			if state.entries.contains_key(&buffer) {
				return;
			}
		}
		let Some(file) = self.shared.host.file_of(buffer) else {
			tracing::debug!(?buffer, "buffer has no backing file, tracker not installed");
			return;
		};
		self.install_tracker(buffer, file);
	}

	/// Drops one hold. Unknown tokens are a logged no-op; when the last hold
	/// goes away the tracker is released if eligible.
	pub fn release_tracker(&self, buffer: BufferId, requester: RequesterId) {
		let released = {
			let mut guard = self.shared.state.lock();
			let state = &mut *guard;
			if state.disposed {
				tracing::error!(?buffer, ?requester, "release_tracker after dispose");
				return;
			}
			let Some(tokens) = state.holders.get_mut(&buffer) else {
				tracing::warn!(?buffer, ?requester, "released a holder that was never acquired");
				return;
			};
			let Some(count) = tokens.get_mut(&requester) else {
				tracing::warn!(?buffer, ?requester, "released a holder that was never acquired");
				return;
			};
			*count -= 1;
			if *count == 0 {
				tokens.remove(&requester);
			}
			if tokens.is_empty() {
				state.holders.remove(&buffer);
				self.check_release_locked(state, buffer)
			} else {
				None
			}
		};
		self.finalize_release(buffer, released);
	}

	pub fn has_tracker(&self, buffer: BufferId) -> bool {
		self.shared.state.lock().entries.contains_key(&buffer)
	}

	/// Read access to a live tracker. The registry itself is never exposed.
	pub fn with_tracker<R>(&self, buffer: BufferId, f: impl FnOnce(&dyn ChangeTracker) -> R) -> Option<R> {
		let guard = self.shared.state.lock();
		guard.entries.get(&buffer).map(|entry| f(entry.tracker.as_ref()))
	}

	/// Mutating access to a live tracker, for host-side loaders.
	pub fn update_tracker<R>(&self, buffer: BufferId, f: impl FnOnce(&mut dyn ChangeTracker) -> R) -> Option<R> {
		let mut guard = self.shared.state.lock();
		guard
			.entries
			.get_mut(&buffer)
			.map(|entry| f(entry.tracker.as_mut()))
	}

	/// Buffers with an installed tracker.
	pub fn tracked_buffers(&self) -> Vec<BufferId> {
		self.shared.state.lock().entries.keys().copied().collect()
	}

	/// True while an installed slot has not applied a baseline result yet.
	pub fn is_loading(&self, buffer: BufferId) -> bool {
		self.shared
			.state
			.lock()
			.entries
			.get(&buffer)
			.is_some_and(|entry| entry.slot == SlotState::Loading)
	}

	/// True if a refresh for `buffer` is queued or in flight.
	pub fn has_pending_refresh(&self, buffer: BufferId) -> bool {
		self.shared.loader.has_request(|request| request.buffer == buffer)
	}

	/// Re-evaluates which provider should own `buffer`.
	///
	/// A still-matching provider keeps its tracker (optionally refreshed);
	/// a mismatch releases the old tracker unconditionally and installs the
	/// newly selected provider's one.
	pub fn switch_tracker(&self, file: &Path, buffer: BufferId, refresh_existing: bool) {
		enum Next {
			Nothing,
			Refresh,
			Install,
		}

		let selected = self.select_provider(file);
		let (released, next) = {
			let mut guard = self.shared.state.lock();
			let state = &mut *guard;
			if state.disposed {
				return;
			}
			match state.entries.get(&buffer) {
				Some(entry) => {
					let still_mine = selected == Some(entry.provider)
						&& self.shared.providers[entry.provider].is_my_tracker(entry.tracker.as_ref());
					if still_mine {
						let next = if refresh_existing { Next::Refresh } else { Next::Nothing };
						(None, next)
					} else {
						// Eligibility is bypassed: the old provider no longer
						// owns this file, its tracker always goes.
						let released = state.entries.remove(&buffer);
						let next = if selected.is_some() { Next::Install } else { Next::Nothing };
						(released, next)
					}
				}
				None => {
					let next = if selected.is_some() { Next::Install } else { Next::Nothing };
					(None, next)
				}
			}
		};
		self.finalize_release(buffer, released);
		match next {
			Next::Nothing => {}
			Next::Refresh => self.schedule_refresh(buffer),
			Next::Install => self.install_tracker(buffer, file.to_owned()),
		}
	}

	/// Enqueues a baseline refresh for an installed slot whose provider has a
	/// loader. Idempotent while a refresh for the buffer is already pending.
	pub fn schedule_refresh(&self, buffer: BufferId) {
		let provider = {
			let guard = self.shared.state.lock();
			if guard.disposed {
				return;
			}
			let Some(entry) = guard.entries.get(&buffer) else {
				return;
			};
			entry.provider
		};
		let Some(loader) = self.shared.providers.get(provider).and_then(|p| p.content_loader()) else {
			return;
		};
		if let Some(entry) = self.shared.state.lock().entries.get_mut(&buffer) {
			entry.slot = SlotState::Loading;
		}
		self.shared.loader.schedule(RefreshRequest { buffer, loader });
	}

	/// Shuts the manager down, clearing all state unconditionally.
	///
	/// Residual forced holders are diagnosed per holder. Deferred loader
	/// callbacks run synchronously before surviving trackers are released.
	pub fn dispose(&self) {
		let entries = {
			let mut guard = self.shared.state.lock();
			let state = &mut *guard;
			if state.disposed {
				return;
			}
			state.disposed = true;
			for (buffer, tokens) in state.holders.drain() {
				for (requester, count) in tokens {
					tracing::warn!(?buffer, ?requester, count, "forced holder still present at dispose");
				}
			}
			state.pending_restore.clear();
			state.freeze_count = 0;
			state.entries.drain().collect::<Vec<_>>()
		};
		self.shared.loader.dispose();
		for (buffer, entry) in entries {
			self.finalize_release(buffer, Some(entry));
		}
	}

	fn select_provider(&self, file: &Path) -> Option<usize> {
		self.shared
			.providers
			.iter()
			.position(|provider| provider.is_tracked_file(file))
	}

	fn install_tracker(&self, buffer: BufferId, file: PathBuf) {
		let Some(index) = self.select_provider(&file) else {
			tracing::debug!(?buffer, file = %file.display(), "no provider claims file");
			return;
		};
		let provider = &self.shared.providers[index];
		let Some(mut tracker) = provider.create_tracker(buffer, &file) else {
			tracing::debug!(?buffer, file = %file.display(), "provider declined to create tracker");
			return;
		};
		let has_loader = provider.content_loader().is_some();
		{
			let mut guard = self.shared.state.lock();
			let state = &mut *guard;
			if state.disposed {
				tracker.release();
				return;
			}
			if state.entries.contains_key(&buffer) {
				tracing::warn!(?buffer, "tracker already registered, ignoring duplicate install");
				tracker.release();
				return;
			}
			if state.freeze_count > 0
				&& let Err(err) = tracker.freeze()
			{
				tracing::warn!(?buffer, error = %err, "tracker freeze failed");
			}
			state.entries.insert(
				buffer,
				TrackerEntry {
					tracker,
					file: file.clone(),
					provider: index,
					content_info: None,
					slot: if has_loader { SlotState::Loading } else { SlotState::Ready },
				},
			);
		}
		self.shared.host.on_tracker_installed(buffer);
		tracing::debug!(?buffer, file = %file.display(), provider = index, "tracker installed");
		if has_loader {
			self.schedule_refresh(buffer);
		}
	}

	/// Removes the entry when every release condition holds: no forced
	/// holders, no cross-group ranges, and no pending refresh that still has
	/// partial state or a parked restoration to deliver.
	pub(crate) fn check_release_locked(&self, state: &mut ManagerState, buffer: BufferId) -> Option<TrackerEntry> {
		let entry = state.entries.get(&buffer)?;
		if state.holders.get(&buffer).is_some_and(|tokens| !tokens.is_empty()) {
			return None;
		}
		if entry.tracker.is_partial() {
			return None;
		}
		let refresh_pending = self.shared.loader.has_request(|request| request.buffer == buffer);
		if refresh_pending
			&& (entry.tracker.has_pending_state() || state.pending_restore.contains_key(&entry.file))
		{
			return None;
		}
		state.entries.remove(&buffer)
	}

	pub(crate) fn finalize_release(&self, buffer: BufferId, entry: Option<TrackerEntry>) {
		let Some(mut entry) = entry else {
			return;
		};
		self.shared.host.on_tracker_released(buffer);
		entry.tracker.release();
		tracing::debug!(?buffer, file = %entry.file.display(), "tracker released");
	}
}
