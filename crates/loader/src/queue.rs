use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Outcome of one background load.
#[derive(Debug)]
pub enum LoadStatus<T> {
	/// Load finished and produced data.
	Success(T),
	/// Load was abandoned (stale request, missing target). Not an error.
	Canceled,
	/// Load failed. Panics inside the load body are mapped here after logging.
	Error,
}

/// The two halves of a refresh: the blocking load and the serialized apply.
///
/// `load_request` runs on the blocking pool and may stall on I/O for an
/// arbitrary time. `handle_result` runs afterwards with no queue lock held;
/// backends serialize it against their own public operations (typically by
/// taking their own state lock), which makes result application part of the
/// same serialized control flow as the rest of the component.
pub trait LoaderBackend: Send + Sync + 'static {
	type Request: Clone + PartialEq + Send + fmt::Debug + 'static;
	type Data: Send + 'static;

	fn load_request(&self, request: &Self::Request) -> LoadStatus<Self::Data>;
	fn handle_result(&self, request: Self::Request, status: LoadStatus<Self::Data>);
}

struct LoaderState<R> {
	queue: VecDeque<R>,
	waiting: Vec<R>,
	worker: Option<JoinHandle<()>>,
	after_update: Vec<Box<dyn FnOnce() + Send>>,
	disposed: bool,
}

struct LoaderInner<B: LoaderBackend> {
	backend: Arc<B>,
	state: Mutex<LoaderState<B::Request>>,
}

/// Deduplicating FIFO load queue with exactly one worker task.
///
/// Requests execute strictly in submission order, one at a time. Scheduling a
/// request equal to one already queued or in flight is a no-op (first wins),
/// so any given key has at most one pending refresh.
pub struct SingleThreadLoader<B: LoaderBackend> {
	inner: Arc<LoaderInner<B>>,
}

impl<B: LoaderBackend> Clone for SingleThreadLoader<B> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<B: LoaderBackend> SingleThreadLoader<B> {
	pub fn new(backend: Arc<B>) -> Self {
		Self {
			inner: Arc::new(LoaderInner {
				backend,
				state: Mutex::new(LoaderState {
					queue: VecDeque::new(),
					waiting: Vec::new(),
					worker: None,
					after_update: Vec::new(),
					disposed: false,
				}),
			}),
		}
	}

	/// Enqueues a request unless an equal one is already queued or in flight.
	///
	/// Must be called from within a tokio runtime; the worker task is spawned
	/// lazily on first demand.
	pub fn schedule(&self, request: B::Request) {
		let mut state = self.inner.state.lock();
		if state.disposed {
			tracing::trace!(?request, "schedule after dispose ignored");
			return;
		}
		if state.queue.contains(&request) || state.waiting.contains(&request) {
			tracing::trace!(?request, "equal request already pending, deduplicated");
			return;
		}
		state.queue.push_back(request);
		if state.worker.is_none() {
			let inner = Arc::clone(&self.inner);
			state.worker = Some(tokio::spawn(run_worker(inner)));
		}
	}

	/// Runs `task` once the queue and waiting set are both empty.
	///
	/// Runs immediately (on the caller) when already drained or disposed;
	/// otherwise deferred until the worker finishes the last request.
	pub fn add_after_update(&self, task: impl FnOnce() + Send + 'static) {
		let immediate = {
			let mut state = self.inner.state.lock();
			if state.disposed || (state.queue.is_empty() && state.waiting.is_empty()) {
				Some(task)
			} else {
				state.after_update.push(Box::new(task));
				None
			}
		};
		if let Some(task) = immediate {
			task();
		}
	}

	/// True if any queued or in-flight request matches. Non-blocking.
	pub fn has_request(&self, mut predicate: impl FnMut(&B::Request) -> bool) -> bool {
		let state = self.inner.state.lock();
		state
			.queue
			.iter()
			.chain(state.waiting.iter())
			.any(|request| predicate(request))
	}

	/// Queued plus in-flight request count.
	pub fn request_count(&self) -> usize {
		let state = self.inner.state.lock();
		state.queue.len() + state.waiting.len()
	}

	/// Clears all pending work and flushes deferred drain callbacks.
	///
	/// Disposal counts as drain completion: every deferred after-update
	/// callback runs synchronously, exactly once, before this returns. An
	/// in-flight load is aborted at its next await point; its result is
	/// never delivered.
	pub fn dispose(&self) {
		let (worker, callbacks) = {
			let mut state = self.inner.state.lock();
			if state.disposed {
				return;
			}
			state.disposed = true;
			state.queue.clear();
			state.waiting.clear();
			(state.worker.take(), std::mem::take(&mut state.after_update))
		};
		if let Some(worker) = worker {
			worker.abort();
		}
		for callback in callbacks {
			callback();
		}
	}

	/// Polls until the queue drains, dumping internal state on timeout.
	///
	/// Diagnostic/test helper: production code observes progress through
	/// `handle_result` and `has_request` instead of blocking.
	pub async fn wait_until_idle(&self, timeout: Duration) -> bool {
		let deadline = Instant::now() + timeout;
		loop {
			{
				let state = self.inner.state.lock();
				if state.queue.is_empty() && state.waiting.is_empty() {
					return true;
				}
				if Instant::now() >= deadline {
					tracing::warn!(
						queue = ?state.queue,
						waiting = ?state.waiting,
						"load queue failed to drain in time"
					);
					return false;
				}
			}
			tokio::time::sleep(Duration::from_millis(5)).await;
		}
	}
}

async fn run_worker<B: LoaderBackend>(inner: Arc<LoaderInner<B>>) {
	loop {
		let request = {
			let mut state = inner.state.lock();
			match state.queue.pop_front() {
				Some(request) => {
					state.waiting.push(request.clone());
					request
				}
				None => {
					state.worker = None;
					let callbacks = if state.waiting.is_empty() {
						std::mem::take(&mut state.after_update)
					} else {
						Vec::new()
					};
					drop(state);
					for callback in callbacks {
						callback();
					}
					return;
				}
			}
		};

		let backend = Arc::clone(&inner.backend);
		let loading = request.clone();
		let status = match tokio::task::spawn_blocking(move || backend.load_request(&loading)).await {
			Ok(status) => status,
			Err(err) => {
				tracing::error!(?request, error = %err, "background load task failed");
				LoadStatus::Error
			}
		};

		// No queue lock is held here, so the backend is free to schedule
		// follow-up requests or query has_request from inside the handler.
		inner.backend.handle_result(request.clone(), status);

		let callbacks = {
			let mut state = inner.state.lock();
			state.waiting.retain(|waiting| waiting != &request);
			if state.queue.is_empty() && state.waiting.is_empty() {
				std::mem::take(&mut state.after_update)
			} else {
				Vec::new()
			}
		};
		for callback in callbacks {
			callback();
		}
	}
}
