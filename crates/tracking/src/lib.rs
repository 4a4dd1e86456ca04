//! Per-buffer change-tracker lifecycle coordination.
//!
//! Goals:
//! - one tracker per buffer, reference-counted by explicit requester tokens
//! - provider selection by fixed priority order (first match wins)
//! - background baseline refresh through a single-flight load queue, with
//!   stale results discarded on re-validation instead of cancellation
//! - edge-triggered freeze/unfreeze fan-out for bulk external operations
//! - durable capture/restore of partial (multi-group) range assignments
//!
//! All public operations on [`TrackerManager`] are serialized by one internal
//! mutex; baseline loads run on the blocking pool and hand their results back
//! through the same mutex. The host supplies buffer/file identity through
//! [`WorkspaceHost`] and diffing through [`ContentLoader`] implementations.

pub mod manager;
pub mod partial;
pub mod provider;
pub mod tracker;
pub mod types;

pub use manager::{FsEventKind, TrackerManager, TrackerManagerConfig};
pub use partial::{PartialState, PersistedRange, RestoreOutcome, RestoreReport, decode_states, encode_states};
pub use provider::{ContentLoader, TrackerProvider, WorkspaceHost};
pub use tracker::{ChangeTracker, LineTracker};
pub use types::{BaselineContent, BufferId, ChangeGroupId, ContentInfo, DiffRange, RequesterId, TrackerError};
