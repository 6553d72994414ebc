//! Offline-first project sync for continuity clients.
//!
//! A [`SyncEngine`] keeps a [`LocalStore`] consistent with the shared
//! backend: full pulls on start and reconnect, debounced per-category
//! pushes of local edits, and incremental merges of other clients' commits
//! from the change feed. Merges are row-level last-writer-wins; fields that
//! only exist on the client survive every merge.

pub mod baseline;
pub mod config;
pub mod connectivity;
pub mod context;
pub mod engine;
pub mod error;
pub mod inflight;
pub mod mapper;
pub mod merge;
pub mod pull;
pub mod push;
pub mod realtime;
pub mod scheduler;
pub mod status;
pub mod store;
pub mod tracker;

pub use config::{ScheduleMergePolicy, SyncConfig, SyncPolicy};
pub use connectivity::{Connectivity, ConnectivityMonitor};
pub use engine::{SyncEngine, SyncServices};
pub use error::{ErrorKind, MapperError, PullError, SyncError};
pub use pull::{PullEngine, PullReport};
pub use push::{PushEngine, PushReport};
pub use realtime::{Applied, RealtimeEngine};
pub use status::{SyncState, SyncStatus};
pub use store::{load_state_file, save_state_file, LocalStore, Mutation, Origin, PersistedState, SyncMetadata};
