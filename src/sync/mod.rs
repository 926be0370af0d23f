//! Offline mirror and sync queue for the Daily Tracker client.
//!
//! Local edits land in an [`OfflineStore`] immediately and are replayed
//! against the tracker API by a [`SyncManager`] whenever it is online.

pub mod error;
pub mod manager;
pub mod models;
pub mod queue;
pub mod remote;
pub mod store;


pub use error::SyncError;
pub use manager::{ConflictResolver, ServerPreferred, SyncManager, DEFAULT_SYNC_INTERVAL};
pub use models::{
    EntityKind, OfflineEntry, ReconcileReport, Resolution, SyncAction, SyncOperation, SyncReport,
    SyncStatus,
};
pub use queue::{SyncQueue, MAX_RETRIES};
pub use remote::{HttpTrackerApi, TrackerApi};
pub use store::OfflineStore;
