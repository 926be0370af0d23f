use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    TaskGroup,
    TaskCompletion,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::TaskGroup => "taskGroup",
            EntityKind::TaskCompletion => "taskCompletion",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Synced,
    Pending,
    Conflict,
    Error,
}

/// Local copy of a server record plus its sync bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineEntry {
    pub local_id: String,
    pub server_id: Option<String>,
    pub kind: EntityKind,
    pub data: Value,
    pub last_modified: DateTime<Utc>,
    pub sync_status: SyncStatus,
}

impl OfflineEntry {
    pub fn pending(kind: EntityKind, data: Value) -> Self {
        OfflineEntry {
            local_id: Uuid::new_v4().to_string(),
            server_id: None,
            kind,
            data,
            last_modified: Utc::now(),
            sync_status: SyncStatus::Pending,
        }
    }

    pub fn from_server(kind: EntityKind, server_id: String, data: Value) -> Self {
        OfflineEntry {
            local_id: Uuid::new_v4().to_string(),
            server_id: Some(server_id),
            kind,
            data,
            last_modified: Utc::now(),
            sync_status: SyncStatus::Synced,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOperation {
    pub id: String,
    pub action: SyncAction,
    pub kind: EntityKind,
    pub local_id: String,
    /// Known server id at enqueue time. Deletes rely on it since their
    /// entry is already gone from the mirror.
    pub server_id: Option<String>,
    pub payload: Value,
    pub retries: u32,
    pub created_at: DateTime<Utc>,
}

impl SyncOperation {
    pub fn new(action: SyncAction, entry: &OfflineEntry, payload: Value) -> Self {
        SyncOperation {
            id: Uuid::new_v4().to_string(),
            action,
            kind: entry.kind,
            local_id: entry.local_id.clone(),
            server_id: entry.server_id.clone(),
            payload,
            retries: 0,
            created_at: Utc::now(),
        }
    }
}

/// Outcome of one flush round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub sent: usize,
    pub failed: usize,
    pub dropped: usize,
    pub remaining: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    pub conflicts: usize,
    pub kept_local: usize,
}

/// Decision for a record changed both locally and on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    KeepLocal,
    TakeServer,
}

/// Shallow-merges object fields of `patch` into `target`; anything else
/// replaces `target` outright.
pub fn merge_payload(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                target.insert(key, value);
            }
        }
        (target, patch) => *target = patch,
    }
}
