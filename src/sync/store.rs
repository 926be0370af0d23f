use super::error::SyncError;
use super::models::{EntityKind, OfflineEntry, SyncStatus};
use super::queue::SyncQueue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Mirror of server records, keyed by local id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OfflineStore {
    entries: BTreeMap<String, OfflineEntry>,
}

impl OfflineStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, local_id: &str) -> Option<&OfflineEntry> {
        self.entries.get(local_id)
    }

    pub fn get_mut(&mut self, local_id: &str) -> Option<&mut OfflineEntry> {
        self.entries.get_mut(local_id)
    }

    pub fn upsert(&mut self, entry: OfflineEntry) {
        self.entries.insert(entry.local_id.clone(), entry);
    }

    pub fn remove(&mut self, local_id: &str) -> Option<OfflineEntry> {
        self.entries.remove(local_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &OfflineEntry> {
        self.entries.values()
    }

    pub fn by_kind(&self, kind: EntityKind) -> impl Iterator<Item = &OfflineEntry> {
        self.entries.values().filter(move |entry| entry.kind == kind)
    }

    pub fn pending(&self) -> impl Iterator<Item = &OfflineEntry> {
        self.entries
            .values()
            .filter(|entry| entry.sync_status == SyncStatus::Pending)
    }

    pub fn find_by_server_id(&self, kind: EntityKind, server_id: &str) -> Option<&OfflineEntry> {
        self.by_kind(kind)
            .find(|entry| entry.server_id.as_deref() == Some(server_id))
    }
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    entries: &'a OfflineStore,
    queue: &'a SyncQueue,
}

#[derive(Deserialize, Default)]
struct Snapshot {
    #[serde(default)]
    entries: OfflineStore,
    #[serde(default)]
    queue: SyncQueue,
}

/// Reads the mirror and queue back. A missing file is an empty snapshot.
pub async fn load_snapshot(path: &Path) -> Result<(OfflineStore, SyncQueue), SyncError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
            Ok((snapshot.entries, snapshot.queue))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Default::default()),
        Err(e) => Err(e.into()),
    }
}

pub async fn save_snapshot(
    path: &Path,
    entries: &OfflineStore,
    queue: &SyncQueue,
) -> Result<(), SyncError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let body = serde_json::to_vec(&SnapshotRef { entries, queue })?;
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, body).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::models::{SyncAction, SyncOperation};
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn lookups_by_kind_and_server_id() {
        let mut store = OfflineStore::new();
        let group = OfflineEntry::from_server(EntityKind::TaskGroup, "g-1".into(), json!({}));
        let completion =
            OfflineEntry::from_server(EntityKind::TaskCompletion, "g-1".into(), json!({}));
        let draft = OfflineEntry::pending(EntityKind::TaskGroup, json!({"name": "New"}));
        store.upsert(group.clone());
        store.upsert(completion);
        store.upsert(draft.clone());

        assert_eq!(store.by_kind(EntityKind::TaskGroup).count(), 2);
        assert_eq!(
            store.find_by_server_id(EntityKind::TaskGroup, "g-1"),
            Some(&group)
        );
        let pending: Vec<_> = store.pending().collect();
        assert_eq!(pending, vec![&draft]);
    }

    #[tokio::test]
    async fn snapshot_round_trips_through_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/offline.json");

        let mut store = OfflineStore::new();
        let entry = OfflineEntry::pending(EntityKind::TaskGroup, json!({"name": "Gym"}));
        let mut queue = SyncQueue::default();
        queue.enqueue(SyncOperation::new(
            SyncAction::Create,
            &entry,
            entry.data.clone(),
        ));
        store.upsert(entry);

        save_snapshot(&path, &store, &queue).await.unwrap();
        let (loaded_store, loaded_queue) = load_snapshot(&path).await.unwrap();

        assert_eq!(loaded_store, store);
        assert_eq!(loaded_queue, queue);
    }

    #[tokio::test]
    async fn missing_snapshot_is_empty() {
        let dir = TempDir::new().unwrap();
        let (store, queue) = load_snapshot(&dir.path().join("absent.json"))
            .await
            .unwrap();
        assert!(store.is_empty());
        assert!(queue.is_empty());
    }
}
