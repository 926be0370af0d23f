use super::error::SyncError;
use super::models::{
    merge_payload, EntityKind, OfflineEntry, ReconcileReport, Resolution, SyncAction,
    SyncOperation, SyncReport, SyncStatus,
};
use super::queue::{SyncQueue, MAX_RETRIES};
use super::remote::TrackerApi;
use super::store::{load_snapshot, save_snapshot, OfflineStore};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Manual override hook for records edited locally while the server copy
/// also moved.
pub trait ConflictResolver: Send + Sync {
    fn resolve(&self, local: &OfflineEntry, server: &Value) -> Resolution;
}

impl<F> ConflictResolver for F
where
    F: Fn(&OfflineEntry, &Value) -> Resolution + Send + Sync,
{
    fn resolve(&self, local: &OfflineEntry, server: &Value) -> Resolution {
        self(local, server)
    }
}

/// Last write wins; the server wins ties and undated copies.
pub struct ServerPreferred;

impl ConflictResolver for ServerPreferred {
    fn resolve(&self, local: &OfflineEntry, server: &Value) -> Resolution {
        let server_updated = server
            .get("updatedAt")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));
        match server_updated {
            Some(updated) if updated < local.last_modified => Resolution::KeepLocal,
            _ => Resolution::TakeServer,
        }
    }
}

struct SyncState {
    store: OfflineStore,
    queue: SyncQueue,
    online: bool,
}

pub struct SyncManager<A> {
    api: A,
    resolver: Box<dyn ConflictResolver>,
    snapshot_path: Option<PathBuf>,
    state: Mutex<SyncState>,
}

impl<A: TrackerApi> SyncManager<A> {
    /// In-memory manager, online until told otherwise.
    pub fn new(api: A) -> Self {
        SyncManager {
            api,
            resolver: Box::new(ServerPreferred),
            snapshot_path: None,
            state: Mutex::new(SyncState {
                store: OfflineStore::new(),
                queue: SyncQueue::default(),
                online: true,
            }),
        }
    }

    /// Manager persisted to `path`, restoring any mirror and queue saved there.
    pub async fn open(api: A, path: impl Into<PathBuf>) -> Result<Self, SyncError> {
        let path = path.into();
        let (store, queue) = load_snapshot(&path).await?;
        log::info!(
            "Restored {} offline entries and {} queued operations from {}",
            store.len(),
            queue.len(),
            path.display()
        );
        let mut manager = Self::new(api);
        manager.snapshot_path = Some(path);
        manager.state = Mutex::new(SyncState {
            store,
            queue,
            online: true,
        });
        Ok(manager)
    }

    pub fn with_resolver(mut self, resolver: impl ConflictResolver + 'static) -> Self {
        self.resolver = Box::new(resolver);
        self
    }

    pub async fn is_online(&self) -> bool {
        self.state.lock().await.online
    }

    pub async fn entry(&self, local_id: &str) -> Option<OfflineEntry> {
        self.state.lock().await.store.get(local_id).cloned()
    }

    pub async fn entries(&self, kind: EntityKind) -> Vec<OfflineEntry> {
        self.state.lock().await.store.by_kind(kind).cloned().collect()
    }

    pub async fn pending_operations(&self) -> usize {
        self.state.lock().await.queue.len()
    }

    /// Records a new entity locally and queues its creation. Returns the
    /// local id.
    pub async fn create(&self, kind: EntityKind, data: Value) -> Result<String, SyncError> {
        let entry = OfflineEntry::pending(kind, data);
        let local_id = entry.local_id.clone();

        let mut state = self.state.lock().await;
        state
            .queue
            .enqueue(SyncOperation::new(SyncAction::Create, &entry, entry.data.clone()));
        state.store.upsert(entry);
        self.after_local_change(&mut state).await;
        Ok(local_id)
    }

    pub async fn update(&self, local_id: &str, changes: Value) -> Result<(), SyncError> {
        let mut state = self.state.lock().await;
        let entry = state
            .store
            .get_mut(local_id)
            .ok_or_else(|| SyncError::UnknownEntry(local_id.to_string()))?;
        merge_payload(&mut entry.data, changes.clone());
        entry.last_modified = Utc::now();
        entry.sync_status = SyncStatus::Pending;
        let op = SyncOperation::new(SyncAction::Update, entry, changes);

        state.queue.enqueue(op);
        self.after_local_change(&mut state).await;
        Ok(())
    }

    pub async fn delete(&self, local_id: &str) -> Result<(), SyncError> {
        let mut state = self.state.lock().await;
        let entry = state
            .store
            .remove(local_id)
            .ok_or_else(|| SyncError::UnknownEntry(local_id.to_string()))?;

        if entry.server_id.is_some() || state.queue.has_ops_for(local_id) {
            state
                .queue
                .enqueue(SyncOperation::new(SyncAction::Delete, &entry, Value::Null));
        }
        self.after_local_change(&mut state).await;
        Ok(())
    }

    /// Connectivity change. Coming back online flushes the queue.
    pub async fn set_online(&self, online: bool) -> SyncReport {
        let mut state = self.state.lock().await;
        let was_online = std::mem::replace(&mut state.online, online);
        if online && !was_online {
            log::info!("Back online, flushing {} queued operations", state.queue.len());
            return self.flush_locked(&mut state).await;
        }
        if !online && was_online {
            log::info!("Gone offline, queueing changes locally");
        }
        SyncReport {
            remaining: state.queue.len(),
            ..SyncReport::default()
        }
    }

    pub async fn flush(&self) -> SyncReport {
        let mut state = self.state.lock().await;
        self.flush_locked(&mut state).await
    }

    /// Pulls task groups from the server and folds them into the mirror.
    pub async fn reconcile(&self) -> Result<ReconcileReport, SyncError> {
        let server_groups = self.api.list_task_groups().await?;
        let mut state = self.state.lock().await;
        let mut report = ReconcileReport::default();
        let mut seen = HashSet::new();

        for server in server_groups {
            let Some(server_id) = server.get("id").and_then(Value::as_str) else {
                log::warn!("Skipping server task group without id");
                continue;
            };
            let server_id = server_id.to_string();
            seen.insert(server_id.clone());

            let existing = state
                .store
                .find_by_server_id(EntityKind::TaskGroup, &server_id)
                .cloned();
            let Some(local) = existing else {
                state.store.upsert(OfflineEntry::from_server(
                    EntityKind::TaskGroup,
                    server_id,
                    server,
                ));
                report.added += 1;
                continue;
            };

            if local.sync_status == SyncStatus::Pending {
                report.conflicts += 1;
                if self.resolver.resolve(&local, &server) == Resolution::KeepLocal {
                    log::debug!("Keeping local edit of task group {}", server_id);
                    report.kept_local += 1;
                    continue;
                }
                state.queue.remove_for(&local.local_id);
            } else if local.sync_status == SyncStatus::Synced && local.data == server {
                continue;
            }

            if let Some(entry) = state.store.get_mut(&local.local_id) {
                entry.data = server;
                entry.last_modified = Utc::now();
                entry.sync_status = SyncStatus::Synced;
                report.updated += 1;
            }
        }

        let vanished: Vec<OfflineEntry> = state
            .store
            .by_kind(EntityKind::TaskGroup)
            .filter(|e| e.server_id.as_ref().is_some_and(|id| !seen.contains(id)))
            .cloned()
            .collect();
        for entry in vanished {
            match entry.sync_status {
                // Edited here, deleted there: leave it for the user.
                SyncStatus::Pending => {
                    state.queue.remove_for(&entry.local_id);
                    if let Some(local) = state.store.get_mut(&entry.local_id) {
                        local.sync_status = SyncStatus::Conflict;
                    }
                    report.conflicts += 1;
                }
                SyncStatus::Conflict => {}
                SyncStatus::Synced | SyncStatus::Error => {
                    state.store.remove(&entry.local_id);
                    report.removed += 1;
                }
            }
        }

        self.persist(&state).await;
        log::info!("Reconciled task groups: {:?}", report);
        Ok(report)
    }

    /// Flushes every `every` until the returned handle is aborted.
    pub fn run_periodic(self: Arc<Self>, every: Duration) -> JoinHandle<()>
    where
        A: 'static,
    {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let report = self.flush().await;
                log::debug!("Periodic sync: {:?}", report);
            }
        })
    }

    async fn after_local_change(&self, state: &mut SyncState) {
        if state.online {
            self.flush_locked(state).await;
        } else {
            self.persist(state).await;
        }
    }

    async fn flush_locked(&self, state: &mut SyncState) -> SyncReport {
        let mut report = SyncReport::default();

        while state.online {
            let Some(op) = state.queue.front().cloned() else {
                break;
            };

            match self.send(&state.store, &op).await {
                Ok(response) => {
                    state.queue.pop_front();
                    Self::apply_confirmation(state, &op, response);
                    report.sent += 1;
                }
                Err(e) => {
                    report.failed += 1;
                    let retries = match state.queue.front_mut() {
                        Some(front) => {
                            front.retries += 1;
                            front.retries
                        }
                        None => MAX_RETRIES,
                    };
                    // Only an unreachable server holds up the rest of the queue;
                    // a rejected operation is dropped right away.
                    if e.is_transient() && retries < MAX_RETRIES {
                        log::warn!(
                            "Sync of {:?} {} {} failed (attempt {}/{}): {}",
                            op.action,
                            op.kind,
                            op.local_id,
                            retries,
                            MAX_RETRIES,
                            e
                        );
                        break;
                    }
                    log::error!(
                        "Dropping {:?} {} {} after {} attempts: {}",
                        op.action,
                        op.kind,
                        op.local_id,
                        retries,
                        e
                    );
                    state.queue.pop_front();
                    if let Some(entry) = state.store.get_mut(&op.local_id) {
                        entry.sync_status = SyncStatus::Error;
                    }
                    report.dropped += 1;
                }
            }
        }

        report.remaining = state.queue.len();
        self.persist(state).await;
        report
    }

    async fn send(
        &self,
        store: &OfflineStore,
        op: &SyncOperation,
    ) -> Result<Option<Value>, SyncError> {
        let entry = store.get(&op.local_id);
        let server_id = entry
            .and_then(|e| e.server_id.clone())
            .or_else(|| op.server_id.clone());

        match (op.action, server_id) {
            (SyncAction::Create, _) => {
                let created = self.api.create(op.kind, &op.payload).await?;
                if created.get("id").and_then(Value::as_str).is_none() {
                    return Err(SyncError::MissingId);
                }
                Ok(Some(created))
            }
            (SyncAction::Update, Some(id)) => {
                // Completions are upserted by (taskId, date), so the server
                // needs the whole record, not just the changed fields.
                let body = match (op.kind, entry) {
                    (EntityKind::TaskCompletion, Some(entry)) => &entry.data,
                    _ => &op.payload,
                };
                Ok(Some(self.api.update(op.kind, &id, body).await?))
            }
            // Its create was dropped earlier; send the whole record again.
            (SyncAction::Update, None) => {
                let data = entry.map_or(&op.payload, |e| &e.data);
                let created = self.api.create(op.kind, data).await?;
                if created.get("id").and_then(Value::as_str).is_none() {
                    return Err(SyncError::MissingId);
                }
                Ok(Some(created))
            }
            (SyncAction::Delete, Some(id)) => {
                self.api.delete(op.kind, &id).await?;
                Ok(None)
            }
            (SyncAction::Delete, None) => Ok(None),
        }
    }

    fn apply_confirmation(state: &mut SyncState, op: &SyncOperation, response: Option<Value>) {
        let Some(server_copy) = response else {
            return;
        };
        let still_queued = state.queue.has_ops_for(&op.local_id);
        let Some(entry) = state.store.get_mut(&op.local_id) else {
            return;
        };
        if let Some(id) = server_copy.get("id").and_then(Value::as_str) {
            entry.server_id = Some(id.to_string());
        }
        if !still_queued {
            entry.data = server_copy;
            entry.sync_status = SyncStatus::Synced;
        }
    }

    async fn persist(&self, state: &SyncState) {
        let Some(path) = &self.snapshot_path else {
            return;
        };
        if let Err(e) = save_snapshot(path, &state.store, &state.queue).await {
            log::error!("Failed to save offline snapshot to {}: {}", path.display(), e);
        }
    }
}
