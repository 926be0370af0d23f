use super::models::{merge_payload, SyncAction, SyncOperation};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Attempts per operation before it is dropped.
pub const MAX_RETRIES: u32 = 3;

/// FIFO of operations waiting for server confirmation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncQueue {
    ops: VecDeque<SyncOperation>,
}

impl SyncQueue {
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SyncOperation> {
        self.ops.iter()
    }

    pub fn front(&self) -> Option<&SyncOperation> {
        self.ops.front()
    }

    pub fn front_mut(&mut self) -> Option<&mut SyncOperation> {
        self.ops.front_mut()
    }

    pub fn pop_front(&mut self) -> Option<SyncOperation> {
        self.ops.pop_front()
    }

    pub fn has_ops_for(&self, local_id: &str) -> bool {
        self.ops.iter().any(|op| op.local_id == local_id)
    }

    /// Drops every queued operation for `local_id`, returning how many.
    pub fn remove_for(&mut self, local_id: &str) -> usize {
        let before = self.ops.len();
        self.ops.retain(|op| op.local_id != local_id);
        before - self.ops.len()
    }

    /// Appends `op`, folding it into what is already queued for the same
    /// entity:
    /// - an update merges into the latest queued create or update,
    /// - a delete of a never-sent create cancels both,
    /// - a delete supersedes queued updates.
    pub fn enqueue(&mut self, op: SyncOperation) {
        match op.action {
            SyncAction::Create => self.ops.push_back(op),
            SyncAction::Update => {
                let latest = self
                    .ops
                    .iter()
                    .rposition(|queued| queued.local_id == op.local_id);
                match latest {
                    Some(index) if self.ops[index].action != SyncAction::Delete => {
                        merge_payload(&mut self.ops[index].payload, op.payload);
                    }
                    _ => self.ops.push_back(op),
                }
            }
            SyncAction::Delete => {
                let unsent_create = self.ops.iter().any(|queued| {
                    queued.local_id == op.local_id && queued.action == SyncAction::Create
                });
                self.remove_for(&op.local_id);
                if unsent_create {
                    log::debug!(
                        "Delete of unsent {} {} cancels its create",
                        op.kind,
                        op.local_id
                    );
                } else {
                    self.ops.push_back(op);
                }
            }
        }
    }
}
