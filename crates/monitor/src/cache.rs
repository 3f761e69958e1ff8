//! Process-local job status cache.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use sendwatch_core::{CampaignId, JobStatus};

/// Latest known [`JobStatus`] per sending campaign.
///
/// Cheap to clone; clones share the same map. Reads are public, writes are
/// crate-private: the poll scheduler owns the contents and the command
/// coordinator only evicts deleted campaigns.
#[derive(Debug, Clone, Default)]
pub struct JobStatusCache {
    entries: Arc<RwLock<HashMap<CampaignId, JobStatus>>>,
}

impl JobStatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: CampaignId) -> Option<JobStatus> {
        self.read().get(&id).cloned()
    }

    pub fn contains(&self, id: CampaignId) -> bool {
        self.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Copy of every entry, for rendering a consistent frame.
    pub fn snapshot(&self) -> HashMap<CampaignId, JobStatus> {
        self.read().clone()
    }

    /// Replace the entry for `id` wholesale (never merged field-by-field).
    pub(crate) fn upsert(&self, id: CampaignId, status: JobStatus) {
        self.write().insert(id, status);
    }

    /// Drop every entry whose campaign is not in `active`.
    ///
    /// Returns the pruned ids.
    pub(crate) fn remove_all_except(&self, active: &BTreeSet<CampaignId>) -> Vec<CampaignId> {
        let mut entries = self.write();
        let stale: Vec<CampaignId> = entries
            .keys()
            .filter(|id| !active.contains(id))
            .copied()
            .collect();
        for id in &stale {
            entries.remove(id);
        }
        stale
    }

    pub(crate) fn evict(&self, id: CampaignId) -> Option<JobStatus> {
        self.write().remove(&id)
    }

    // A panic while holding the lock cannot leave a half-written entry
    // (inserts/removes are single operations), so poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<CampaignId, JobStatus>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<CampaignId, JobStatus>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}
