//! Live encoder processes keyed by job id.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::encoder::ProcessHandle;

/// Shared map of running processes. The lock is never held across an await.
#[derive(Debug, Clone, Default)]
pub struct ProcessMap {
    inner: Arc<Mutex<HashMap<String, ProcessHandle>>>,
}

impl ProcessMap {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ProcessHandle>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn insert(&self, handle: ProcessHandle) {
        self.lock().insert(handle.job_id().to_string(), handle);
    }

    pub fn get(&self, job_id: &str) -> Option<ProcessHandle> {
        self.lock().get(job_id).cloned()
    }

    pub fn remove(&self, job_id: &str) -> Option<ProcessHandle> {
        self.lock().remove(job_id)
    }

    pub fn contains(&self, job_id: &str) -> bool {
        self.lock().contains_key(job_id)
    }

    /// Job ids with a live process, sorted.
    pub fn job_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Empties the map, returning every handle it held.
    pub fn drain(&self) -> Vec<ProcessHandle> {
        self.lock().drain().map(|(_, handle)| handle).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
