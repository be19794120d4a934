//! In-process store used by one-shot transcodes and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::model::{Batch, Job, JobStatus, JobUpdate, Page};
use super::JobStore;
use crate::error::StoreError;

#[derive(Debug, Default)]
struct Inner {
    batches: HashMap<String, Batch>,
    jobs: HashMap<String, Job>,
}

/// Keeps batches and jobs in memory for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn create_batch(&self, batch: &Batch, jobs: &[Job]) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        for job in jobs {
            inner.jobs.insert(job.id.clone(), job.clone());
        }
        inner.batches.insert(batch.id.clone(), batch.clone());
        Ok(())
    }

    async fn get_batch(&self, batch_id: &str) -> Result<Batch, StoreError> {
        self.inner
            .read()
            .await
            .batches
            .get(batch_id)
            .cloned()
            .ok_or_else(|| StoreError::BatchNotFound {
                batch_id: batch_id.to_string(),
            })
    }

    async fn save_batch(&self, batch: &Batch) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let stored = inner
            .batches
            .get_mut(&batch.id)
            .ok_or_else(|| StoreError::BatchNotFound {
                batch_id: batch.id.clone(),
            })?;

        let job_ids = std::mem::take(&mut stored.job_ids);
        *stored = Batch {
            job_ids,
            ..batch.clone()
        };
        Ok(())
    }

    async fn get_job(&self, job_id: &str) -> Result<Job, StoreError> {
        self.inner
            .read()
            .await
            .jobs
            .get(job_id)
            .cloned()
            .ok_or_else(|| StoreError::JobNotFound {
                job_id: job_id.to_string(),
            })
    }

    async fn update_job(&self, job_id: &str, update: &JobUpdate) -> Result<Job, StoreError> {
        let mut inner = self.inner.write().await;
        let job = inner
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| StoreError::JobNotFound {
                job_id: job_id.to_string(),
            })?;
        job.apply(update);
        Ok(job.clone())
    }

    async fn list_batches(&self, owner_id: &str, page: Page) -> Result<Vec<Batch>, StoreError> {
        let inner = self.inner.read().await;
        let mut owned: Vec<&Batch> = inner
            .batches
            .values()
            .filter(|b| b.owner_id == owner_id)
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));

        Ok(owned
            .into_iter()
            .skip(page.offset())
            .take(page.per_page)
            .cloned()
            .collect())
    }

    async fn jobs_with_status(&self, status: JobStatus) -> Result<Vec<Job>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .jobs
            .values()
            .filter(|j| j.status == status)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn batch_for(owner: &str, age_secs: i64) -> Batch {
        let mut batch = Batch::new("{}".into(), owner.into());
        batch.created_at = Utc::now() - Duration::seconds(age_secs);
        batch
    }

    #[tokio::test]
    async fn missing_records_are_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.get_job("nope").await,
            Err(StoreError::JobNotFound { .. })
        ));
        assert!(matches!(
            store.get_batch("nope").await,
            Err(StoreError::BatchNotFound { .. })
        ));
        assert!(store
            .update_job("nope", &JobUpdate::started())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn lists_owner_batches_newest_first() {
        let store = MemoryStore::new();
        let old = batch_for("alice", 60);
        let new = batch_for("alice", 0);
        let other = batch_for("bob", 30);
        for batch in [&old, &new, &other] {
            store.create_batch(batch, &[]).await.unwrap();
        }

        let first = store.list_batches("alice", Page::new(1, 1)).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].id, new.id);

        let second = store.list_batches("alice", Page::new(2, 1)).await.unwrap();
        assert_eq!(second[0].id, old.id);

        assert!(store.list_batches("alice", Page::new(3, 1)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_batch_keeps_job_set() {
        let store = MemoryStore::new();
        let mut batch = Batch::new("{}".into(), "alice".into());
        batch.job_ids = vec!["j1".into()];
        store.create_batch(&batch, &[]).await.unwrap();

        let mut changed = batch.clone();
        changed.status = JobStatus::Processing;
        changed.job_ids.clear();
        store.save_batch(&changed).await.unwrap();

        let stored = store.get_batch(&batch.id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Processing);
        assert_eq!(stored.job_ids, vec!["j1".to_string()]);
    }

    #[tokio::test]
    async fn finds_jobs_by_status() {
        let store = MemoryStore::new();
        let batch = Batch::new("{}".into(), "alice".into());
        let jobs = vec![
            Job::new(&batch.id, "a".into(), "/a".into(), "/a.out".into()),
            Job::new(&batch.id, "b".into(), "/b".into(), "/b.out".into()),
        ];
        store.create_batch(&batch, &jobs).await.unwrap();
        store.update_job(&jobs[1].id, &JobUpdate::started()).await.unwrap();

        let processing = store.jobs_with_status(JobStatus::Processing).await.unwrap();
        assert_eq!(processing.len(), 1);
        assert_eq!(processing[0].id, jobs[1].id);
        assert_eq!(store.jobs_with_status(JobStatus::Waiting).await.unwrap().len(), 1);
    }
}
