//! Persistence of batches and jobs.

pub mod memory;
pub mod model;
pub mod redis;

use async_trait::async_trait;
use tracing::warn;

use crate::error::StoreError;

pub use memory::MemoryStore;
pub use model::{Batch, Job, JobStatus, JobUpdate, Page};
pub use self::redis::RedisStore;

/// Document store for batches and their jobs.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persists a new batch together with all of its jobs.
    async fn create_batch(&self, batch: &Batch, jobs: &[Job]) -> Result<(), StoreError>;

    async fn get_batch(&self, batch_id: &str) -> Result<Batch, StoreError>;

    /// Overwrites a batch's aggregate fields. The job set is never changed.
    async fn save_batch(&self, batch: &Batch) -> Result<(), StoreError>;

    async fn get_job(&self, job_id: &str) -> Result<Job, StoreError>;

    /// Applies a status change and returns the updated job.
    async fn update_job(&self, job_id: &str, update: &JobUpdate) -> Result<Job, StoreError>;

    /// Batches of one owner, newest first.
    async fn list_batches(&self, owner_id: &str, page: Page) -> Result<Vec<Batch>, StoreError>;

    async fn jobs_with_status(&self, status: JobStatus) -> Result<Vec<Job>, StoreError>;
}

/// Loads a batch's jobs in submission order.
pub async fn batch_jobs(store: &dyn JobStore, batch: &Batch) -> Result<Vec<Job>, StoreError> {
    let mut jobs = Vec::with_capacity(batch.job_ids.len());
    for job_id in &batch.job_ids {
        match store.get_job(job_id).await {
            Ok(job) => jobs.push(job),
            Err(StoreError::JobNotFound { .. }) => {
                warn!(batch_id = %batch.id, job_id = %job_id, "Batch references a missing job");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(jobs)
}

/// Loads the batch a job belongs to.
pub async fn job_batch(store: &dyn JobStore, job: &Job) -> Result<Batch, StoreError> {
    store.get_batch(&job.batch_id).await
}

/// Recomputes and persists a batch's aggregate status.
pub async fn rollup_batch(store: &dyn JobStore, batch_id: &str) -> Result<Batch, StoreError> {
    let mut batch = store.get_batch(batch_id).await?;
    let statuses: Vec<JobStatus> = batch_jobs(store, &batch)
        .await?
        .iter()
        .map(|job| job.status)
        .collect();

    if batch.rollup(&statuses) {
        store.save_batch(&batch).await?;
    }
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> (MemoryStore, Batch, Vec<Job>) {
        let store = MemoryStore::new();
        let mut batch = Batch::new("{}".into(), "owner".into());
        let jobs: Vec<Job> = ["a.wav", "b.wav"]
            .into_iter()
            .map(|title| Job::new(&batch.id, title.into(), "/in".into(), "/out".into()))
            .collect();
        batch.job_ids = jobs.iter().map(|j| j.id.clone()).collect();
        store.create_batch(&batch, &jobs).await.unwrap();
        (store, batch, jobs)
    }

    #[tokio::test]
    async fn batch_jobs_keep_submission_order() {
        let (store, batch, jobs) = seeded().await;
        let loaded = batch_jobs(&store, &batch).await.unwrap();
        let titles: Vec<&str> = loaded.iter().map(|j| j.title.as_str()).collect();
        assert_eq!(titles, vec!["a.wav", "b.wav"]);

        let owner = job_batch(&store, &jobs[1]).await.unwrap();
        assert_eq!(owner.id, batch.id);
    }

    #[tokio::test]
    async fn rollup_persists_changes() {
        let (store, batch, jobs) = seeded().await;
        store.update_job(&jobs[0].id, &JobUpdate::started()).await.unwrap();
        assert_eq!(rollup_batch(&store, &batch.id).await.unwrap().status, JobStatus::Processing);

        for job in &jobs {
            store
                .update_job(&job.id, &JobUpdate::finished(JobStatus::Succeeded, None))
                .await
                .unwrap();
        }
        rollup_batch(&store, &batch.id).await.unwrap();
        assert_eq!(store.get_batch(&batch.id).await.unwrap().status, JobStatus::Succeeded);
    }
}
