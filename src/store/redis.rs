//! Redis-backed batch and job documents.

use async_trait::async_trait;
use redis::AsyncCommands;

use super::model::{Batch, Job, JobStatus, JobUpdate, Page};
use super::JobStore;
use crate::error::StoreError;

const BATCH_PREFIX: &str = "transcode:batch:";
const JOB_PREFIX: &str = "transcode:job:";
const OWNER_PREFIX: &str = "transcode:owner:";
const STATUS_PREFIX: &str = "transcode:status:";

fn batch_key(batch_id: &str) -> String {
    format!("{}{}", BATCH_PREFIX, batch_id)
}

fn job_key(job_id: &str) -> String {
    format!("{}{}", JOB_PREFIX, job_id)
}

/// Sorted set of an owner's batch ids scored by creation time.
fn owner_key(owner_id: &str) -> String {
    format!("{}{}:batches", OWNER_PREFIX, owner_id)
}

/// Set of job ids currently in a status.
fn status_key(status: JobStatus) -> String {
    format!("{}{}", STATUS_PREFIX, status)
}

/// Stores batches and jobs as JSON documents in Redis.
#[derive(Clone)]
pub struct RedisStore {
    connection: redis::aio::ConnectionManager,
}

impl RedisStore {
    /// Creates a new RedisStore connected to the specified Redis URL.
    pub async fn new(redis_url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url).map_err(|e| StoreError::ConnectionFailed {
            url: redis_url.to_string(),
            message: e.to_string(),
        })?;

        let connection = client
            .get_connection_manager()
            .await
            .map_err(|e| StoreError::ConnectionFailed {
                url: redis_url.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self { connection })
    }

    async fn load_batch(&self, batch_id: &str) -> Result<Option<Batch>, StoreError> {
        let mut conn = self.connection.clone();
        let json: Option<String> = conn.get(batch_key(batch_id)).await?;
        json.map(|j| serde_json::from_str(&j)).transpose().map_err(Into::into)
    }

    async fn load_job(&self, job_id: &str) -> Result<Option<Job>, StoreError> {
        let mut conn = self.connection.clone();
        let json: Option<String> = conn.get(job_key(job_id)).await?;
        json.map(|j| serde_json::from_str(&j)).transpose().map_err(Into::into)
    }
}

#[async_trait]
impl JobStore for RedisStore {
    async fn create_batch(&self, batch: &Batch, jobs: &[Job]) -> Result<(), StoreError> {
        let mut pipe = redis::pipe();
        pipe.atomic();

        for job in jobs {
            pipe.set(job_key(&job.id), serde_json::to_string(job)?)
                .ignore()
                .sadd(status_key(job.status), &job.id)
                .ignore();
        }

        pipe.set(batch_key(&batch.id), serde_json::to_string(batch)?)
            .ignore()
            .zadd(
                owner_key(&batch.owner_id),
                &batch.id,
                batch.created_at.timestamp_millis(),
            )
            .ignore();

        let mut conn = self.connection.clone();
        pipe.query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }

    async fn get_batch(&self, batch_id: &str) -> Result<Batch, StoreError> {
        self.load_batch(batch_id)
            .await?
            .ok_or_else(|| StoreError::BatchNotFound {
                batch_id: batch_id.to_string(),
            })
    }

    async fn save_batch(&self, batch: &Batch) -> Result<(), StoreError> {
        let stored = self.get_batch(&batch.id).await?;
        let merged = Batch {
            job_ids: stored.job_ids,
            ..batch.clone()
        };

        let mut conn = self.connection.clone();
        conn.set::<_, _, ()>(batch_key(&batch.id), serde_json::to_string(&merged)?)
            .await?;
        Ok(())
    }

    async fn get_job(&self, job_id: &str) -> Result<Job, StoreError> {
        self.load_job(job_id)
            .await?
            .ok_or_else(|| StoreError::JobNotFound {
                job_id: job_id.to_string(),
            })
    }

    async fn update_job(&self, job_id: &str, update: &JobUpdate) -> Result<Job, StoreError> {
        let mut job = self.get_job(job_id).await?;
        let previous = job.status;
        job.apply(update);

        let mut pipe = redis::pipe();
        pipe.atomic()
            .set(job_key(job_id), serde_json::to_string(&job)?)
            .ignore();
        if previous != job.status {
            pipe.srem(status_key(previous), job_id)
                .ignore()
                .sadd(status_key(job.status), job_id)
                .ignore();
        }

        let mut conn = self.connection.clone();
        pipe.query_async::<_, ()>(&mut conn).await?;
        Ok(job)
    }

    async fn list_batches(&self, owner_id: &str, page: Page) -> Result<Vec<Batch>, StoreError> {
        let start = page.offset() as isize;
        let stop = start + page.per_page as isize - 1;

        let mut conn = self.connection.clone();
        let ids: Vec<String> = conn.zrevrange(owner_key(owner_id), start, stop).await?;

        let mut batches = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(batch) = self.load_batch(&id).await? {
                batches.push(batch);
            }
        }
        Ok(batches)
    }

    async fn jobs_with_status(&self, status: JobStatus) -> Result<Vec<Job>, StoreError> {
        let mut conn = self.connection.clone();
        let ids: Vec<String> = conn.smembers(status_key(status)).await?;

        let mut jobs = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(job) = self.load_job(&id).await? {
                // Index entries can lag a concurrent update.
                if job.status == status {
                    jobs.push(job);
                }
            }
        }
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout() {
        assert_eq!(batch_key("b1"), "transcode:batch:b1");
        assert_eq!(job_key("j1"), "transcode:job:j1");
        assert_eq!(owner_key("alice"), "transcode:owner:alice:batches");
        assert_eq!(status_key(JobStatus::Processing), "transcode:status:processing");
    }

    #[tokio::test]
    async fn invalid_url_is_a_connection_error() {
        let err = RedisStore::new("not-a-url").await.err().unwrap();
        assert!(matches!(err, StoreError::ConnectionFailed { .. }));
    }
}
