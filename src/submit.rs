//! Batch submission, status views and output download.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::capability;
use crate::config::model::StorageConfig;
use crate::error::{QueueError, SubmitError};
use crate::store::{self, Batch, Job, JobStatus, JobStore, JobUpdate, Page};
use crate::worker::TranscoderService;

/// A received input file.
#[derive(Debug, Clone)]
pub struct Upload {
    /// Original file name as sent by the client.
    pub title: String,
    /// Where the received bytes currently live.
    pub path: PathBuf,
}

impl Upload {
    /// Uses the file's own name as its title.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let title = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self { title, path }
    }
}

/// Public view of a batch. The owner id is never included.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchView {
    pub id: String,
    pub status: JobStatus,
    /// Output options as submitted.
    pub params: serde_json::Value,
    pub jobs: Vec<JobView>,
    pub created_at: DateTime<Utc>,
}

impl BatchView {
    pub fn new(batch: &Batch, jobs: &[Job]) -> Self {
        let params = serde_json::from_str(&batch.params)
            .unwrap_or_else(|_| serde_json::Value::String(batch.params.clone()));

        Self {
            id: batch.id.clone(),
            status: batch.status,
            params,
            jobs: jobs.iter().map(JobView::from).collect(),
            created_at: batch.created_at,
        }
    }
}

/// Public view of a job.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobView {
    pub id: String,
    pub status: JobStatus,
    pub title: String,
    /// Job id to download by, once the output is ready.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&Job> for JobView {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.clone(),
            status: job.status,
            title: job.title.clone(),
            download: (job.status == JobStatus::Succeeded).then(|| job.id.clone()),
            created_at: job.created_at,
            started_at: job.started_at,
            finished_at: job.finished_at,
            error: job.error_message.clone(),
        }
    }
}

/// A finished output ready to be sent to the client.
#[derive(Debug, Clone, PartialEq)]
pub struct Download {
    pub path: PathBuf,
    /// Suggested file name: the upload's stem with the output extension.
    pub file_name: String,
}

/// Entry point for creating batches and reading them back.
#[derive(Clone)]
pub struct Submitter {
    store: Arc<dyn JobStore>,
    service: TranscoderService,
    storage: StorageConfig,
}

impl Submitter {
    pub fn new(store: Arc<dyn JobStore>, service: TranscoderService, storage: StorageConfig) -> Self {
        Self {
            store,
            service,
            storage,
        }
    }

    /// Validates options, stores the uploads and queues one job per file.
    ///
    /// Nothing is stored or queued when the options or files are rejected.
    pub async fn submit(
        &self,
        files: Vec<Upload>,
        options: &str,
        owner_id: &str,
    ) -> Result<BatchView, SubmitError> {
        let opts = capability::validate_json(options)?;
        if files.is_empty() {
            return Err(SubmitError::NoFiles);
        }
        for upload in &files {
            tokio::fs::metadata(&upload.path)
                .await
                .map_err(|source| SubmitError::MissingFile {
                    path: upload.path.clone(),
                    source,
                })?;
        }

        let format = opts.format.as_deref().unwrap_or_default();
        let extension = capability::extension_for(format).unwrap_or(format);

        tokio::fs::create_dir_all(&self.storage.upload_dir).await?;
        tokio::fs::create_dir_all(&self.storage.output_dir).await?;

        let mut batch = Batch::new(options.to_string(), owner_id.to_string());
        let mut jobs = Vec::with_capacity(files.len());

        for upload in files {
            let job_id = Uuid::new_v4().to_string();
            let input_path = self.storage.upload_dir.join(&job_id);
            let output_path = self
                .storage
                .output_dir
                .join(format!("{}.{}", job_id, extension));

            if let Err(e) = tokio::fs::copy(&upload.path, &input_path).await {
                discard_uploads(&jobs).await;
                return Err(e.into());
            }
            jobs.push(Job::with_id(
                job_id,
                &batch.id,
                upload.title,
                input_path,
                output_path,
            ));
        }
        batch.job_ids = jobs.iter().map(|j| j.id.clone()).collect();

        if let Err(e) = self.store.create_batch(&batch, &jobs).await {
            discard_uploads(&jobs).await;
            return Err(e.into());
        }

        for (queued, job) in jobs.iter().enumerate() {
            let enqueued = self
                .service
                .enqueue(
                    &job.id,
                    job.input_path.clone(),
                    job.output_path.clone(),
                    batch.params.clone(),
                )
                .await;
            if let Err(e) = enqueued {
                self.fail_unqueued(&batch, &jobs[queued..], &e).await;
                return Err(e.into());
            }
        }

        info!(
            batch_id = %batch.id,
            jobs = jobs.len(),
            format = %format,
            "Batch submitted"
        );
        Ok(BatchView::new(&batch, &jobs))
    }

    /// Fails jobs that never reached the queue so their batch can finish.
    async fn fail_unqueued(&self, batch: &Batch, unqueued: &[Job], cause: &QueueError) {
        let message = format!("could not be queued: {}", cause);
        for job in unqueued {
            let update = JobUpdate::finished(JobStatus::Failed, Some(message.clone()));
            if let Err(e) = self.store.update_job(&job.id, &update).await {
                warn!(job_id = %job.id, error = %e, "Failed to record unqueued job");
            }
        }
        discard_uploads(unqueued).await;
        self.service.rollup(&batch.id).await;
        warn!(batch_id = %batch.id, jobs = unqueued.len(), error = %cause, "Batch partly queued");
    }

    /// A batch with its jobs in submission order.
    pub async fn batch(&self, batch_id: &str) -> Result<BatchView, SubmitError> {
        let batch = self.store.get_batch(batch_id).await?;
        let jobs = store::batch_jobs(self.store.as_ref(), &batch).await?;
        Ok(BatchView::new(&batch, &jobs))
    }

    pub async fn job(&self, job_id: &str) -> Result<JobView, SubmitError> {
        let job = self.store.get_job(job_id).await?;
        Ok(JobView::from(&job))
    }

    /// An owner's batches, newest first.
    pub async fn batches(&self, owner_id: &str, page: Page) -> Result<Vec<BatchView>, SubmitError> {
        let mut views = Vec::new();
        for batch in self.store.list_batches(owner_id, page).await? {
            let jobs = store::batch_jobs(self.store.as_ref(), &batch).await?;
            views.push(BatchView::new(&batch, &jobs));
        }
        Ok(views)
    }

    /// Resolves a succeeded job's output file.
    pub async fn download(&self, job_id: &str) -> Result<Download, SubmitError> {
        let job = self.store.get_job(job_id).await?;
        if job.status != JobStatus::Succeeded {
            return Err(SubmitError::NotReady {
                job_id: job.id,
                status: job.status,
            });
        }

        tokio::fs::metadata(&job.output_path).await?;

        Ok(Download {
            file_name: download_name(&job),
            path: job.output_path,
        })
    }
}

fn download_name(job: &Job) -> String {
    let stem = Path::new(&job.title)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| job.id.clone());

    match job.output_path.extension() {
        Some(ext) => format!("{}.{}", stem, ext.to_string_lossy()),
        None => stem,
    }
}

async fn discard_uploads(jobs: &[Job]) {
    for job in jobs {
        if let Err(e) = tokio::fs::remove_file(&job.input_path).await {
            warn!(job_id = %job.id, error = %e, "Failed to discard upload");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::WorkerConfig;
    use crate::encoder::EncoderSettings;
    use crate::queue::{MemoryQueue, QueueTransport};
    use crate::store::{JobUpdate, MemoryStore};
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        store: Arc<MemoryStore>,
        queue: Arc<MemoryQueue>,
        submitter: Submitter,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let queue = Arc::new(MemoryQueue::new());
        let service = TranscoderService::new(
            store.clone(),
            queue.clone(),
            EncoderSettings::default(),
            &WorkerConfig {
                concurrency: 1,
                poll_interval_ms: 20,
                reconcile_on_start: false,
            },
        );
        let storage = StorageConfig {
            upload_dir: dir.path().join("uploads"),
            output_dir: dir.path().join("outputs"),
        };
        let submitter = Submitter::new(store.clone(), service, storage);
        Fixture {
            dir,
            store,
            queue,
            submitter,
        }
    }

    fn upload(fixture: &Fixture, name: &str) -> Upload {
        let path = fixture.dir.path().join(name);
        std::fs::write(&path, name.as_bytes()).unwrap();
        Upload::from_path(path)
    }

    const MKV: &str = r#"{"format":"mkv","stream":{"video":{"codec":"hevc"},"audio":{"codec":"opus"}}}"#;

    #[tokio::test]
    async fn submit_creates_waiting_batch_and_queues_jobs() {
        let f = fixture();
        let files = vec![upload(&f, "one.mov"), upload(&f, "two.mov")];

        let view = f.submitter.submit(files, MKV, "alice").await.unwrap();

        assert_eq!(view.status, JobStatus::Waiting);
        assert_eq!(view.params["format"], "mkv");
        let titles: Vec<&str> = view.jobs.iter().map(|j| j.title.as_str()).collect();
        assert_eq!(titles, vec!["one.mov", "two.mov"]);
        assert!(view.jobs.iter().all(|j| j.status == JobStatus::Waiting));

        let job = f.store.get_job(&view.jobs[0].id).await.unwrap();
        assert_eq!(job.input_path, f.dir.path().join("uploads").join(&job.id));
        assert_eq!(
            job.output_path,
            f.dir.path().join("outputs").join(format!("{}.mkv", job.id))
        );
        assert_eq!(std::fs::read(&job.input_path).unwrap(), b"one.mov");

        let queued = f.queue.list().await.unwrap();
        assert_eq!(queued.len(), 2);
        assert_eq!(queued[0].item.job_id, view.jobs[0].id);
        assert_eq!(queued[0].item.options, MKV);
    }

    #[tokio::test]
    async fn rejections_store_nothing() {
        let f = fixture();

        let err = f
            .submitter
            .submit(vec![upload(&f, "a.wav")], "{oops", "alice")
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::MalformedOptions(_)));

        let err = f
            .submitter
            .submit(vec![upload(&f, "a.wav")], r#"{"format":"mp3","stream":{"audio":{"codec":"aac"}}}"#, "alice")
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::Invalid(_)));
        assert!(err.is_client_error());

        let err = f.submitter.submit(vec![], MKV, "alice").await.unwrap_err();
        assert!(matches!(err, SubmitError::NoFiles));

        let missing = Upload::from_path(f.dir.path().join("missing.wav"));
        let err = f.submitter.submit(vec![missing], MKV, "alice").await.unwrap_err();
        assert!(matches!(err, SubmitError::MissingFile { .. }));

        assert!(f.queue.list().await.unwrap().is_empty());
        assert!(f.submitter.batches("alice", Page::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn enqueue_failure_fails_the_unqueued_jobs() {
        use crate::queue::MockQueueTransport;
        use std::sync::atomic::{AtomicUsize, Ordering};

        let f = fixture();
        let calls = AtomicUsize::new(0);
        let mut queue = MockQueueTransport::new();
        queue.expect_enqueue().returning(move |_| {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(())
            } else {
                Err(QueueError::EnqueueFailed("connection reset".into()))
            }
        });
        let service = TranscoderService::new(
            f.store.clone(),
            Arc::new(queue),
            EncoderSettings::default(),
            &WorkerConfig {
                concurrency: 1,
                poll_interval_ms: 20,
                reconcile_on_start: false,
            },
        );
        let storage = StorageConfig {
            upload_dir: f.dir.path().join("uploads"),
            output_dir: f.dir.path().join("outputs"),
        };
        let submitter = Submitter::new(f.store.clone(), service, storage);

        let files = vec![upload(&f, "one.wav"), upload(&f, "two.wav")];
        let err = submitter.submit(files, MKV, "alice").await.unwrap_err();
        assert!(matches!(err, SubmitError::Queue(_)));

        let batch = f.submitter.batches("alice", Page::default()).await.unwrap().remove(0);
        assert_eq!(batch.jobs[0].status, JobStatus::Waiting);
        assert_eq!(batch.jobs[1].status, JobStatus::Failed);
        assert!(batch.jobs[1].error.as_deref().unwrap().contains("could not be queued"));
        assert_eq!(batch.status, JobStatus::Processing);

        let unqueued = f.store.get_job(&batch.jobs[1].id).await.unwrap();
        assert!(!unqueued.input_path.exists());
    }

    #[tokio::test]
    async fn views_hide_owner() {
        let f = fixture();
        let view = f
            .submitter
            .submit(vec![upload(&f, "a.wav")], MKV, "secret-owner")
            .await
            .unwrap();

        let fetched = f.submitter.batch(&view.id).await.unwrap();
        let json = serde_json::to_string(&fetched).unwrap();
        assert!(!json.contains("secret-owner"));
        assert!(!json.contains("owner"));
        assert!(json.contains("\"createdAt\""));
    }

    #[tokio::test]
    async fn lists_batches_per_owner() {
        let f = fixture();
        f.submitter.submit(vec![upload(&f, "a.wav")], MKV, "alice").await.unwrap();
        f.submitter.submit(vec![upload(&f, "b.wav")], MKV, "bob").await.unwrap();

        let alice = f.submitter.batches("alice", Page::default()).await.unwrap();
        assert_eq!(alice.len(), 1);
        assert_eq!(alice[0].jobs[0].title, "a.wav");
    }

    #[tokio::test]
    async fn download_requires_success() {
        let f = fixture();
        let view = f
            .submitter
            .submit(vec![upload(&f, "song.wav")], MKV, "alice")
            .await
            .unwrap();
        let job_id = &view.jobs[0].id;

        let err = f.submitter.download(job_id).await.unwrap_err();
        assert!(matches!(
            err,
            SubmitError::NotReady {
                status: JobStatus::Waiting,
                ..
            }
        ));

        let job = f
            .store
            .update_job(job_id, &JobUpdate::finished(JobStatus::Succeeded, None))
            .await
            .unwrap();
        std::fs::write(&job.output_path, b"encoded").unwrap();

        let download = f.submitter.download(job_id).await.unwrap();
        assert_eq!(download.file_name, "song.mkv");
        assert_eq!(download.path, job.output_path);

        let view = f.submitter.job(job_id).await.unwrap();
        assert_eq!(view.download.as_deref(), Some(job_id.as_str()));
    }

    #[tokio::test]
    async fn unknown_ids_are_client_errors() {
        let f = fixture();
        let err = f.submitter.batch("nope").await.unwrap_err();
        assert!(err.is_client_error());
        let err = f.submitter.download("nope").await.unwrap_err();
        assert!(err.is_client_error());
    }
}
