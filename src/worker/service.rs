//! Queue consumer that drives encoder processes and records their outcome.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch, Mutex, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};

use super::registry::ProcessMap;
use crate::capability;
use crate::config::model::WorkerConfig;
use crate::encoder::{EncoderProcess, EncoderSettings, ProcessEvent};
use crate::error::{CapabilityError, EncoderError, QueueError, StoreError};
use crate::notify::Metrics;
use crate::queue::{ItemState, QueueTransport, QueuedItem, WorkItem};
use crate::store::{self, Job, JobStatus, JobStore, JobUpdate};
use crate::validation::report::format_brief_summary;

/// Runs queued transcodes with bounded concurrency.
///
/// Cloning is cheap; clones share the process map, the concurrency permits
/// and every collaborator.
#[derive(Clone)]
pub struct TranscoderService {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn QueueTransport>,
    settings: EncoderSettings,
    processes: ProcessMap,
    permits: Arc<Semaphore>,
    concurrency: usize,
    poll_interval: Duration,
    metrics: Option<Arc<Metrics>>,
    /// Serializes batch read-modify-write cycles.
    rollup_lock: Arc<Mutex<()>>,
}

impl TranscoderService {
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<dyn QueueTransport>,
        settings: EncoderSettings,
        config: &WorkerConfig,
    ) -> Self {
        let concurrency = config.concurrency.max(1);
        Self {
            store,
            queue,
            settings,
            processes: ProcessMap::new(),
            permits: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            poll_interval: config.poll_interval().max(Duration::from_millis(10)),
            metrics: None,
            rollup_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Places a work item on the queue. Options are validated when the item
    /// is dispatched, not here.
    pub async fn enqueue(
        &self,
        job_id: &str,
        input_path: PathBuf,
        output_path: PathBuf,
        options: String,
    ) -> Result<WorkItem, QueueError> {
        let item = WorkItem::new(job_id.to_string(), input_path, output_path, options);
        self.queue.enqueue(&item).await?;
        debug!(job_id = %job_id, item_id = %item.id, "Work item enqueued");
        Ok(item)
    }

    /// Consumes the queue until `shutdown` flips to true or its sender drops.
    ///
    /// Processes still running at shutdown are killed when their handles
    /// drop; `reconcile` cleans up their jobs on the next start.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            concurrency = self.concurrency,
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Starting transcoder worker"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            // Wait for a free slot, draining abort requests meanwhile.
            let permit = loop {
                tokio::select! {
                    permit = self.permits.clone().acquire_owned() => break permit.ok(),
                    _ = shutdown.changed() => break None,
                    _ = tokio::time::sleep(self.poll_interval) => self.handle_abort_requests().await,
                }
            };
            let Some(permit) = permit else {
                break;
            };

            self.handle_abort_requests().await;

            match self.queue.dequeue().await {
                Ok(Some(item)) => self.dispatch(item, permit).await,
                Ok(None) => {
                    drop(permit);
                    if self.idle(&mut shutdown).await {
                        break;
                    }
                }
                Err(e) => {
                    error!(error = %e, "Failed to dequeue work item");
                    drop(permit);
                    if self.idle(&mut shutdown).await {
                        break;
                    }
                }
            }
        }

        info!(running = self.processes.len(), "Transcoder worker stopped");
    }

    /// Sleeps one poll interval. Returns true if shutdown was signalled.
    async fn idle(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(self.poll_interval) => false,
            _ = shutdown.changed() => true,
        }
    }

    async fn handle_abort_requests(&self) {
        match self.queue.take_abort_requests().await {
            Ok(requests) => {
                for job_id in requests {
                    if self.abort(&job_id) {
                        info!(job_id = %job_id, "Abort requested");
                    } else {
                        debug!(job_id = %job_id, "Abort request for job without a live process");
                    }
                }
            }
            Err(e) => warn!(error = %e, "Failed to read abort requests"),
        }
    }

    /// Validates an item's options and starts its encoder.
    async fn dispatch(&self, item: WorkItem, permit: OwnedSemaphorePermit) {
        let job_id = item.job_id.clone();
        info!(job_id = %job_id, item_id = %item.id, "Dispatching work item");

        let opts = match capability::validate_json(&item.options) {
            Ok(opts) => opts,
            Err(e) => {
                let message = match &e {
                    CapabilityError::Rejected(result) => {
                        format!("{}: {}", e, format_brief_summary(result))
                    }
                    CapabilityError::Malformed(_) => e.to_string(),
                };
                warn!(job_id = %job_id, error = %message, "Rejected output options");
                self.finalize(&item, JobStatus::Failed, Some(message), None)
                    .await;
                return;
            }
        };

        let (process, events) = EncoderProcess::new(
            job_id.clone(),
            item.input_path.clone(),
            item.output_path.clone(),
            opts,
            self.settings.clone(),
        );
        self.processes.insert(process.handle());

        if let Err(e) = process.start() {
            error!(job_id = %job_id, error = %e, "Failed to start encoder");
            self.finalize(&item, JobStatus::Failed, Some(e.to_string()), None)
                .await;
            return;
        }
        self.update_in_progress();

        let service = self.clone();
        tokio::spawn(async move {
            service.follow(item, events).await;
            drop(permit);
        });
    }

    /// Applies each process event to the store and the queue.
    async fn follow(&self, item: WorkItem, mut events: mpsc::UnboundedReceiver<ProcessEvent>) {
        let job_id = item.job_id.as_str();
        let mut started: Option<Instant> = None;
        let mut last_percent: Option<u8> = None;

        while let Some(event) = events.recv().await {
            let elapsed = started.map(|at| at.elapsed().as_secs_f64());

            match event {
                ProcessEvent::Started => {
                    started = Some(Instant::now());
                    match self.store.update_job(job_id, &JobUpdate::started()).await {
                        Ok(job) => self.rollup(&job.batch_id).await,
                        Err(e) => error!(job_id = %job_id, error = %e, "Failed to record job start"),
                    }
                }
                ProcessEvent::Progress(progress) => {
                    let Some(percent) = progress.rounded_percent() else {
                        continue;
                    };
                    if last_percent == Some(percent) {
                        continue;
                    }
                    last_percent = Some(percent);
                    debug!(job_id = %job_id, percent, speed = ?progress.speed, "Progress");
                    if let Err(e) = self.queue.progress(&item, percent).await {
                        warn!(job_id = %job_id, error = %e, "Failed to report progress");
                    }
                }
                ProcessEvent::Finished => {
                    self.finalize(&item, JobStatus::Succeeded, None, elapsed).await;
                    return;
                }
                ProcessEvent::Failed { message } => {
                    self.finalize(&item, JobStatus::Failed, Some(message), elapsed)
                        .await;
                    return;
                }
                ProcessEvent::Aborted => {
                    self.finalize(&item, JobStatus::Aborted, None, elapsed).await;
                    return;
                }
            }
        }

        // Channel closed without a terminal event.
        let elapsed = started.map(|at| at.elapsed().as_secs_f64());
        self.finalize(
            &item,
            JobStatus::Failed,
            Some("encoder stopped without reporting an outcome".to_string()),
            elapsed,
        )
        .await;
    }

    /// Records a terminal outcome. The queue item is completed even when the
    /// store cannot be updated.
    async fn finalize(
        &self,
        item: &WorkItem,
        status: JobStatus,
        message: Option<String>,
        elapsed_secs: Option<f64>,
    ) {
        let job_id = item.job_id.as_str();
        self.processes.remove(job_id);
        self.update_in_progress();

        if status != JobStatus::Succeeded {
            remove_partial_output(job_id, &item.output_path).await;
        }

        match self
            .store
            .update_job(job_id, &JobUpdate::finished(status, message.clone()))
            .await
        {
            Ok(job) => self.rollup(&job.batch_id).await,
            Err(e) => error!(job_id = %job_id, error = %e, "Failed to record job outcome"),
        }

        if let Err(e) = self.queue.complete(item).await {
            error!(job_id = %job_id, error = %e, "Failed to complete work item");
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_finished(status, elapsed_secs);
        }

        match message {
            Some(message) => info!(job_id = %job_id, %status, error = %message, "Job finished"),
            None => info!(job_id = %job_id, %status, "Job finished"),
        }
    }

    /// Recomputes a batch's status from its jobs.
    pub(crate) async fn rollup(&self, batch_id: &str) {
        let _guard = self.rollup_lock.lock().await;
        match store::rollup_batch(self.store.as_ref(), batch_id).await {
            Ok(batch) => debug!(batch_id = %batch_id, status = %batch.status, "Batch rolled up"),
            Err(e) => error!(batch_id = %batch_id, error = %e, "Failed to roll up batch"),
        }
    }

    fn update_in_progress(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.set_jobs_in_progress(self.processes.len());
        }
    }

    /// Kills a job's encoder. Returns false when the job has no live process.
    pub fn abort(&self, job_id: &str) -> bool {
        self.processes
            .get(job_id)
            .map(|handle| handle.abort())
            .unwrap_or(false)
    }

    /// Pauses a job's encoder. Returns false when the job has no live process.
    pub fn suspend(&self, job_id: &str) -> Result<bool, EncoderError> {
        match self.processes.get(job_id) {
            Some(handle) => handle.suspend().map(|()| true),
            None => Ok(false),
        }
    }

    /// Continues a paused encoder. Returns false when the job has no live process.
    pub fn resume(&self, job_id: &str) -> Result<bool, EncoderError> {
        match self.processes.get(job_id) {
            Some(handle) => handle.resume().map(|()| true),
            None => Ok(false),
        }
    }

    /// Current queue contents, active items first.
    pub async fn inspect(&self) -> Result<Vec<QueuedItem>, QueueError> {
        let items = self.queue.list().await?;
        if let Some(metrics) = &self.metrics {
            metrics.set_queue_depth(items.len());
        }
        Ok(items)
    }

    /// Job ids with a live encoder process.
    pub fn running(&self) -> Vec<String> {
        self.processes.job_ids()
    }

    /// Aborts every live process and purges the queue. Returns the number of
    /// queue items removed.
    pub async fn reset(&self) -> Result<usize, QueueError> {
        for handle in self.processes.drain() {
            handle.abort();
        }
        self.update_in_progress();

        let removed = self.queue.reset().await?;
        warn!(removed, "Queue reset");
        Ok(removed)
    }

    /// Repairs what a worker that stopped mid-encode left behind. Active
    /// queue items with no live process here are completed, and their jobs
    /// plus any job stored as processing without a live process are failed.
    /// Returns how many jobs were failed.
    pub async fn reconcile(&self) -> Result<usize, StoreError> {
        let mut repaired = 0;

        let orphaned = match self.queue.list().await {
            Ok(items) => items,
            Err(e) => {
                warn!(error = %e, "Failed to list queue items; only stored jobs are reconciled");
                Vec::new()
            }
        };
        for queued in orphaned {
            let item = queued.item;
            if queued.state != ItemState::Active || self.processes.contains(&item.job_id) {
                continue;
            }

            match self.store.get_job(&item.job_id).await {
                Ok(job) if !job.status.is_terminal() => {
                    self.fail_interrupted(&job).await?;
                    repaired += 1;
                }
                Ok(_) => {}
                Err(StoreError::JobNotFound { .. }) => {
                    warn!(job_id = %item.job_id, "Queue item for unknown job");
                }
                Err(e) => return Err(e),
            }

            if let Err(e) = self.queue.complete(&item).await {
                error!(job_id = %item.job_id, error = %e, "Failed to complete orphaned work item");
            }
        }

        for job in self.store.jobs_with_status(JobStatus::Processing).await? {
            if self.processes.contains(&job.id) {
                continue;
            }
            self.fail_interrupted(&job).await?;
            repaired += 1;
        }

        if repaired > 0 {
            info!(repaired, "Reconciled interrupted jobs");
        }
        Ok(repaired)
    }

    async fn fail_interrupted(&self, job: &Job) -> Result<(), StoreError> {
        remove_partial_output(&job.id, &job.output_path).await;
        self.store
            .update_job(
                &job.id,
                &JobUpdate::finished(
                    JobStatus::Failed,
                    Some("interrupted before completion".to_string()),
                ),
            )
            .await?;
        self.rollup(&job.batch_id).await;

        warn!(job_id = %job.id, batch_id = %job.batch_id, "Failed interrupted job");
        Ok(())
    }
}

async fn remove_partial_output(job_id: &str, path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(job_id = %job_id, path = ?path, "Removed partial output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(job_id = %job_id, path = ?path, error = %e, "Failed to remove partial output"),
    }
}
