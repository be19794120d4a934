//! Batch and job records.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status shared by jobs and batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created but not yet queued.
    Default,
    /// Queued, waiting for a worker slot.
    Waiting,
    /// ffmpeg is running.
    Processing,
    /// Output is ready for download.
    Succeeded,
    /// Probe, validation or encode failed.
    Failed,
    /// Killed on request.
    Aborted,
}

impl JobStatus {
    pub const ALL: [JobStatus; 6] = [
        JobStatus::Default,
        JobStatus::Waiting,
        JobStatus::Processing,
        JobStatus::Succeeded,
        JobStatus::Failed,
        JobStatus::Aborted,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Default => "default",
            JobStatus::Waiting => "waiting",
            JobStatus::Processing => "processing",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Aborted => "aborted",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Aborted
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A group of jobs submitted together with one set of output options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub id: String,
    pub status: JobStatus,
    /// Output options exactly as submitted (JSON).
    pub params: String,
    /// Submitting owner. Never part of public views.
    pub owner_id: String,
    /// Member jobs in submission order. Fixed at creation.
    pub job_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Batch {
    pub fn new(params: String, owner_id: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            status: JobStatus::Waiting,
            params,
            owner_id,
            job_ids: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Recomputes the aggregate status from member job statuses.
    ///
    /// Once every job is terminal the batch is `Succeeded` if all succeeded,
    /// `Failed` if any failed and `Aborted` otherwise. While some jobs remain
    /// and any job has left `Waiting`, the batch is `Processing`. Returns
    /// true when the status changed.
    pub fn rollup(&mut self, statuses: &[JobStatus]) -> bool {
        if statuses.is_empty() {
            return false;
        }

        let previous = self.status;
        let now = Utc::now();

        if statuses.iter().all(|s| s.is_terminal()) {
            self.status = if statuses.iter().all(|s| *s == JobStatus::Succeeded) {
                JobStatus::Succeeded
            } else if statuses.contains(&JobStatus::Failed) {
                JobStatus::Failed
            } else {
                JobStatus::Aborted
            };
            self.finished_at.get_or_insert(now);
        } else if statuses
            .iter()
            .any(|s| !matches!(s, JobStatus::Default | JobStatus::Waiting))
        {
            self.status = JobStatus::Processing;
            self.started_at.get_or_insert(now);
            self.finished_at = None;
        }

        self.status != previous
    }
}

/// One input file within a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub batch_id: String,
    pub status: JobStatus,
    /// Original file name of the upload.
    pub title: String,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl Job {
    /// Creates a job in `Waiting`, ready to be queued.
    pub fn new(batch_id: &str, title: String, input_path: PathBuf, output_path: PathBuf) -> Self {
        Self::with_id(
            Uuid::new_v4().to_string(),
            batch_id,
            title,
            input_path,
            output_path,
        )
    }

    /// Creates a job with a caller-chosen id. Upload and output paths are
    /// derived from the id, so callers allocate it first.
    pub fn with_id(
        id: String,
        batch_id: &str,
        title: String,
        input_path: PathBuf,
        output_path: PathBuf,
    ) -> Self {
        Self {
            id,
            batch_id: batch_id.to_string(),
            status: JobStatus::Waiting,
            title,
            input_path,
            output_path,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            error_message: None,
        }
    }

    pub fn apply(&mut self, update: &JobUpdate) {
        self.status = update.status;
        if let Some(at) = update.started_at {
            self.started_at = Some(at);
        }
        if let Some(at) = update.finished_at {
            self.finished_at = Some(at);
        }
        if let Some(message) = &update.error_message {
            self.error_message = Some(message.clone());
        }
    }
}

/// A status change for a stored job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobUpdate {
    pub status: JobStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl JobUpdate {
    /// Job picked up by an encoder.
    pub fn started() -> Self {
        Self {
            status: JobStatus::Processing,
            started_at: Some(Utc::now()),
            finished_at: None,
            error_message: None,
        }
    }

    /// Job reached a terminal status.
    pub fn finished(status: JobStatus, error_message: Option<String>) -> Self {
        Self {
            status,
            started_at: None,
            finished_at: Some(Utc::now()),
            error_message,
        }
    }
}

/// One-based page selector for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: usize,
    pub per_page: usize,
}

impl Page {
    pub fn new(number: usize, per_page: usize) -> Self {
        Self {
            number: number.max(1),
            per_page: per_page.max(1),
        }
    }

    /// Index of the first item on this page.
    pub fn offset(&self) -> usize {
        (self.number - 1) * self.per_page
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(1, 20)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use JobStatus::*;

    fn batch() -> Batch {
        Batch::new(r#"{"format":"mp3"}"#.into(), "owner".into())
    }

    #[test]
    fn new_batch_waits() {
        let batch = batch();
        assert_eq!(batch.status, Waiting);
        assert!(batch.started_at.is_none());
    }

    #[test]
    fn rollup_tracks_progress() {
        let mut batch = batch();
        assert!(!batch.rollup(&[Waiting, Waiting]));

        assert!(batch.rollup(&[Processing, Waiting]));
        assert_eq!(batch.status, Processing);
        let started = batch.started_at;
        assert!(started.is_some());

        // One done, one still queued
        assert!(!batch.rollup(&[Succeeded, Waiting]));
        assert_eq!(batch.status, Processing);
        assert_eq!(batch.started_at, started);
    }

    #[test]
    fn rollup_terminal_outcomes() {
        let mut all_ok = batch();
        all_ok.rollup(&[Succeeded, Succeeded]);
        assert_eq!(all_ok.status, Succeeded);
        assert!(all_ok.finished_at.is_some());

        let mut one_failed = batch();
        one_failed.rollup(&[Succeeded, Failed, Aborted]);
        assert_eq!(one_failed.status, Failed);

        let mut aborted = batch();
        aborted.rollup(&[Succeeded, Aborted]);
        assert_eq!(aborted.status, Aborted);
    }

    #[test]
    fn job_apply_keeps_earlier_timestamps() {
        let mut job = Job::new("b1", "song.wav".into(), "/up/j".into(), "/out/j.mp3".into());
        assert_eq!(job.status, Waiting);

        job.apply(&JobUpdate::started());
        let started = job.started_at;
        assert_eq!(job.status, Processing);

        job.apply(&JobUpdate::finished(Failed, Some("exit code 1".into())));
        assert_eq!(job.status, Failed);
        assert_eq!(job.started_at, started);
        assert!(job.finished_at.is_some());
        assert_eq!(job.error_message.as_deref(), Some("exit code 1"));
    }

    #[test]
    fn status_wire_names() {
        assert_eq!(serde_json::to_string(&Succeeded).unwrap(), "\"succeeded\"");
        let parsed: JobStatus = serde_json::from_str("\"aborted\"").unwrap();
        assert_eq!(parsed, Aborted);
        assert_eq!(Processing.to_string(), "processing");
    }

    #[test]
    fn page_offsets() {
        assert_eq!(Page::new(0, 0), Page::new(1, 1));
        assert_eq!(Page::new(3, 10).offset(), 20);
    }
}
