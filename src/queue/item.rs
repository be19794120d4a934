//! Queued work item definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// One unit of work: transcode a job's input into its output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Unique identifier of this queue entry.
    pub id: String,

    /// Job this item transcodes.
    pub job_id: String,

    /// Path to the uploaded input.
    pub input_path: PathBuf,

    /// Path the output is written to.
    pub output_path: PathBuf,

    /// Output options as submitted (JSON).
    pub options: String,

    /// Timestamp when the item was enqueued.
    pub enqueued_at: DateTime<Utc>,
}

impl WorkItem {
    pub fn new(job_id: String, input_path: PathBuf, output_path: PathBuf, options: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            job_id,
            input_path,
            output_path,
            options,
            enqueued_at: Utc::now(),
        }
    }
}

/// Where an item sits in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    /// Waiting for a worker slot.
    Waiting,
    /// Handed to a worker.
    Active,
}

/// Snapshot of a queue entry for inspection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueuedItem {
    pub item: WorkItem,
    pub state: ItemState,
    /// Last reported whole-number progress.
    pub progress: Option<u8>,
}
