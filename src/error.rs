//! Error types for the batch transcoder.

use std::path::PathBuf;
use thiserror::Error;

use crate::store::JobStatus;
use crate::validation::ValidationResult;

/// Configuration loading and parsing errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {message}")]
    ParseFailed { path: PathBuf, message: String },

    #[error("Config validation failed with {error_count} error(s)")]
    ValidationFailed { error_count: usize },
}

/// Requested output options rejected by the capability registry.
#[derive(Error, Debug)]
pub enum CapabilityError {
    #[error("Output options rejected with {} error(s)", .0.error_count())]
    Rejected(ValidationResult),

    #[error("Malformed output options: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Queue transport errors.
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Failed to connect to Redis at '{url}': {message}")]
    ConnectionFailed { url: String, message: String },

    #[error("Failed to enqueue item: {0}")]
    EnqueueFailed(String),

    #[error("Failed to dequeue item: {0}")]
    DequeueFailed(String),

    #[error("Failed to update item: {0}")]
    UpdateFailed(String),

    #[error("Failed to serialize item: {0}")]
    SerializationFailed(String),
}

/// Document store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to connect to Redis at '{url}': {message}")]
    ConnectionFailed { url: String, message: String },

    #[error("Store command failed: {0}")]
    CommandFailed(String),

    #[error("Failed to serialize record: {0}")]
    SerializationFailed(String),

    #[error("Job not found: {job_id}")]
    JobNotFound { job_id: String },

    #[error("Batch not found: {batch_id}")]
    BatchNotFound { batch_id: String },
}

impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        StoreError::CommandFailed(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::SerializationFailed(e.to_string())
    }
}

/// Encoder process errors.
#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("Probe failed for '{path}': {message}")]
    ProbeFailed { path: PathBuf, message: String },

    #[error("FFmpeg failed with exit code {code}: {stderr}")]
    FfmpegFailed { code: i32, stderr: String },

    #[error("Process spawn failed: {0}")]
    SpawnFailed(String),

    #[error("Cannot {action} an encoder process in state {status}")]
    InvalidTransition {
        action: &'static str,
        status: crate::encoder::ProcessStatus,
    },

    #[error("Process control failed: {0}")]
    Signal(String),

    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),
}

/// Errors surfaced at the submission boundary.
#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("Malformed output options: {0}")]
    MalformedOptions(#[from] serde_json::Error),

    #[error("Output options rejected with {} error(s)", .0.error_count())]
    Invalid(ValidationResult),

    #[error("No input files were submitted")]
    NoFiles,

    #[error("Input file '{path}' is not readable: {source}")]
    MissingFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Job {job_id} has no downloadable output (status: {status})")]
    NotReady { job_id: String, status: JobStatus },

    #[error("{0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Queue(#[from] QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SubmitError {
    /// Returns true when the caller sent something unacceptable (4xx-class),
    /// as opposed to an infrastructure failure.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            SubmitError::MalformedOptions(_)
                | SubmitError::Invalid(_)
                | SubmitError::NoFiles
                | SubmitError::MissingFile { .. }
                | SubmitError::NotReady { .. }
                | SubmitError::Store(StoreError::JobNotFound { .. })
                | SubmitError::Store(StoreError::BatchNotFound { .. })
        )
    }
}

impl From<CapabilityError> for SubmitError {
    fn from(e: CapabilityError) -> Self {
        match e {
            CapabilityError::Rejected(result) => SubmitError::Invalid(result),
            CapabilityError::Malformed(e) => SubmitError::MalformedOptions(e),
        }
    }
}

/// Metrics export errors.
#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("Prometheus metrics export failed: {0}")]
    PrometheusFailed(String),
}
