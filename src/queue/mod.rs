//! Work queue between submission and the transcoder worker.

pub mod item;
pub mod memory;
pub mod redis;

use async_trait::async_trait;

use crate::error::QueueError;

pub use self::redis::RedisQueue;
pub use item::{ItemState, QueuedItem, WorkItem};
pub use memory::MemoryQueue;

/// FIFO transport of work items.
///
/// Items move from waiting to active on dequeue and leave the queue on
/// `complete`, whatever the outcome. There is no retry at this level.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QueueTransport: Send + Sync {
    async fn enqueue(&self, item: &WorkItem) -> Result<(), QueueError>;

    /// Takes the oldest waiting item and marks it active.
    async fn dequeue(&self) -> Result<Option<WorkItem>, QueueError>;

    /// Records whole-number progress for an active item.
    async fn progress(&self, item: &WorkItem, percent: u8) -> Result<(), QueueError>;

    /// Removes a finished item from the queue.
    async fn complete(&self, item: &WorkItem) -> Result<(), QueueError>;

    /// Active items followed by waiting items in queue order.
    async fn list(&self) -> Result<Vec<QueuedItem>, QueueError>;

    /// Drops every item, waiting or active. Returns how many were removed.
    async fn reset(&self) -> Result<usize, QueueError>;

    /// Asks whichever worker runs a job to abort it.
    async fn request_abort(&self, job_id: &str) -> Result<(), QueueError>;

    /// Drains pending abort requests.
    async fn take_abort_requests(&self) -> Result<Vec<String>, QueueError>;
}
