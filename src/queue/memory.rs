//! In-process queue.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::item::{ItemState, QueuedItem, WorkItem};
use super::QueueTransport;
use crate::error::QueueError;

#[derive(Debug, Default)]
struct Inner {
    waiting: VecDeque<WorkItem>,
    active: Vec<WorkItem>,
    progress: HashMap<String, u8>,
    aborts: Vec<String>,
}

#[derive(Debug, Default)]
pub struct MemoryQueue {
    inner: Mutex<Inner>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueTransport for MemoryQueue {
    async fn enqueue(&self, item: &WorkItem) -> Result<(), QueueError> {
        self.inner.lock().await.waiting.push_back(item.clone());
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<WorkItem>, QueueError> {
        let mut inner = self.inner.lock().await;
        let item = inner.waiting.pop_front();
        if let Some(item) = &item {
            inner.active.push(item.clone());
        }
        Ok(item)
    }

    async fn progress(&self, item: &WorkItem, percent: u8) -> Result<(), QueueError> {
        self.inner
            .lock()
            .await
            .progress
            .insert(item.id.clone(), percent.min(100));
        Ok(())
    }

    async fn complete(&self, item: &WorkItem) -> Result<(), QueueError> {
        let mut inner = self.inner.lock().await;
        inner.active.retain(|i| i.id != item.id);
        inner.progress.remove(&item.id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<QueuedItem>, QueueError> {
        let inner = self.inner.lock().await;
        let active = inner.active.iter().map(|item| QueuedItem {
            item: item.clone(),
            state: ItemState::Active,
            progress: inner.progress.get(&item.id).copied(),
        });
        let waiting = inner.waiting.iter().map(|item| QueuedItem {
            item: item.clone(),
            state: ItemState::Waiting,
            progress: None,
        });
        Ok(active.chain(waiting).collect())
    }

    async fn reset(&self) -> Result<usize, QueueError> {
        let mut inner = self.inner.lock().await;
        let removed = inner.waiting.len() + inner.active.len();
        *inner = Inner::default();
        Ok(removed)
    }

    async fn request_abort(&self, job_id: &str) -> Result<(), QueueError> {
        self.inner.lock().await.aborts.push(job_id.to_string());
        Ok(())
    }

    async fn take_abort_requests(&self) -> Result<Vec<String>, QueueError> {
        Ok(std::mem::take(&mut self.inner.lock().await.aborts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(job: &str) -> WorkItem {
        WorkItem::new(job.into(), "/in".into(), "/out".into(), "{}".into())
    }

    #[tokio::test]
    async fn fifo_with_active_tracking() {
        let queue = MemoryQueue::new();
        queue.enqueue(&item("j1")).await.unwrap();
        queue.enqueue(&item("j2")).await.unwrap();

        let first = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(first.job_id, "j1");
        queue.progress(&first, 42).await.unwrap();

        let listed = queue.list().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].state, ItemState::Active);
        assert_eq!(listed[0].progress, Some(42));
        assert_eq!(listed[1].item.job_id, "j2");
        assert_eq!(listed[1].state, ItemState::Waiting);

        queue.complete(&first).await.unwrap();
        assert_eq!(queue.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_queue_dequeues_none() {
        assert!(MemoryQueue::new().dequeue().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reset_counts_everything() {
        let queue = MemoryQueue::new();
        for job in ["a", "b", "c"] {
            queue.enqueue(&item(job)).await.unwrap();
        }
        queue.dequeue().await.unwrap();

        assert_eq!(queue.reset().await.unwrap(), 3);
        assert!(queue.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn abort_requests_drain_once() {
        let queue = MemoryQueue::new();
        queue.request_abort("j1").await.unwrap();
        assert_eq!(queue.take_abort_requests().await.unwrap(), vec!["j1".to_string()]);
        assert!(queue.take_abort_requests().await.unwrap().is_empty());
    }
}
