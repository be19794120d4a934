//! Redis queue operations.

use async_trait::async_trait;
use redis::AsyncCommands;

use super::item::{ItemState, QueuedItem, WorkItem};
use super::QueueTransport;
use crate::error::QueueError;

const QUEUE_KEY: &str = "transcode:queue";
const ACTIVE_KEY: &str = "transcode:active";
const PROGRESS_KEY: &str = "transcode:progress";
const ABORT_KEY: &str = "transcode:abort";
const ITEM_PREFIX: &str = "transcode:item:";

fn item_key(item_id: &str) -> String {
    format!("{}{}", ITEM_PREFIX, item_id)
}

/// Manages the transcode queue in Redis.
#[derive(Clone)]
pub struct RedisQueue {
    connection: redis::aio::ConnectionManager,
}

impl RedisQueue {
    /// Creates a new RedisQueue connected to the specified Redis URL.
    pub async fn new(redis_url: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url).map_err(|e| QueueError::ConnectionFailed {
            url: redis_url.to_string(),
            message: e.to_string(),
        })?;

        let connection = client
            .get_connection_manager()
            .await
            .map_err(|e| QueueError::ConnectionFailed {
                url: redis_url.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self { connection })
    }

    /// Gets an item by its ID.
    async fn get_item(&self, item_id: &str) -> Result<Option<WorkItem>, QueueError> {
        let mut conn = self.connection.clone();
        let item_json: Option<String> = conn
            .get(item_key(item_id))
            .await
            .map_err(|e| QueueError::DequeueFailed(e.to_string()))?;

        match item_json {
            Some(json) => {
                let item: WorkItem = serde_json::from_str(&json)
                    .map_err(|e| QueueError::SerializationFailed(e.to_string()))?;
                Ok(Some(item))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl QueueTransport for RedisQueue {
    async fn enqueue(&self, item: &WorkItem) -> Result<(), QueueError> {
        let item_json =
            serde_json::to_string(item).map_err(|e| QueueError::SerializationFailed(e.to_string()))?;

        let mut conn = self.connection.clone();

        // Store the item data, then make it visible to workers
        redis::pipe()
            .atomic()
            .set(item_key(&item.id), &item_json)
            .ignore()
            .rpush(QUEUE_KEY, &item.id)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| QueueError::EnqueueFailed(e.to_string()))?;

        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<WorkItem>, QueueError> {
        let mut conn = self.connection.clone();
        let item_id: Option<String> = conn
            .lpop(QUEUE_KEY, None)
            .await
            .map_err(|e| QueueError::DequeueFailed(e.to_string()))?;

        let item_id = match item_id {
            Some(id) => id,
            None => return Ok(None),
        };

        // Add to active set
        conn.sadd::<_, _, ()>(ACTIVE_KEY, &item_id)
            .await
            .map_err(|e| QueueError::DequeueFailed(e.to_string()))?;

        self.get_item(&item_id).await
    }

    async fn progress(&self, item: &WorkItem, percent: u8) -> Result<(), QueueError> {
        let mut conn = self.connection.clone();
        conn.hset::<_, _, _, ()>(PROGRESS_KEY, &item.id, percent.min(100))
            .await
            .map_err(|e| QueueError::UpdateFailed(e.to_string()))?;
        Ok(())
    }

    async fn complete(&self, item: &WorkItem) -> Result<(), QueueError> {
        let mut conn = self.connection.clone();
        redis::pipe()
            .atomic()
            .srem(ACTIVE_KEY, &item.id)
            .ignore()
            .hdel(PROGRESS_KEY, &item.id)
            .ignore()
            .del(item_key(&item.id))
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| QueueError::UpdateFailed(e.to_string()))?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<QueuedItem>, QueueError> {
        let mut conn = self.connection.clone();
        let active_ids: Vec<String> = conn
            .smembers(ACTIVE_KEY)
            .await
            .map_err(|e| QueueError::DequeueFailed(e.to_string()))?;
        let waiting_ids: Vec<String> = conn
            .lrange(QUEUE_KEY, 0, -1)
            .await
            .map_err(|e| QueueError::DequeueFailed(e.to_string()))?;

        let mut active = Vec::new();
        for id in active_ids {
            if let Some(item) = self.get_item(&id).await? {
                let progress: Option<u8> = conn
                    .hget(PROGRESS_KEY, &id)
                    .await
                    .map_err(|e| QueueError::DequeueFailed(e.to_string()))?;
                active.push(QueuedItem {
                    item,
                    state: ItemState::Active,
                    progress,
                });
            }
        }
        active.sort_by_key(|q| q.item.enqueued_at);

        let mut items = active;
        for id in waiting_ids {
            if let Some(item) = self.get_item(&id).await? {
                items.push(QueuedItem {
                    item,
                    state: ItemState::Waiting,
                    progress: None,
                });
            }
        }
        Ok(items)
    }

    async fn reset(&self) -> Result<usize, QueueError> {
        let mut conn = self.connection.clone();
        let (waiting, active): (Vec<String>, Vec<String>) = redis::pipe()
            .lrange(QUEUE_KEY, 0, -1)
            .smembers(ACTIVE_KEY)
            .query_async(&mut conn)
            .await
            .map_err(|e| QueueError::UpdateFailed(e.to_string()))?;

        let removed = waiting.len() + active.len();

        let mut pipe = redis::pipe();
        pipe.atomic();
        for id in waiting.iter().chain(active.iter()) {
            pipe.del(item_key(id)).ignore();
        }
        pipe.del(&[QUEUE_KEY, ACTIVE_KEY, PROGRESS_KEY][..])
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| QueueError::UpdateFailed(e.to_string()))?;

        Ok(removed)
    }

    async fn request_abort(&self, job_id: &str) -> Result<(), QueueError> {
        let mut conn = self.connection.clone();
        conn.rpush::<_, _, ()>(ABORT_KEY, job_id)
            .await
            .map_err(|e| QueueError::EnqueueFailed(e.to_string()))?;
        Ok(())
    }

    async fn take_abort_requests(&self) -> Result<Vec<String>, QueueError> {
        let mut conn = self.connection.clone();
        let (requests,): (Vec<String>,) = redis::pipe()
            .atomic()
            .lrange(ABORT_KEY, 0, -1)
            .del(ABORT_KEY)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(|e| QueueError::DequeueFailed(e.to_string()))?;
        Ok(requests)
    }
}
