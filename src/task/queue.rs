//! FIFO work queue shared by every worker.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use super::TaskId;

/// Unbounded FIFO of task ids.
///
/// Any number of producers can push; consumers take turns on the shared
/// receiver, so each id is handed to exactly one worker.
#[derive(Clone)]
pub struct TaskQueue {
    sender: mpsc::UnboundedSender<TaskId>,
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<TaskId>>>,
}

impl TaskQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
        }
    }

    pub fn push(&self, id: TaskId) {
        // The queue owns its receiver, so the channel cannot be closed here.
        if self.sender.send(id).is_err() {
            tracing::error!(task_id = %id, "Task queue closed, dropping task");
        }
    }

    /// Wait for the next id. Cancel-safe: nothing is lost if the future is dropped.
    pub async fn pop(&self) -> Option<TaskId> {
        self.receiver.lock().await.recv().await
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn is_drained(queue: &TaskQueue) -> bool {
        tokio::time::timeout(Duration::from_millis(20), queue.pop())
            .await
            .is_err()
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = TaskQueue::new();
        let ids: Vec<TaskId> = (0..3).map(|_| TaskId::new()).collect();
        for id in &ids {
            queue.push(*id);
        }
        for id in &ids {
            assert_eq!(queue.pop().await, Some(*id));
        }
        assert!(is_drained(&queue).await);
    }

    #[tokio::test]
    async fn test_clones_share_one_channel() {
        let producer = TaskQueue::new();
        let consumer = producer.clone();
        let id = TaskId::new();
        producer.push(id);
        assert_eq!(consumer.pop().await, Some(id));
        assert!(is_drained(&producer).await);
    }
}
