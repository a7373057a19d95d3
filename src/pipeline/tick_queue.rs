// src/pipeline/tick_queue.rs
//
// Bounded FIFO between a live session's callers and its worker task.
// When full, the oldest pending item is evicted and handed back to the
// producer so its caller can be told the tick was dropped.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;
use tracing::warn;

struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

pub struct TickQueue<T> {
    state: Mutex<QueueState<T>>,
    notify: Notify,
    max_pending: usize,
}

impl<T> TickQueue<T> {
    pub fn new(max_pending: usize) -> Self {
        let max_pending = max_pending.max(1);
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(max_pending),
                closed: false,
            }),
            notify: Notify::new(),
            max_pending,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        // A panic while holding the lock cannot leave the deque inconsistent
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Enqueues `item`. Returns the evicted oldest item when the queue was
    /// full, or gives `item` back if the queue is closed.
    pub fn push(&self, item: T) -> Result<Option<T>, T> {
        let evicted = {
            let mut state = self.lock();
            if state.closed {
                return Err(item);
            }
            let evicted = if state.items.len() >= self.max_pending {
                warn!(
                    "Tick queue full ({} pending), dropping oldest",
                    self.max_pending
                );
                state.items.pop_front()
            } else {
                None
            };
            state.items.push_back(item);
            evicted
        };
        self.notify.notify_one();
        Ok(evicted)
    }

    /// Waits for the next item. Returns None once the queue is closed and
    /// drained.
    pub async fn pop(&self) -> Option<T> {
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.lock();
                if let Some(item) = state.items.pop_front() {
                    return Some(item);
                }
                if state.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Stops accepting items. Items already queued are still delivered.
    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    /// Closes the queue and takes everything still pending.
    pub fn close_and_drain(&self) -> Vec<T> {
        let drained = {
            let mut state = self.lock();
            state.closed = true;
            state.items.drain(..).collect()
        };
        self.notify.notify_waiters();
        drained
    }

    pub fn pending_count(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_full_queue_evicts_oldest() {
        let queue = TickQueue::new(2);
        assert_eq!(queue.push(1), Ok(None));
        assert_eq!(queue.push(2), Ok(None));
        assert_eq!(queue.push(3), Ok(Some(1)));
        assert_eq!(queue.pending_count(), 2);
    }

    #[test]
    fn test_closed_queue_rejects() {
        let queue = TickQueue::new(2);
        queue.close();
        assert_eq!(queue.push(7), Err(7));
    }

    #[tokio::test]
    async fn test_pop_in_order_then_none_after_close() {
        let queue = Arc::new(TickQueue::new(4));
        queue.push("a").unwrap();
        queue.push("b").unwrap();
        queue.close();
        assert_eq!(queue.pop().await, Some("a"));
        assert_eq!(queue.pop().await, Some("b"));
        assert_eq!(queue.pop().await, None);
    }

    #[tokio::test]
    async fn test_pop_waits_for_push() {
        let queue = Arc::new(TickQueue::new(4));
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.pop().await })
        };
        tokio::task::yield_now().await;
        queue.push(42).unwrap();
        assert_eq!(consumer.await.unwrap(), Some(42));
    }

    #[test]
    fn test_close_and_drain_takes_pending() {
        let queue = TickQueue::new(4);
        queue.push(1).unwrap();
        queue.push(2).unwrap();
        assert_eq!(queue.close_and_drain(), vec![1, 2]);
        assert_eq!(queue.pending_count(), 0);
        assert_eq!(queue.push(3), Err(3));
    }
}
