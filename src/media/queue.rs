//! In-memory FIFO of media identifiers waiting to be liked

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// Unbounded FIFO shared by the producer and the consumer
///
/// Not persisted; whatever is queued is lost on restart.
#[derive(Debug)]
pub struct MediaQueue {
    items: Mutex<VecDeque<String>>,
    poll_interval: Duration,
}

impl MediaQueue {
    /// Creates an empty queue
    ///
    /// # Arguments
    ///
    /// * `poll_interval` - How often [`pop`](Self::pop) re-checks an empty queue
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            poll_interval,
        }
    }

    pub fn len(&self) -> usize {
        self.with_items(|items| items.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends identifiers that are not already queued
    ///
    /// # Returns
    ///
    /// The number of identifiers appended.
    pub fn extend<I>(&self, media: I) -> usize
    where
        I: IntoIterator<Item = String>,
    {
        self.with_items(|items| {
            let before = items.len();
            for id in media {
                if !items.contains(&id) {
                    items.push_back(id);
                }
            }
            items.len() - before
        })
    }

    /// Removes the head of the queue, if any
    pub fn try_pop(&self) -> Option<String> {
        self.with_items(|items| items.pop_front())
    }

    /// Removes the head of the queue, waiting for one to arrive if empty
    pub async fn pop(&self) -> String {
        loop {
            if let Some(id) = self.try_pop() {
                return id;
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    fn with_items<T>(&self, f: impl FnOnce(&mut VecDeque<String>) -> T) -> T {
        match self.items.lock() {
            Ok(mut items) => f(&mut items),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}
