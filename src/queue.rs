use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use strum_macros::{Display, EnumIter};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::ControlError;

/// Identifies one of the engine's two task queues.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum QueueName {
    /// Connection-lifecycle operations and acknowledged writes.
    Ordered,
    /// Write-without-response operations.
    Fast,
}

/// Producer half of a FIFO task queue with explicit close semantics.
///
/// Closing drops the only sender, so the consumer still receives every item
/// pushed before the close and then observes end-of-stream.
#[derive(Debug)]
pub struct TaskQueue<T> {
    name: QueueName,
    sender: Mutex<Option<mpsc::UnboundedSender<T>>>,
    accepted: AtomicU64,
}

/// Consumer half of a [`TaskQueue`].
#[derive(Debug)]
pub struct TaskReceiver<T> {
    name: QueueName,
    receiver: mpsc::UnboundedReceiver<T>,
}

/// Creates a connected queue and receiver pair.
///
/// ```
/// use blectl::{QueueName, task_queue};
///
/// let (queue, mut receiver) = task_queue::<u32>(QueueName::Ordered);
/// queue.push(7)?;
/// queue.close();
/// assert_eq!(Some(7), receiver.pop());
/// assert_eq!(None, receiver.pop());
/// # Ok::<(), blectl::ControlError>(())
/// ```
#[must_use]
pub fn task_queue<T>(name: QueueName) -> (TaskQueue<T>, TaskReceiver<T>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (
        TaskQueue {
            name,
            sender: Mutex::new(Some(sender)),
            accepted: AtomicU64::new(0),
        },
        TaskReceiver { name, receiver },
    )
}

impl<T> TaskQueue<T> {
    /// Returns which queue this is.
    #[must_use]
    pub fn name(&self) -> QueueName {
        self.name
    }

    /// Appends `item` to the tail of the queue.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::QueueClosed`] if the queue has been closed or its
    /// consumer is gone; the item is discarded.
    pub fn push(&self, item: T) -> Result<(), ControlError> {
        let closed = || ControlError::QueueClosed { queue: self.name };
        let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let sender = guard.as_ref().ok_or_else(closed)?;
        sender.send(item).map_err(|_| closed())?;
        drop(guard);

        self.accepted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Closes the queue. Returns `true` only for the call that closed it.
    pub fn close(&self) -> bool {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let closed_now = sender.is_some();
        if closed_now {
            debug!(queue = %self.name, "task queue closed");
        }
        closed_now
    }

    /// Returns whether [`TaskQueue::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Number of items accepted so far.
    #[must_use]
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }
}

impl<T> TaskReceiver<T> {
    /// Returns which queue this receiver drains.
    #[must_use]
    pub fn name(&self) -> QueueName {
        self.name
    }

    /// Blocks until an item is available, or returns `None` once the queue is
    /// closed and every earlier item has been delivered.
    ///
    /// Must not be called from inside an async runtime.
    pub fn pop(&mut self) -> Option<T> {
        self.receiver.blocking_recv()
    }
}
