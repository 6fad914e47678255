use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

use crate::error::{CompletionError, TransportError};
use crate::model::{Task, TaskKind, TaskOutput};
use crate::queue::QueueName;

pub(crate) type TaskResult = Result<TaskOutput, TransportError>;

/// A task travelling through a queue together with its completion channel.
#[derive(Debug)]
pub(crate) struct QueuedTask {
    pub(crate) task: Task,
    pub(crate) completion: oneshot::Sender<TaskResult>,
}

/// Handle to the outcome of an accepted task.
///
/// Dropping it leaves the task running; the outcome is discarded.
#[derive(Debug)]
pub struct Completion {
    kind: TaskKind,
    queue: QueueName,
    receiver: oneshot::Receiver<TaskResult>,
    runtime: Handle,
}

impl Completion {
    pub(crate) fn new(
        kind: TaskKind,
        queue: QueueName,
        receiver: oneshot::Receiver<TaskResult>,
        runtime: Handle,
    ) -> Self {
        Self {
            kind,
            queue,
            receiver,
            runtime,
        }
    }

    /// Operation carried by the task.
    #[must_use]
    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    /// Queue the task was accepted on.
    #[must_use]
    pub fn queue(&self) -> QueueName {
        self.queue
    }

    /// Blocks until a worker has processed the task.
    ///
    /// Must not be called from inside an async runtime.
    ///
    /// # Errors
    ///
    /// Returns [`CompletionError::Failed`] with the transport error the worker
    /// observed, or [`CompletionError::Dropped`] if the worker exited first.
    pub fn wait(self) -> Result<TaskOutput, CompletionError> {
        let result = self
            .receiver
            .blocking_recv()
            .map_err(|_| CompletionError::Dropped)?;
        Ok(result?)
    }

    /// Like [`Completion::wait`], but gives up after `timeout`.
    ///
    /// Timing out does not cancel the task.
    ///
    /// # Errors
    ///
    /// Returns [`CompletionError::TimedOut`] when the bound elapses, plus the
    /// errors of [`Completion::wait`].
    pub fn wait_timeout(mut self, timeout: Duration) -> Result<TaskOutput, CompletionError> {
        match self.receiver.try_recv() {
            Ok(result) => return Ok(result?),
            Err(TryRecvError::Closed) => return Err(CompletionError::Dropped),
            Err(TryRecvError::Empty) => {}
        }

        let Self {
            mut receiver,
            runtime,
            ..
        } = self;
        let received =
            runtime.block_on(async { tokio::time::timeout(timeout, &mut receiver).await });
        match received {
            Ok(Ok(result)) => Ok(result?),
            Ok(Err(_)) => Err(CompletionError::Dropped),
            Err(_) => Err(CompletionError::TimedOut { timeout }),
        }
    }
}
