use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{debug, instrument, trace, warn};

use super::completion::{QueuedTask, TaskResult};
use super::config::Radio;
use crate::error::TransportError;
use crate::hw::{GattTarget, Transport, WriteMode};
use crate::model::{Task, TaskKind, TaskOutput};
use crate::queue::TaskReceiver;
use crate::utils::format_hex;

const CONNECTION_THREAD_NAME: &str = "ble-connection";
const FAST_WRITE_THREAD_NAME: &str = "ble-fast-write";

/// Runs individual tasks against the engine's radio.
#[derive(Debug, Clone)]
pub(crate) struct TaskExecutor {
    radio: Radio,
    runtime: Handle,
    mock_connect_latency: Duration,
}

impl TaskExecutor {
    pub(crate) fn new(radio: Radio, runtime: Handle, mock_connect_latency: Duration) -> Self {
        Self {
            radio,
            runtime,
            mock_connect_latency,
        }
    }

    #[instrument(
        skip(self, task),
        level = "debug",
        fields(kind = %task.kind(), address = %task.address(), %mode)
    )]
    fn execute(&self, task: &Task, mode: WriteMode) -> TaskResult {
        if task.kind() == TaskKind::Write {
            trace!(payload = %format_hex(task.payload()), "write payload");
        }

        match &self.radio {
            Radio::Mock => Ok(self.simulate(task)),
            Radio::Live(transport) => self
                .runtime
                .block_on(dispatch(transport.as_ref(), task, mode)),
        }
    }

    fn simulate(&self, task: &Task) -> TaskOutput {
        match task.kind() {
            TaskKind::Connect => {
                thread::sleep(self.mock_connect_latency);
                TaskOutput::Done
            }
            TaskKind::Read => TaskOutput::Data(Vec::new()),
            TaskKind::Disconnect
            | TaskKind::Write
            | TaskKind::EnableNotify
            | TaskKind::DisableNotify => TaskOutput::Done,
        }
    }
}

async fn dispatch(transport: &dyn Transport, task: &Task, mode: WriteMode) -> TaskResult {
    let address = task.address();
    let target = GattTarget::new(task.service(), task.characteristic());

    match task.kind() {
        TaskKind::Connect => transport.connect(address).await.map(|()| TaskOutput::Done),
        TaskKind::Disconnect => transport
            .disconnect(address)
            .await
            .map(|()| TaskOutput::Done),
        TaskKind::Write => transport
            .write(address, target, task.payload(), mode)
            .await
            .map(|()| TaskOutput::Done),
        TaskKind::Read => transport.read(address, target).await.map(TaskOutput::Data),
        TaskKind::EnableNotify => transport
            .set_notify(address, target, true)
            .await
            .map(|()| TaskOutput::Done),
        TaskKind::DisableNotify => transport
            .set_notify(address, target, false)
            .await
            .map(|()| TaskOutput::Done),
    }
}

/// Sequential worker for the ordered queue.
///
/// At most one task is in flight at a time, across every device.
pub(crate) struct ConnectionWorker;

impl ConnectionWorker {
    pub(crate) fn spawn(
        receiver: TaskReceiver<QueuedTask>,
        executor: TaskExecutor,
    ) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(CONNECTION_THREAD_NAME.to_string())
            .spawn(move || {
                drain(receiver, |task| {
                    executor.execute(task, WriteMode::WithResponse)
                });
            })
    }
}

/// Worker for the fast queue; only writes, without acknowledgement.
pub(crate) struct FastWriteWorker;

impl FastWriteWorker {
    pub(crate) fn spawn(
        receiver: TaskReceiver<QueuedTask>,
        executor: TaskExecutor,
    ) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(FAST_WRITE_THREAD_NAME.to_string())
            .spawn(move || {
                drain(receiver, |task| match task.kind() {
                    TaskKind::Write => executor.execute(task, WriteMode::WithoutResponse),
                    kind => Err(TransportError::UnsupportedOnFastPath { kind }),
                });
            })
    }
}

/// Pops until the queue reports end-of-stream, completing each task in order.
fn drain(mut receiver: TaskReceiver<QueuedTask>, run: impl Fn(&Task) -> TaskResult) {
    let queue = receiver.name();
    debug!(%queue, "worker started");

    while let Some(QueuedTask { task, completion }) = receiver.pop() {
        let result = run(&task);
        match &result {
            Ok(_) => debug!(%queue, kind = %task.kind(), address = %task.address(), "task completed"),
            Err(error) => warn!(
                %queue,
                kind = %task.kind(),
                address = %task.address(),
                %error,
                "task failed"
            ),
        }
        if completion.send(result).is_err() {
            trace!(%queue, "task outcome discarded");
        }
    }

    debug!(%queue, "worker stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use tokio::sync::oneshot;

    use super::*;
    use crate::hw::{FakeTransport, FakeTransportConfig, TransportCall};
    use crate::model::DeviceAddress;
    use crate::queue::{QueueName, task_queue};

    const ADDRESS: DeviceAddress = DeviceAddress::new([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0x01]);

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .expect("test runtime should build")
    }

    fn submit(
        queue: &crate::queue::TaskQueue<QueuedTask>,
        task: Task,
    ) -> oneshot::Receiver<TaskResult> {
        let (completion, receiver) = oneshot::channel();
        queue
            .push(QueuedTask { task, completion })
            .expect("queue should accept task");
        receiver
    }

    #[test]
    fn connection_worker_runs_tasks_in_order_and_drains_on_close() {
        let runtime = runtime();
        let fake = Arc::new(FakeTransport::new(
            FakeTransportConfig::builder()
                .scan_fixture(
                    "AA:BB:CC:DD:EE:01|Sensor|-40"
                        .parse()
                        .expect("fixture should parse"),
                )
                .build(),
        ));
        let journal = fake.journal();
        let executor = TaskExecutor::new(
            Radio::Live(fake),
            runtime.handle().clone(),
            Duration::ZERO,
        );
        let (queue, receiver) = task_queue(QueueName::Ordered);

        let connect = submit(&queue, Task::connect(ADDRESS));
        let write = submit(&queue, Task::write(ADDRESS, "180f", "2a19", vec![0x2A]));
        let read = submit(&queue, Task::read(ADDRESS, "180f", "2a19"));
        queue.close();

        let handle = ConnectionWorker::spawn(receiver, executor).expect("worker should spawn");
        handle.join().expect("worker should not panic");

        assert_matches!(connect.blocking_recv(), Ok(Ok(TaskOutput::Done)));
        assert_matches!(write.blocking_recv(), Ok(Ok(TaskOutput::Done)));
        assert_matches!(read.blocking_recv(), Ok(Ok(TaskOutput::Data(data))) if data == vec![0x2A]);
        assert_eq!(
            TransportCall::Write {
                address: ADDRESS,
                service: "180f".to_string(),
                characteristic: "2a19".to_string(),
                payload: vec![0x2A],
                mode: WriteMode::WithResponse,
            },
            journal.calls()[1]
        );
    }

    #[test]
    fn fast_worker_rejects_non_write_tasks() {
        let runtime = runtime();
        let executor = TaskExecutor::new(Radio::Mock, runtime.handle().clone(), Duration::ZERO);
        let (queue, receiver) = task_queue(QueueName::Fast);

        let connect = submit(&queue, Task::connect(ADDRESS));
        queue.close();
        FastWriteWorker::spawn(receiver, executor)
            .expect("worker should spawn")
            .join()
            .expect("worker should not panic");

        assert_matches!(
            connect.blocking_recv(),
            Ok(Err(TransportError::UnsupportedOnFastPath {
                kind: TaskKind::Connect
            }))
        );
    }

    #[test]
    fn mock_reads_return_empty_payload() {
        let runtime = runtime();
        let executor = TaskExecutor::new(Radio::Mock, runtime.handle().clone(), Duration::ZERO);

        let result = executor.execute(
            &Task::read(ADDRESS, "180f", "2a19"),
            WriteMode::WithResponse,
        );

        assert_matches!(result, Ok(TaskOutput::Data(data)) if data.is_empty());
    }
}
