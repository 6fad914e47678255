mod completion;
mod config;
mod scan;
mod worker;

use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use serde::Serialize;
use strum::IntoEnumIterator;
use tokio::runtime::{Handle, Runtime};
use tokio::sync::oneshot;
use tracing::{debug, error, info, instrument};

pub use self::completion::Completion;
use self::completion::QueuedTask;
pub use self::config::{Backend, EngineConfig};
use self::config::Radio;
use self::scan::ScanCoordinator;
use self::worker::{ConnectionWorker, FastWriteWorker, TaskExecutor};
use crate::error::{ArgumentError, ControlError, TransportError};
use crate::model::{DeviceAddress, DeviceInfo, Task};
use crate::queue::{QueueName, TaskQueue, task_queue};
use crate::registry::DeviceRegistry;

/// RSSI reported for unknown devices in mock mode.
const MOCK_RSSI: i16 = -55;
/// RSSI reported for unknown devices when a radio is present.
const FALLBACK_RSSI: i16 = -60;

/// Tasks accepted per queue since the engine started.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize)]
pub struct EngineStats {
    pub ordered: u64,
    pub fast: u64,
}

/// Blocking BLE control facade.
///
/// Owns the device registry, both task queues and their worker threads.
/// Queued operations return as soon as the task is accepted; the returned
/// [`Completion`] reports the outcome. Dropping the engine closes both queues,
/// lets the workers drain what was already accepted, and joins them.
///
/// Every method blocks the calling thread at some point, so none of them may
/// be called from inside an async runtime.
///
/// ```
/// use std::time::Duration;
///
/// let engine = blectl::BleEngine::mock()?;
/// engine.scan(Duration::ZERO)?;
/// assert_eq!(2, engine.scan_results(100).len());
///
/// let completion = engine.write("AA:BB:CC:DD:EE:FF", "180f", "2a19", &[0x01], true)?;
/// completion.wait()?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct BleEngine {
    registry: Arc<DeviceRegistry>,
    scanner: ScanCoordinator,
    ordered: TaskQueue<QueuedTask>,
    fast: TaskQueue<QueuedTask>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    mock: bool,
    handle: Handle,
    runtime: Option<Runtime>,
}

impl BleEngine {
    /// Starts an engine and both of its workers.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Runtime`] if the I/O runtime or a worker thread
    /// cannot be started.
    #[instrument(skip(config), level = "info")]
    pub fn new(config: EngineConfig) -> Result<Self, ControlError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("ble-io")
            .enable_all()
            .build()
            .map_err(|source| ControlError::Runtime { source })?;
        let handle = runtime.handle().clone();

        let radio = Radio::resolve(config.backend, &runtime);
        let registry = Arc::new(DeviceRegistry::new());
        let scanner = ScanCoordinator::new(
            Arc::clone(&registry),
            radio.clone(),
            handle.clone(),
            config.scan_poll_interval,
        );
        let executor = TaskExecutor::new(radio.clone(), handle.clone(), config.mock_connect_latency);

        let (ordered, ordered_receiver) = task_queue(QueueName::Ordered);
        let (fast, fast_receiver) = task_queue(QueueName::Fast);
        let connection = ConnectionWorker::spawn(ordered_receiver, executor.clone())
            .map_err(|source| ControlError::Runtime { source })?;
        let fast_writer = match FastWriteWorker::spawn(fast_receiver, executor) {
            Ok(fast_writer) => fast_writer,
            Err(source) => {
                ordered.close();
                if connection.join().is_err() {
                    error!("connection worker panicked during start-up");
                }
                return Err(ControlError::Runtime { source });
            }
        };

        info!(mock = radio.is_mock(), "BLE engine started");
        Ok(Self {
            registry,
            scanner,
            ordered,
            fast,
            workers: Mutex::new(vec![connection, fast_writer]),
            mock: radio.is_mock(),
            handle,
            runtime: Some(runtime),
        })
    }

    /// Starts an engine that never touches a radio.
    ///
    /// # Errors
    ///
    /// See [`BleEngine::new`].
    pub fn mock() -> Result<Self, ControlError> {
        Self::new(EngineConfig::builder().backend(Backend::Mock).build())
    }

    /// Returns whether the engine runs without a radio.
    #[must_use]
    pub fn is_mock(&self) -> bool {
        self.mock
    }

    /// Discovers devices for `duration`, blocking the caller throughout.
    ///
    /// In mock mode this records two fixed placeholder devices and returns
    /// immediately. Returns how many previously unknown devices were recorded.
    ///
    /// # Errors
    ///
    /// Returns the transport error that ended the discovery session. Discovery
    /// is stopped before returning either way.
    pub fn scan(&self, duration: Duration) -> Result<usize, TransportError> {
        self.scanner.scan(duration)
    }

    /// Returns at most `max` known devices, ordered by address.
    #[must_use]
    pub fn scan_results(&self, max: usize) -> Vec<DeviceInfo> {
        self.registry.snapshot(max)
    }

    /// Returns the last-known record for `address`.
    #[must_use]
    pub fn device(&self, address: &str) -> Option<DeviceInfo> {
        let address = address.parse::<DeviceAddress>().ok()?;
        self.registry.get(&address)
    }

    /// Queues a connect.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::InvalidArgument`] for an empty or malformed
    /// address and [`ControlError::QueueClosed`] once shutdown has begun.
    #[instrument(skip(self), level = "debug")]
    pub fn connect(&self, address: &str) -> Result<Completion, ControlError> {
        let address = address.parse()?;
        self.enqueue(QueueName::Ordered, Task::connect(address))
    }

    /// Queues a disconnect.
    ///
    /// # Errors
    ///
    /// See [`BleEngine::connect`].
    #[instrument(skip(self), level = "debug")]
    pub fn disconnect(&self, address: &str) -> Result<Completion, ControlError> {
        let address = address.parse()?;
        self.enqueue(QueueName::Ordered, Task::disconnect(address))
    }

    /// Queues a characteristic write.
    ///
    /// `fast` writes go to the fast queue and are sent without response;
    /// all other writes are acknowledged and ordered with connection tasks.
    ///
    /// # Errors
    ///
    /// See [`BleEngine::connect`].
    #[instrument(skip(self, payload), level = "debug", fields(payload_len = payload.len()))]
    pub fn write(
        &self,
        address: &str,
        service: &str,
        characteristic: &str,
        payload: &[u8],
        fast: bool,
    ) -> Result<Completion, ControlError> {
        let address = address.parse()?;
        let queue = if fast {
            QueueName::Fast
        } else {
            QueueName::Ordered
        };
        self.enqueue(
            queue,
            Task::write(address, service, characteristic, payload),
        )
    }

    /// Queues a characteristic read; the completion carries the value.
    ///
    /// # Errors
    ///
    /// See [`BleEngine::connect`].
    #[instrument(skip(self), level = "debug")]
    pub fn read(
        &self,
        address: &str,
        service: &str,
        characteristic: &str,
    ) -> Result<Completion, ControlError> {
        let address = address.parse()?;
        self.enqueue(
            QueueName::Ordered,
            Task::read(address, service, characteristic),
        )
    }

    /// Queues a request to enable notifications on a characteristic.
    ///
    /// # Errors
    ///
    /// See [`BleEngine::connect`].
    #[instrument(skip(self), level = "debug")]
    pub fn enable_notifications(
        &self,
        address: &str,
        service: &str,
        characteristic: &str,
    ) -> Result<Completion, ControlError> {
        let address = address.parse()?;
        self.enqueue(
            QueueName::Ordered,
            Task::enable_notify(address, service, characteristic),
        )
    }

    /// Queues a request to disable notifications on a characteristic.
    ///
    /// # Errors
    ///
    /// See [`BleEngine::connect`].
    #[instrument(skip(self), level = "debug")]
    pub fn disable_notifications(
        &self,
        address: &str,
        service: &str,
        characteristic: &str,
    ) -> Result<Completion, ControlError> {
        let address = address.parse()?;
        self.enqueue(
            QueueName::Ordered,
            Task::disable_notify(address, service, characteristic),
        )
    }

    /// Returns the last-known RSSI for `address`, or a synthetic value for
    /// devices that have not been seen.
    #[must_use]
    pub fn rssi(&self, address: &str) -> i16 {
        address
            .parse::<DeviceAddress>()
            .ok()
            .and_then(|address| self.registry.get(&address))
            .map_or_else(|| self.synthetic_rssi(), |device| device.rssi())
    }

    /// Validates an MTU request. No transport negotiates MTU, so an accepted
    /// request has no further effect.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::InvalidArgument`] for a bad address or a zero
    /// size.
    #[instrument(skip(self), level = "debug")]
    pub fn set_mtu(&self, address: &str, size: u32) -> Result<(), ControlError> {
        let address: DeviceAddress = address.parse()?;
        if size == 0 {
            return Err(ArgumentError::ZeroMtu.into());
        }
        debug!(%address, size, "MTU request accepted");
        Ok(())
    }

    /// Returns how many tasks each queue has accepted.
    #[must_use]
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            ordered: self.ordered.accepted(),
            fast: self.fast.accepted(),
        }
    }

    /// Closes both queues and waits for the workers to drain them.
    ///
    /// Later calls return immediately. Operations queued afterwards fail with
    /// [`ControlError::QueueClosed`].
    pub fn shutdown(&self) {
        for queue in QueueName::iter() {
            self.queue(queue).close();
        }

        let workers =
            std::mem::take(&mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner));
        for worker in workers {
            let name = worker.thread().name().unwrap_or("worker").to_string();
            if worker.join().is_err() {
                error!(worker = %name, "worker thread panicked");
            }
        }
    }

    fn enqueue(&self, queue: QueueName, task: Task) -> Result<Completion, ControlError> {
        let kind = task.kind();
        let (completion, receiver) = oneshot::channel();
        self.queue(queue).push(QueuedTask { task, completion })?;
        debug!(%queue, %kind, "task accepted");
        Ok(Completion::new(kind, queue, receiver, self.handle.clone()))
    }

    fn queue(&self, queue: QueueName) -> &TaskQueue<QueuedTask> {
        match queue {
            QueueName::Ordered => &self.ordered,
            QueueName::Fast => &self.fast,
        }
    }

    fn synthetic_rssi(&self) -> i16 {
        if self.mock { MOCK_RSSI } else { FALLBACK_RSSI }
    }
}

impl Drop for BleEngine {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
        info!("BLE engine stopped");
    }
}
