use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bon::Builder;
use tokio::time::{Instant, sleep};
use tracing::debug;

use super::transport::{GattTarget, Transport, WriteMode};
use crate::error::{FixtureError, TransportError};
use crate::model::{DeviceAddress, DeviceInfo};

/// Parsed fake scan fixture records in the form `address|name|rssi;...`.
#[derive(Debug, Clone, Default, Eq, PartialEq, derive_more::Into)]
pub struct ScanFixture {
    devices: Vec<DeviceInfo>,
}

impl FromStr for ScanFixture {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let devices = parse_scan_fixture(value)?;
        Ok(Self { devices })
    }
}

/// Settings for a [`FakeTransport`].
#[derive(Debug, Clone, Builder)]
pub struct FakeTransportConfig {
    #[builder(default)]
    scan_fixture: ScanFixture,
    /// Time after discovery starts before fixture devices become visible.
    #[builder(default)]
    discovery_delay: Duration,
    /// Once this much time has passed since discovery started, polling for
    /// devices fails as if the adapter had gone away.
    discovery_failure_after: Option<Duration>,
    /// Latency applied to every connect, disconnect, write, read and notify call.
    #[builder(default)]
    latency: Duration,
    /// Overrides `latency` for connect calls.
    connect_latency: Option<Duration>,
    /// Addresses whose connect attempts are rejected.
    #[builder(default)]
    failing_connects: Vec<DeviceAddress>,
}

/// One call observed by a [`FakeTransport`].
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum TransportCall {
    StartDiscovery,
    StopDiscovery,
    Connect(DeviceAddress),
    Disconnect(DeviceAddress),
    Write {
        address: DeviceAddress,
        service: String,
        characteristic: String,
        payload: Vec<u8>,
        mode: WriteMode,
    },
    Read {
        address: DeviceAddress,
        service: String,
        characteristic: String,
    },
    SetNotify {
        address: DeviceAddress,
        service: String,
        characteristic: String,
        enabled: bool,
    },
}

#[derive(Debug, Default)]
struct CallGauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

/// Marks one device operation as in flight until dropped.
struct InFlightCall<'a> {
    gauge: &'a CallGauge,
}

impl Drop for InFlightCall<'_> {
    fn drop(&mut self) {
        self.gauge.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Shared, cloneable record of the calls made to a [`FakeTransport`].
#[derive(Debug, Clone, Default)]
pub struct TransportJournal {
    calls: Arc<Mutex<Vec<TransportCall>>>,
    gauge: Arc<CallGauge>,
}

impl TransportJournal {
    /// Returns every recorded call in the order it was made.
    #[must_use]
    pub fn calls(&self) -> Vec<TransportCall> {
        self.lock().clone()
    }

    /// Returns whether a discovery session is currently running.
    #[must_use]
    pub fn discovery_active(&self) -> bool {
        self.lock()
            .iter()
            .rev()
            .find_map(|call| match call {
                TransportCall::StartDiscovery => Some(true),
                TransportCall::StopDiscovery => Some(false),
                _ => None,
            })
            .unwrap_or(false)
    }

    /// Returns how many device operations are running right now.
    #[must_use]
    pub fn calls_in_flight(&self) -> usize {
        self.gauge.current.load(Ordering::SeqCst)
    }

    /// Returns the largest number of device operations that ever ran at once.
    #[must_use]
    pub fn peak_calls_in_flight(&self) -> usize {
        self.gauge.peak.load(Ordering::SeqCst)
    }

    fn record(&self, call: TransportCall) {
        self.lock().push(call);
    }

    fn begin(&self, call: TransportCall) -> InFlightCall<'_> {
        self.record(call);
        let running = self.gauge.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.gauge.peak.fetch_max(running, Ordering::SeqCst);
        InFlightCall { gauge: &self.gauge }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<TransportCall>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

type CharacteristicKey = (DeviceAddress, String, String);

#[derive(Debug, Default)]
struct FakeState {
    discovery_started_at: Option<Instant>,
    connected: BTreeSet<DeviceAddress>,
    values: HashMap<CharacteristicKey, Vec<u8>>,
}

/// Fixture-driven transport used in tests and hardware-free runs.
///
/// Reads return the last payload written to the same characteristic.
#[derive(Debug)]
pub struct FakeTransport {
    devices: Vec<DeviceInfo>,
    discovery_delay: Duration,
    discovery_failure_after: Option<Duration>,
    latency: Duration,
    connect_latency: Duration,
    failing_connects: Vec<DeviceAddress>,
    journal: TransportJournal,
    state: Mutex<FakeState>,
}

impl FakeTransport {
    /// Creates a fake transport from explicit settings.
    #[must_use]
    pub fn new(config: FakeTransportConfig) -> Self {
        Self {
            devices: config.scan_fixture.into(),
            discovery_delay: config.discovery_delay,
            discovery_failure_after: config.discovery_failure_after,
            latency: config.latency,
            connect_latency: config.connect_latency.unwrap_or(config.latency),
            failing_connects: config.failing_connects,
            journal: TransportJournal::default(),
            state: Mutex::new(FakeState::default()),
        }
    }

    /// Returns a handle to the call journal that outlives the transport.
    #[must_use]
    pub fn journal(&self) -> TransportJournal {
        self.journal.clone()
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn simulate_latency(&self, latency: Duration) {
        if !latency.is_zero() {
            sleep(latency).await;
        }
    }

    fn ensure_connected(&self, address: DeviceAddress) -> Result<(), TransportError> {
        if self.state().connected.contains(&address) {
            Ok(())
        } else {
            Err(TransportError::NotConnected {
                address: address.to_string(),
            })
        }
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn start_discovery(&self) -> Result<(), TransportError> {
        self.journal.record(TransportCall::StartDiscovery);
        self.state().discovery_started_at = Some(Instant::now());
        Ok(())
    }

    async fn discovered_devices(&self) -> Result<Vec<DeviceInfo>, TransportError> {
        let Some(started_at) = self.state().discovery_started_at else {
            return Ok(Vec::new());
        };
        if self
            .discovery_failure_after
            .is_some_and(|failure_after| started_at.elapsed() >= failure_after)
        {
            return Err(TransportError::NoAdapters);
        }
        if started_at.elapsed() < self.discovery_delay {
            return Ok(Vec::new());
        }
        Ok(self.devices.clone())
    }

    async fn stop_discovery(&self) -> Result<(), TransportError> {
        self.journal.record(TransportCall::StopDiscovery);
        self.state().discovery_started_at = None;
        Ok(())
    }

    async fn connect(&self, address: DeviceAddress) -> Result<(), TransportError> {
        let _in_flight = self.journal.begin(TransportCall::Connect(address));
        self.simulate_latency(self.connect_latency).await;

        if !self
            .devices
            .iter()
            .any(|device| device.address() == address)
        {
            return Err(TransportError::DeviceNotFound {
                address: address.to_string(),
            });
        }
        if self.failing_connects.contains(&address) {
            return Err(TransportError::Rejected {
                operation: "connect",
                address: address.to_string(),
            });
        }

        self.state().connected.insert(address);
        debug!(%address, "fake peripheral connected");
        Ok(())
    }

    async fn disconnect(&self, address: DeviceAddress) -> Result<(), TransportError> {
        let _in_flight = self.journal.begin(TransportCall::Disconnect(address));
        self.simulate_latency(self.latency).await;
        self.state().connected.remove(&address);
        Ok(())
    }

    async fn write(
        &self,
        address: DeviceAddress,
        target: GattTarget<'_>,
        payload: &[u8],
        mode: WriteMode,
    ) -> Result<(), TransportError> {
        let _in_flight = self.journal.begin(TransportCall::Write {
            address,
            service: target.service().to_string(),
            characteristic: target.characteristic().to_string(),
            payload: payload.to_vec(),
            mode,
        });
        self.simulate_latency(self.latency).await;
        self.ensure_connected(address)?;

        self.state().values.insert(
            (
                address,
                target.service().to_string(),
                target.characteristic().to_string(),
            ),
            payload.to_vec(),
        );
        Ok(())
    }

    async fn read(
        &self,
        address: DeviceAddress,
        target: GattTarget<'_>,
    ) -> Result<Vec<u8>, TransportError> {
        let _in_flight = self.journal.begin(TransportCall::Read {
            address,
            service: target.service().to_string(),
            characteristic: target.characteristic().to_string(),
        });
        self.simulate_latency(self.latency).await;
        self.ensure_connected(address)?;

        let key = (
            address,
            target.service().to_string(),
            target.characteristic().to_string(),
        );
        Ok(self.state().values.get(&key).cloned().unwrap_or_default())
    }

    async fn set_notify(
        &self,
        address: DeviceAddress,
        target: GattTarget<'_>,
        enabled: bool,
    ) -> Result<(), TransportError> {
        let _in_flight = self.journal.begin(TransportCall::SetNotify {
            address,
            service: target.service().to_string(),
            characteristic: target.characteristic().to_string(),
            enabled,
        });
        self.simulate_latency(self.latency).await;
        self.ensure_connected(address)
    }
}

fn parse_scan_fixture(raw_fixture: &str) -> Result<Vec<DeviceInfo>, FixtureError> {
    if raw_fixture.trim().is_empty() {
        return Err(FixtureError::EmptyFixture);
    }

    raw_fixture
        .split(';')
        .map(parse_scan_record)
        .collect::<Result<Vec<_>, _>>()
}

fn parse_scan_record(raw_record: &str) -> Result<DeviceInfo, FixtureError> {
    let fields: Vec<&str> = raw_record.split('|').map(str::trim).collect();
    let [address, name, rssi] = fields.as_slice() else {
        return Err(FixtureError::InvalidRecordFieldCount);
    };
    if address.is_empty() || name.is_empty() || rssi.is_empty() {
        return Err(FixtureError::EmptyRecordField);
    }

    Ok(DeviceInfo::new(address.parse()?, *name, rssi.parse()?))
}
