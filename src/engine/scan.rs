use std::panic;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::time::{Instant, sleep};
use tracing::{Instrument, debug, info, instrument, warn};
use tracing_indicatif::span_ext::IndicatifSpanExt;

use super::config::Radio;
use crate::error::TransportError;
use crate::hw::Transport;
use crate::model::{DeviceAddress, DeviceInfo};
use crate::registry::DeviceRegistry;

/// Placeholder devices recorded by every scan in mock mode.
const MOCK_DEVICES: [(DeviceAddress, &str, i16); 2] = [
    (
        DeviceAddress::new([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]),
        "MockDevice_1",
        -60,
    ),
    (
        DeviceAddress::new([0x11, 0x22, 0x33, 0x44, 0x55, 0x66]),
        "MockDevice_2",
        -75,
    ),
];

/// Longest discovery window a single scan will run for.
const MAX_SCAN_WINDOW: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// Runs blocking discovery sessions and feeds the registry.
#[derive(Debug)]
pub(crate) struct ScanCoordinator {
    registry: Arc<DeviceRegistry>,
    radio: Radio,
    runtime: Handle,
    poll_interval: Duration,
}

impl ScanCoordinator {
    pub(crate) fn new(
        registry: Arc<DeviceRegistry>,
        radio: Radio,
        runtime: Handle,
        poll_interval: Duration,
    ) -> Self {
        Self {
            registry,
            radio,
            runtime,
            poll_interval,
        }
    }

    /// Scans for `duration` and returns how many previously unknown devices
    /// were recorded.
    #[instrument(
        skip(self, duration),
        level = "info",
        fields(duration = %humantime::format_duration(duration), progress = true)
    )]
    pub(crate) fn scan(&self, duration: Duration) -> Result<usize, TransportError> {
        let transport = match &self.radio {
            Radio::Mock => return Ok(self.record_mock_devices()),
            Radio::Live(transport) => transport,
        };

        tracing::Span::current().pb_set_message("Scanning for BLE devices");
        let inserted = self.runtime.block_on(self.discover(transport, duration))?;
        info!(inserted, known = self.registry.len(), "scan finished");
        Ok(inserted)
    }

    fn record_mock_devices(&self) -> usize {
        MOCK_DEVICES
            .into_iter()
            .filter(|(address, name, rssi)| {
                self.registry
                    .upsert(DeviceInfo::new(*address, *name, *rssi))
            })
            .count()
    }

    async fn discover(
        &self,
        transport: &Arc<dyn Transport>,
        duration: Duration,
    ) -> Result<usize, TransportError> {
        let deadline = scan_deadline(Instant::now(), duration);
        transport.start_discovery().await?;

        let polling = tokio::spawn(
            poll_until(
                Arc::clone(&self.registry),
                Arc::clone(transport),
                self.poll_interval,
                deadline,
            )
            .in_current_span(),
        );
        let polled = polling.await;
        let stopped = transport.stop_discovery().await;

        let polled = match polled {
            Ok(polled) => polled,
            Err(error) if error.is_panic() => {
                if let Err(stop_error) = stopped {
                    warn!(error = %stop_error, "failed to stop discovery after a panic");
                }
                panic::resume_unwind(error.into_panic());
            }
            Err(_) => Err(TransportError::DiscoveryCancelled),
        };

        match (polled, stopped) {
            (Ok(inserted), Ok(())) => Ok(inserted),
            (Ok(_), Err(error)) => Err(error),
            (Err(error), stopped) => {
                if let Err(stop_error) = stopped {
                    warn!(error = %stop_error, "failed to stop discovery after scan error");
                }
                Err(error)
            }
        }
    }
}

/// Deadline for a scan window, capped at [`MAX_SCAN_WINDOW`].
fn scan_deadline(now: Instant, duration: Duration) -> Instant {
    now.checked_add(duration.min(MAX_SCAN_WINDOW))
        .unwrap_or(now)
}

async fn poll_until(
    registry: Arc<DeviceRegistry>,
    transport: Arc<dyn Transport>,
    poll_interval: Duration,
    deadline: Instant,
) -> Result<usize, TransportError> {
    let mut inserted = 0;
    loop {
        for device in transport.discovered_devices().await? {
            let address = device.address();
            if registry.upsert(device) {
                debug!(%address, "discovered device");
                inserted += 1;
            }
        }

        let now = Instant::now();
        if now >= deadline {
            return Ok(inserted);
        }
        sleep(poll_interval.min(deadline - now)).await;
    }
}
