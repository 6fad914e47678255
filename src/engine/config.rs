use std::sync::Arc;
use std::time::Duration;

use bon::Builder;
use tokio::runtime::Runtime;
use tracing::{info, warn};

use crate::hw::{BtleplugTransport, Transport};

const DEFAULT_MOCK_CONNECT_LATENCY: Duration = Duration::from_millis(200);
const DEFAULT_SCAN_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Selects the radio an engine drives.
#[derive(Debug, Clone, Default)]
pub enum Backend {
    /// Probe the platform's first BLE adapter and fall back to mock mode when
    /// none is usable.
    #[default]
    Auto,
    /// Run without a radio.
    Mock,
    /// Drive the given transport.
    Transport(Arc<dyn Transport>),
}

/// Settings used to construct a [`BleEngine`](crate::BleEngine).
///
/// ```
/// use std::time::Duration;
///
/// let config = blectl::EngineConfig::builder()
///     .backend(blectl::Backend::Mock)
///     .mock_connect_latency(Duration::ZERO)
///     .build();
/// let _ = config;
/// ```
#[derive(Debug, Clone, Builder)]
pub struct EngineConfig {
    #[builder(default)]
    pub(crate) backend: Backend,
    /// Simulated connect time in mock mode.
    #[builder(default = DEFAULT_MOCK_CONNECT_LATENCY)]
    pub(crate) mock_connect_latency: Duration,
    /// Interval between advertisement polls during a live scan.
    #[builder(default = DEFAULT_SCAN_POLL_INTERVAL)]
    pub(crate) scan_poll_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Radio resolved from a [`Backend`] at construction time.
#[derive(Debug, Clone)]
pub(crate) enum Radio {
    Mock,
    Live(Arc<dyn Transport>),
}

impl Radio {
    pub(crate) fn resolve(backend: Backend, runtime: &Runtime) -> Self {
        let radio = match backend {
            Backend::Mock => Self::Mock,
            Backend::Transport(transport) => Self::Live(transport),
            Backend::Auto => match runtime.block_on(BtleplugTransport::new()) {
                Ok(transport) => Self::Live(Arc::new(transport)),
                Err(error) => {
                    warn!(%error, "no BLE transport available; running in mock mode");
                    Self::Mock
                }
            },
        };
        info!(mock = radio.is_mock(), "BLE radio selected");
        radio
    }

    pub(crate) fn is_mock(&self) -> bool {
        matches!(self, Self::Mock)
    }
}
