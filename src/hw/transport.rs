use std::fmt;

use async_trait::async_trait;
use strum_macros::Display;

use crate::error::TransportError;
use crate::model::{DeviceAddress, DeviceInfo};

/// Acknowledgement semantics for a characteristic write.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum WriteMode {
    /// Wait for the peer to acknowledge the write.
    WithResponse,
    /// Fire the write without waiting for an acknowledgement.
    WithoutResponse,
}

/// A GATT characteristic addressed by service and characteristic identifiers.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct GattTarget<'a> {
    service: &'a str,
    characteristic: &'a str,
}

impl<'a> GattTarget<'a> {
    #[must_use]
    pub fn new(service: &'a str, characteristic: &'a str) -> Self {
        Self {
            service,
            characteristic,
        }
    }

    #[must_use]
    pub fn service(&self) -> &'a str {
        self.service
    }

    #[must_use]
    pub fn characteristic(&self) -> &'a str {
        self.characteristic
    }
}

/// Radio capability consumed by the engine.
///
/// Implementations own advertisement parsing and GATT encoding; the engine
/// only sees complete [`DeviceInfo`] records and byte payloads.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Starts an active discovery session.
    async fn start_discovery(&self) -> Result<(), TransportError>;

    /// Returns every complete device record observed by the current session.
    async fn discovered_devices(&self) -> Result<Vec<DeviceInfo>, TransportError>;

    /// Stops the discovery session. Must be safe to call when none is running.
    async fn stop_discovery(&self) -> Result<(), TransportError>;

    /// Connects to `address`; a no-op when already connected.
    async fn connect(&self, address: DeviceAddress) -> Result<(), TransportError>;

    /// Disconnects from `address`; a no-op when already disconnected.
    async fn disconnect(&self, address: DeviceAddress) -> Result<(), TransportError>;

    /// Writes `payload` to a characteristic.
    async fn write(
        &self,
        address: DeviceAddress,
        target: GattTarget<'_>,
        payload: &[u8],
        mode: WriteMode,
    ) -> Result<(), TransportError>;

    /// Reads the current value of a characteristic.
    async fn read(
        &self,
        address: DeviceAddress,
        target: GattTarget<'_>,
    ) -> Result<Vec<u8>, TransportError>;

    /// Enables or disables notifications on a characteristic.
    async fn set_notify(
        &self,
        address: DeviceAddress,
        target: GattTarget<'_>,
        enabled: bool,
    ) -> Result<(), TransportError>;
}
