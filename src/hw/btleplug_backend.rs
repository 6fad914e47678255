use std::fmt;

use async_trait::async_trait;
use btleplug::api::{
    Central, Characteristic, Manager as _, Peripheral as _, PeripheralProperties, ScanFilter,
    WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use tracing::{debug, info, instrument, trace};

use super::transport::{GattTarget, Transport, WriteMode};
use crate::error::TransportError;
use crate::model::{DeviceAddress, DeviceInfo};

/// Name recorded for devices that advertise no local name.
const UNNAMED_DEVICE: &str = "[BLE Device]";
const BLUETOOTH_BASE_UUID_SUFFIX: &str = "-0000-1000-8000-00805f9b34fb";

/// Transport backed by the first adapter reported by `btleplug`.
#[derive(Debug)]
pub(crate) struct BtleplugTransport {
    _manager: Manager,
    adapter: Adapter,
    adapter_name: String,
}

impl BtleplugTransport {
    /// Opens the platform BLE manager and selects its first adapter.
    pub(crate) async fn new() -> Result<Self, TransportError> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(TransportError::NoAdapters)?;
        let adapter_name = adapter.adapter_info().await?;
        info!(adapter = %adapter_name, "using BLE adapter");

        Ok(Self {
            _manager: manager,
            adapter,
            adapter_name,
        })
    }

    #[instrument(skip(self), level = "trace", fields(adapter = %self.adapter_name))]
    async fn peripheral(&self, address: DeviceAddress) -> Result<Peripheral, TransportError> {
        let wanted = address.to_string();
        for peripheral in self.adapter.peripherals().await? {
            if peripheral.address().to_string().eq_ignore_ascii_case(&wanted) {
                return Ok(peripheral);
            }
        }

        Err(TransportError::DeviceNotFound { address: wanted })
    }

    async fn connected_peripheral(
        &self,
        address: DeviceAddress,
    ) -> Result<Peripheral, TransportError> {
        let peripheral = self.peripheral(address).await?;
        if !peripheral.is_connected().await? {
            return Err(TransportError::NotConnected {
                address: address.to_string(),
            });
        }
        Ok(peripheral)
    }

    async fn characteristic(
        &self,
        address: DeviceAddress,
        target: GattTarget<'_>,
    ) -> Result<(Peripheral, Characteristic), TransportError> {
        let peripheral = self.connected_peripheral(address).await?;
        if peripheral.characteristics().is_empty() {
            peripheral.discover_services().await?;
        }

        let characteristic = peripheral
            .characteristics()
            .into_iter()
            .find(|characteristic| {
                uuid_matches(&characteristic.service_uuid, target.service())
                    && uuid_matches(&characteristic.uuid, target.characteristic())
            })
            .ok_or_else(|| TransportError::CharacteristicNotFound {
                service: target.service().to_string(),
                characteristic: target.characteristic().to_string(),
            })?;

        Ok((peripheral, characteristic))
    }
}

#[async_trait]
impl Transport for BtleplugTransport {
    #[instrument(skip(self), level = "debug", fields(adapter = %self.adapter_name))]
    async fn start_discovery(&self) -> Result<(), TransportError> {
        self.adapter.start_scan(ScanFilter::default()).await?;
        Ok(())
    }

    async fn discovered_devices(&self) -> Result<Vec<DeviceInfo>, TransportError> {
        let mut devices = Vec::new();
        for peripheral in self.adapter.peripherals().await? {
            let Some(properties) = peripheral.properties().await? else {
                continue;
            };
            if let Some(device) = device_from_properties(properties) {
                devices.push(device);
            }
        }
        Ok(devices)
    }

    #[instrument(skip(self), level = "debug", fields(adapter = %self.adapter_name))]
    async fn stop_discovery(&self) -> Result<(), TransportError> {
        self.adapter.stop_scan().await?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug", fields(%address))]
    async fn connect(&self, address: DeviceAddress) -> Result<(), TransportError> {
        let peripheral = self.peripheral(address).await?;
        if !peripheral.is_connected().await? {
            peripheral.connect().await?;
        }
        peripheral.discover_services().await?;
        info!(%address, "connected to peripheral");
        Ok(())
    }

    #[instrument(skip(self), level = "debug", fields(%address))]
    async fn disconnect(&self, address: DeviceAddress) -> Result<(), TransportError> {
        let peripheral = match self.peripheral(address).await {
            Ok(peripheral) => peripheral,
            Err(TransportError::DeviceNotFound { .. }) => {
                debug!("disconnect requested for unknown peripheral");
                return Ok(());
            }
            Err(error) => return Err(error),
        };
        if peripheral.is_connected().await? {
            peripheral.disconnect().await?;
            info!(%address, "disconnected from peripheral");
        }
        Ok(())
    }

    #[instrument(
        skip(self, payload),
        level = "debug",
        fields(%address, ?target, %mode, payload_len = payload.len())
    )]
    async fn write(
        &self,
        address: DeviceAddress,
        target: GattTarget<'_>,
        payload: &[u8],
        mode: WriteMode,
    ) -> Result<(), TransportError> {
        let (peripheral, characteristic) = self.characteristic(address, target).await?;
        let write_type = match mode {
            WriteMode::WithResponse => WriteType::WithResponse,
            WriteMode::WithoutResponse => WriteType::WithoutResponse,
        };
        peripheral
            .write(&characteristic, payload, write_type)
            .await?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug", fields(%address, ?target))]
    async fn read(
        &self,
        address: DeviceAddress,
        target: GattTarget<'_>,
    ) -> Result<Vec<u8>, TransportError> {
        let (peripheral, characteristic) = self.characteristic(address, target).await?;
        let payload = peripheral.read(&characteristic).await?;
        trace!(payload_len = payload.len(), "characteristic read");
        Ok(payload)
    }

    #[instrument(skip(self), level = "debug", fields(%address, ?target, enabled))]
    async fn set_notify(
        &self,
        address: DeviceAddress,
        target: GattTarget<'_>,
        enabled: bool,
    ) -> Result<(), TransportError> {
        let (peripheral, characteristic) = self.characteristic(address, target).await?;
        if enabled {
            peripheral.subscribe(&characteristic).await?;
        } else {
            peripheral.unsubscribe(&characteristic).await?;
        }
        Ok(())
    }
}

fn device_from_properties(properties: PeripheralProperties) -> Option<DeviceInfo> {
    let rssi = properties.rssi?;
    let address = match properties.address.to_string().parse::<DeviceAddress>() {
        Ok(address) => address,
        Err(error) => {
            trace!(%error, "skipping peripheral with unusable address");
            return None;
        }
    };
    let name = properties
        .local_name
        .unwrap_or_else(|| UNNAMED_DEVICE.to_string());

    Some(DeviceInfo::new(address, name, rssi))
}

/// Expands 16- and 32-bit short UUIDs onto the Bluetooth base UUID.
fn expand_uuid(value: &str) -> String {
    let trimmed = value.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed)
        .to_ascii_lowercase();

    match digits.len() {
        4 => format!("0000{digits}{BLUETOOTH_BASE_UUID_SUFFIX}"),
        8 => format!("{digits}{BLUETOOTH_BASE_UUID_SUFFIX}"),
        _ => digits,
    }
}

fn uuid_matches(uuid: &impl fmt::Display, wanted: &str) -> bool {
    uuid.to_string().eq_ignore_ascii_case(&expand_uuid(wanted))
}
