use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use serde_with::SerializeDisplay;
use strum_macros::{Display, IntoStaticStr};

use crate::error::ArgumentError;

/// Longest device name kept in a [`DeviceInfo`], in bytes.
pub const MAX_NAME_LEN: usize = 255;

/// A six-octet BLE device address in canonical `AA:BB:CC:DD:EE:FF` form.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, SerializeDisplay)]
pub struct DeviceAddress([u8; 6]);

impl DeviceAddress {
    /// Creates an address from raw octets, most significant first.
    #[must_use]
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// Returns the raw octets, most significant first.
    #[must_use]
    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl FromStr for DeviceAddress {
    type Err = ArgumentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.is_empty() {
            return Err(ArgumentError::EmptyAddress);
        }

        let malformed = || ArgumentError::MalformedAddress {
            value: value.to_string(),
        };
        let mut octets = [0u8; 6];
        let mut parts = value.split(':');
        for octet in &mut octets {
            let part = parts.next().ok_or_else(malformed)?;
            if part.len() != 2 || !part.bytes().all(|byte| byte.is_ascii_hexdigit()) {
                return Err(malformed());
            }
            *octet = u8::from_str_radix(part, 16).map_err(|_| malformed())?;
        }
        if parts.next().is_some() {
            return Err(malformed());
        }

        Ok(Self(octets))
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

/// Last-known information about a discovered device.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct DeviceInfo {
    address: DeviceAddress,
    name: String,
    rssi: i16,
}

impl DeviceInfo {
    /// Creates a device record, truncating the name to [`MAX_NAME_LEN`] bytes.
    #[must_use]
    pub fn new(address: DeviceAddress, name: impl Into<String>, rssi: i16) -> Self {
        let mut name = name.into();
        if name.len() > MAX_NAME_LEN {
            let mut end = MAX_NAME_LEN;
            while !name.is_char_boundary(end) {
                end -= 1;
            }
            name.truncate(end);
        }

        Self {
            address,
            name,
            rssi,
        }
    }

    /// Returns the device address.
    #[must_use]
    pub fn address(&self) -> DeviceAddress {
        self.address
    }

    /// Returns the advertised (or placeholder) device name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the RSSI observed when the device was first seen, in dBm.
    #[must_use]
    pub fn rssi(&self) -> i16 {
        self.rssi
    }
}

/// Operation carried by a [`Task`].
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum TaskKind {
    Connect,
    Disconnect,
    Write,
    Read,
    EnableNotify,
    DisableNotify,
}

/// An immutable unit of work for one of the engine workers.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Task {
    kind: TaskKind,
    address: DeviceAddress,
    service: String,
    characteristic: String,
    payload: Vec<u8>,
}

impl Task {
    fn new(kind: TaskKind, address: DeviceAddress) -> Self {
        Self {
            kind,
            address,
            service: String::new(),
            characteristic: String::new(),
            payload: Vec::new(),
        }
    }

    fn with_target(
        kind: TaskKind,
        address: DeviceAddress,
        service: impl Into<String>,
        characteristic: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            characteristic: characteristic.into(),
            ..Self::new(kind, address)
        }
    }

    /// Creates a connect task.
    #[must_use]
    pub fn connect(address: DeviceAddress) -> Self {
        Self::new(TaskKind::Connect, address)
    }

    /// Creates a disconnect task.
    #[must_use]
    pub fn disconnect(address: DeviceAddress) -> Self {
        Self::new(TaskKind::Disconnect, address)
    }

    /// Creates a write task carrying `payload`.
    #[must_use]
    pub fn write(
        address: DeviceAddress,
        service: impl Into<String>,
        characteristic: impl Into<String>,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            payload: payload.into(),
            ..Self::with_target(TaskKind::Write, address, service, characteristic)
        }
    }

    /// Creates a read task.
    #[must_use]
    pub fn read(
        address: DeviceAddress,
        service: impl Into<String>,
        characteristic: impl Into<String>,
    ) -> Self {
        Self::with_target(TaskKind::Read, address, service, characteristic)
    }

    /// Creates a task enabling notifications on a characteristic.
    #[must_use]
    pub fn enable_notify(
        address: DeviceAddress,
        service: impl Into<String>,
        characteristic: impl Into<String>,
    ) -> Self {
        Self::with_target(TaskKind::EnableNotify, address, service, characteristic)
    }

    /// Creates a task disabling notifications on a characteristic.
    #[must_use]
    pub fn disable_notify(
        address: DeviceAddress,
        service: impl Into<String>,
        characteristic: impl Into<String>,
    ) -> Self {
        Self::with_target(TaskKind::DisableNotify, address, service, characteristic)
    }

    #[must_use]
    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    #[must_use]
    pub fn address(&self) -> DeviceAddress {
        self.address
    }

    /// Service identifier; empty for connect and disconnect.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Characteristic identifier; empty for connect and disconnect.
    #[must_use]
    pub fn characteristic(&self) -> &str {
        &self.characteristic
    }

    /// Payload bytes; empty unless this is a write.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

/// Result of a task that completed without a transport error.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum TaskOutput {
    /// The operation finished and produced no data.
    Done,
    /// Bytes returned by a read.
    Data(Vec<u8>),
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("AA:BB:CC:DD:EE:FF", [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF])]
    #[case("11:22:33:44:55:66", [0x11, 0x22, 0x33, 0x44, 0x55, 0x66])]
    #[case("0a:0b:0c:0d:0e:0f", [0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F])]
    fn address_parses_colon_hex(#[case] raw: &str, #[case] expected: [u8; 6]) {
        let address: DeviceAddress = raw.parse().expect("address should parse");
        assert_eq!(expected, address.octets());
    }

    #[test]
    fn address_display_is_uppercase_canonical() {
        let address: DeviceAddress = "0a:0b:0c:0d:0e:0f".parse().expect("address should parse");
        assert_eq!("0A:0B:0C:0D:0E:0F", address.to_string());
    }

    #[test]
    fn empty_address_is_rejected() {
        assert_matches!(
            "".parse::<DeviceAddress>(),
            Err(ArgumentError::EmptyAddress)
        );
    }

    #[rstest]
    #[case("AA:BB:CC:DD:EE")]
    #[case("AA:BB:CC:DD:EE:FF:00")]
    #[case("AA-BB-CC-DD-EE-FF")]
    #[case("AA:BB:CC:DD:EE:+F")]
    #[case("AAB:B:CC:DD:EE:FF")]
    #[case("GG:BB:CC:DD:EE:FF")]
    fn malformed_addresses_are_rejected(#[case] raw: &str) {
        assert_matches!(
            raw.parse::<DeviceAddress>(),
            Err(ArgumentError::MalformedAddress { value }) if value == raw
        );
    }

    #[test]
    fn long_names_are_truncated_on_char_boundary() {
        let address = DeviceAddress::new([0; 6]);
        let name = "é".repeat(200);

        let info = DeviceInfo::new(address, name, -40);

        assert!(info.name().len() <= MAX_NAME_LEN);
        assert_eq!(127, info.name().chars().count());
    }

    #[test]
    fn write_task_keeps_target_and_payload() {
        let address = DeviceAddress::new([1, 2, 3, 4, 5, 6]);
        let task = Task::write(address, "180f", "2a19", vec![0x01, 0x02]);

        assert_eq!(TaskKind::Write, task.kind());
        assert_eq!("180f", task.service());
        assert_eq!("2a19", task.characteristic());
        assert_eq!(&[0x01, 0x02], task.payload());
        assert_eq!("write", task.kind().to_string());
    }

    #[test]
    fn connect_task_has_empty_target() {
        let task = Task::connect(DeviceAddress::new([1, 2, 3, 4, 5, 6]));

        assert_eq!("", task.service());
        assert_eq!("", task.characteristic());
        assert!(task.payload().is_empty());
    }
}
