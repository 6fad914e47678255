use std::time::Duration;

use thiserror::Error;

use crate::model::TaskKind;
use crate::queue::QueueName;

/// Errors returned when a facade operation is rejected before it is queued.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error(transparent)]
    InvalidArgument(#[from] ArgumentError),
    #[error("the {queue} queue is closed; the engine is shutting down")]
    QueueClosed { queue: QueueName },
    #[error("failed to start the engine runtime")]
    Runtime { source: std::io::Error },
}

/// Errors returned when validating caller-supplied arguments.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum ArgumentError {
    #[error("device address must not be empty")]
    EmptyAddress,
    #[error("device address `{value}` is not six colon-separated hexadecimal octets")]
    MalformedAddress { value: String },
    #[error("hex payload length must be even")]
    InvalidHexLength,
    #[error("hex payload contains invalid character `{value}`")]
    InvalidHexByte { value: char },
    #[error("MTU size must be greater than zero")]
    ZeroMtu,
}

impl From<hex::FromHexError> for ArgumentError {
    fn from(error: hex::FromHexError) -> Self {
        match error {
            hex::FromHexError::InvalidHexCharacter { c, .. } => Self::InvalidHexByte { value: c },
            hex::FromHexError::OddLength | hex::FromHexError::InvalidStringLength => {
                Self::InvalidHexLength
            }
        }
    }
}

/// Errors reported by a transport while a worker processes a task.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("BLE operation failed")]
    Ble(#[from] btleplug::Error),
    #[error("no BLE adapters were found")]
    NoAdapters,
    #[error("device `{address}` is not known to the adapter")]
    DeviceNotFound { address: String },
    #[error("device `{address}` is not connected")]
    NotConnected { address: String },
    #[error("characteristic `{characteristic}` of service `{service}` was not found")]
    CharacteristicNotFound {
        service: String,
        characteristic: String,
    },
    #[error("the transport rejected `{operation}` for `{address}`")]
    Rejected {
        operation: &'static str,
        address: String,
    },
    #[error("`{kind}` tasks cannot run on the fast write path")]
    UnsupportedOnFastPath { kind: TaskKind },
    #[error("the discovery session was cancelled before the scan window closed")]
    DiscoveryCancelled,
}

/// Errors returned while waiting on a queued task.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("the worker exited before completing the task")]
    Dropped,
    #[error(
        "the task did not complete within {bound}",
        bound = humantime::format_duration(*timeout)
    )]
    TimedOut { timeout: Duration },
    #[error(transparent)]
    Failed(#[from] TransportError),
}

/// Errors returned when parsing fake transport fixtures.
#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("the fake discovery fixture is empty")]
    EmptyFixture,
    #[error("fixture records must contain three pipe-delimited fields")]
    InvalidRecordFieldCount,
    #[error("fixture records cannot contain empty fields")]
    EmptyRecordField,
    #[error("failed to parse RSSI value")]
    InvalidRssi(#[from] std::num::ParseIntError),
    #[error(transparent)]
    InvalidAddress(#[from] ArgumentError),
}

/// Errors returned by telemetry initialisation.
#[derive(Debug, Error)]
pub(crate) enum TelemetryError {
    #[error("failed to install tracing subscriber")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}

/// Errors returned when CLI backend options are inconsistent.
#[derive(Debug, Error)]
pub(crate) enum CliConfigError {
    #[error("`--fake` requires `--fake-scan`")]
    MissingFakeScanFixture,
}
