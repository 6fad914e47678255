use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use bon::Builder;
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use strum_macros::IntoStaticStr;
use tracing::level_filters::LevelFilter;

use crate::engine::{Backend, EngineConfig};
use crate::error::{ArgumentError, CliConfigError, FixtureError};
use crate::hw::{FakeTransport, FakeTransportConfig, ScanFixture};
use crate::model::DeviceAddress;
use crate::utils::parse_hex;

const DEFAULT_COMPLETION_WAIT: Duration = Duration::from_secs(5);

/// Command-line options for the BLE control tool.
#[derive(Debug, Parser)]
#[command(
    name = "blectl",
    about = "Scan, connect to and write to BLE peripherals.",
    arg_required_else_help = true
)]
pub struct Args {
    /// Log level; overrides `RUST_LOG`.
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogLevel>,
    /// Runs without a radio, reporting fixed placeholder devices.
    #[arg(long, global = true, conflicts_with = "fake")]
    mock: bool,
    /// Uses the fake BLE transport with fixture-driven discovery.
    #[arg(long, global = true)]
    fake: bool,
    /// Fake scan fixtures in the form `address|name|rssi;...`.
    #[arg(long, global = true, requires = "fake", required_if_eq("fake", "true"))]
    fake_scan: Option<ScanFixture>,
    /// Artificial fake discovery delay (e.g. `250ms`, `2s`).
    #[arg(long, global = true, requires = "fake", value_parser = parse_duration)]
    fake_discovery_delay: Option<Duration>,
    /// Artificial latency added to every fake transport operation.
    #[arg(long, global = true, requires = "fake", value_parser = parse_duration)]
    fake_latency: Option<Duration>,
    /// Makes fake connects to this address fail. May be repeated.
    #[arg(long, global = true, requires = "fake")]
    fake_fail_connect: Vec<DeviceAddress>,
    /// How long to wait for a queued operation to finish.
    #[arg(long, global = true, value_parser = parse_duration, default_value = "5s")]
    wait: Duration,
    #[command(subcommand)]
    command: Command,
}

impl Args {
    /// Creates argument values directly without CLI parsing.
    ///
    /// ```
    /// use blectl::{Args, Command};
    ///
    /// let args = Args::new(Command::Scan { duration_ms: 0 }).with_mock();
    /// let _ = args;
    /// ```
    #[must_use]
    pub fn new(command: Command) -> Self {
        Self {
            log_level: None,
            mock: false,
            fake: false,
            fake_scan: None,
            fake_discovery_delay: None,
            fake_latency: None,
            fake_fail_connect: Vec::new(),
            wait: DEFAULT_COMPLETION_WAIT,
            command,
        }
    }

    /// Forces mock mode.
    #[must_use]
    pub fn with_mock(mut self) -> Self {
        self.mock = true;
        self.fake = false;
        self
    }

    /// Enables the fake transport with pre-parsed settings.
    #[must_use]
    pub fn with_fake(mut self, fake: FakeArgs) -> Self {
        let FakeArgs {
            scan_fixture,
            discovery_delay,
            latency,
            failing_connects,
        } = fake;

        self.mock = false;
        self.fake = true;
        self.fake_scan = Some(scan_fixture);
        self.fake_discovery_delay = Some(discovery_delay);
        self.fake_latency = Some(latency);
        self.fake_fail_connect = failing_connects;
        self
    }

    /// Returns the log-level override, if any.
    #[must_use]
    pub fn log_level(&self) -> Option<LogLevel> {
        self.log_level
    }

    /// Returns the bound on waiting for a queued operation.
    #[must_use]
    pub fn wait(&self) -> Duration {
        self.wait
    }

    /// Splits parsed arguments into the command and the engine configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend options are inconsistent.
    pub fn into_command_and_config(self) -> anyhow::Result<(Command, EngineConfig)> {
        let Args {
            mock,
            fake,
            fake_scan,
            fake_discovery_delay,
            fake_latency,
            fake_fail_connect,
            command,
            ..
        } = self;

        let backend = if fake {
            let Some(scan_fixture) = fake_scan else {
                return Err(CliConfigError::MissingFakeScanFixture.into());
            };
            let fake_args = FakeArgs {
                scan_fixture,
                discovery_delay: fake_discovery_delay.unwrap_or(Duration::ZERO),
                latency: fake_latency.unwrap_or(Duration::ZERO),
                failing_connects: fake_fail_connect,
            };
            Backend::Transport(Arc::new(FakeTransport::new(
                fake_args.into_transport_config(),
            )))
        } else if mock {
            Backend::Mock
        } else {
            Backend::Auto
        };

        Ok((command, EngineConfig::builder().backend(backend).build()))
    }
}

/// Fake transport arguments for programmatic runs.
#[derive(Debug, Builder)]
pub struct FakeArgs {
    #[builder(with = |value: &str| -> Result<_, FixtureError> { value.parse() })]
    scan_fixture: ScanFixture,
    #[builder(default)]
    discovery_delay: Duration,
    #[builder(default)]
    latency: Duration,
    #[builder(default)]
    failing_connects: Vec<DeviceAddress>,
}

impl FakeArgs {
    pub(crate) fn into_transport_config(self) -> FakeTransportConfig {
        let Self {
            scan_fixture,
            discovery_delay,
            latency,
            failing_connects,
        } = self;

        FakeTransportConfig::builder()
            .scan_fixture(scan_fixture)
            .discovery_delay(discovery_delay)
            .latency(latency)
            .failing_connects(failing_connects)
            .build()
    }
}

/// Supported CLI commands.
#[derive(Debug, Subcommand, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Command {
    /// Scan for devices and print everything discovered so far.
    Scan {
        /// Scan duration in milliseconds.
        #[arg(default_value_t = 5000)]
        duration_ms: u64,
    },
    /// Connect to a device.
    Connect { address: DeviceAddress },
    /// Disconnect from a device.
    Disconnect { address: DeviceAddress },
    /// Write hexadecimal bytes to a characteristic.
    Write(WriteArgs),
    /// Read a characteristic and print its value as hexadecimal.
    Read(ReadArgs),
    /// Print the last-known RSSI of a device.
    Rssi { address: DeviceAddress },
    /// Request an MTU size for a device.
    Mtu {
        address: DeviceAddress,
        #[arg(value_parser = clap::value_parser!(u32).range(1..))]
        size: u32,
    },
}

impl Command {
    pub(crate) fn name(&self) -> &'static str {
        self.into()
    }
}

/// Arguments for `write`.
#[derive(Debug, ClapArgs)]
pub struct WriteArgs {
    pub(crate) address: DeviceAddress,
    pub(crate) service: String,
    pub(crate) characteristic: String,
    /// Payload as contiguous hexadecimal digits, e.g. `0102AA`.
    pub(crate) data: HexPayload,
    /// Write path; `fast` writes without response on the fast queue.
    #[arg(value_enum)]
    pub(crate) path: Option<WritePath>,
}

impl WriteArgs {
    /// Creates write arguments.
    ///
    /// ```
    /// use blectl::{HexPayload, WriteArgs, WritePath};
    ///
    /// let data: HexPayload = "0102AA".parse()?;
    /// let args = WriteArgs::new("AA:BB:CC:DD:EE:FF".parse()?, "180f", "2a19", data, WritePath::Fast);
    /// let _ = args;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    #[must_use]
    pub fn new(
        address: DeviceAddress,
        service: impl Into<String>,
        characteristic: impl Into<String>,
        data: HexPayload,
        path: WritePath,
    ) -> Self {
        Self {
            address,
            service: service.into(),
            characteristic: characteristic.into(),
            data,
            path: Some(path),
        }
    }

    pub(crate) fn is_fast(&self) -> bool {
        self.path == Some(WritePath::Fast)
    }
}

/// Arguments for `read`.
#[derive(Debug, ClapArgs)]
pub struct ReadArgs {
    pub(crate) address: DeviceAddress,
    pub(crate) service: String,
    pub(crate) characteristic: String,
}

impl ReadArgs {
    #[must_use]
    pub fn new(
        address: DeviceAddress,
        service: impl Into<String>,
        characteristic: impl Into<String>,
    ) -> Self {
        Self {
            address,
            service: service.into(),
            characteristic: characteristic.into(),
        }
    }
}

/// Queue a write is sent on.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum WritePath {
    /// Acknowledged write, ordered with connection tasks.
    Ordered,
    /// Write without response.
    Fast,
}

/// Bytes parsed from a contiguous hexadecimal string.
#[derive(Debug, Clone, Eq, PartialEq, derive_more::From, derive_more::Into)]
pub struct HexPayload(Vec<u8>);

impl HexPayload {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl FromStr for HexPayload {
    type Err = ArgumentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        parse_hex(value).map(Self)
    }
}

/// Log levels accepted by `--log-level`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub(crate) fn as_level_filter(self) -> LevelFilter {
        match self {
            Self::Off => LevelFilter::OFF,
            Self::Error => LevelFilter::ERROR,
            Self::Warn => LevelFilter::WARN,
            Self::Info => LevelFilter::INFO,
            Self::Debug => LevelFilter::DEBUG,
            Self::Trace => LevelFilter::TRACE,
        }
    }
}

fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime::parse_duration(value).map_err(|error| error.to_string())
}
