use std::io;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::instrument;

use crate::cli::{Command, LogLevel};
use crate::engine::{BleEngine, EngineConfig};
use crate::telemetry;

pub(crate) const SERVICE_NAME: &str = "blectl";

/// Runs one CLI command on a fresh engine.
///
/// ```
/// use std::time::Duration;
///
/// use clap::Parser;
///
/// let args = blectl::Args::try_parse_from(["blectl", "--mock", "rssi", "AA:BB:CC:DD:EE:FF"])?;
/// let wait = args.wait();
/// let (command, config) = args.into_command_and_config()?;
/// let mut out = Vec::new();
/// blectl::run(command, &mut out, config, wait)?;
/// assert_eq!("{\"rssi\":-55}\n", String::from_utf8(out)?);
/// # Ok::<(), anyhow::Error>(())
/// ```
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, the engine cannot start,
/// an argument is rejected, or output writing fails.
pub fn run<W>(
    command: Command,
    out: &mut W,
    config: EngineConfig,
    completion_timeout: Duration,
) -> Result<()>
where
    W: io::Write,
{
    run_with_log_level(command, out, config, completion_timeout, None)
}

/// Runs one CLI command with an explicit telemetry log-level override.
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, the engine cannot start,
/// an argument is rejected, or output writing fails.
#[instrument(
    skip(out, config),
    level = "info",
    fields(command = %command.name(), ?log_level)
)]
pub fn run_with_log_level<W>(
    command: Command,
    out: &mut W,
    config: EngineConfig,
    completion_timeout: Duration,
    log_level: Option<LogLevel>,
) -> Result<()>
where
    W: io::Write,
{
    telemetry::initialise_tracing(
        SERVICE_NAME,
        true,
        log_level.map(LogLevel::as_level_filter),
    )?;

    let engine = BleEngine::new(config).context("failed to start the BLE engine")?;
    crate::cli::control::run(&engine, command, out, completion_timeout)
}
