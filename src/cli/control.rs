use std::io;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, instrument};

use crate::cli::command::{Command, ReadArgs, WriteArgs};
use crate::engine::{BleEngine, Completion};
use crate::error::CompletionError;
use crate::model::{DeviceInfo, TaskOutput};

/// Most devices printed by `scan`.
const MAX_SCAN_RESULTS: usize = 100;

/// JSON line emitted by a command.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum CommandOutput {
    Scan {
        results: Vec<DeviceInfo>,
    },
    Outcome {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Rssi {
        rssi: i16,
    },
}

impl CommandOutput {
    fn success() -> Self {
        Self::Outcome {
            success: true,
            data: None,
            error: None,
        }
    }

    fn from_completion(result: Result<TaskOutput, CompletionError>) -> Self {
        match result {
            Ok(TaskOutput::Done) => Self::success(),
            Ok(TaskOutput::Data(data)) => Self::Outcome {
                success: true,
                data: Some(hex::encode_upper(data)),
                error: None,
            },
            Err(error) => Self::Outcome {
                success: false,
                data: None,
                error: Some(error.to_string()),
            },
        }
    }
}

/// Runs one command against `engine` and prints its JSON line to `out`.
#[instrument(skip(engine, out), level = "debug", fields(command = %command.name()))]
pub(crate) fn run<W>(
    engine: &BleEngine,
    command: Command,
    out: &mut W,
    completion_timeout: Duration,
) -> Result<()>
where
    W: io::Write,
{
    let wait = |completion: Completion| {
        CommandOutput::from_completion(completion.wait_timeout(completion_timeout))
    };

    let output = match command {
        Command::Scan { duration_ms } => {
            let inserted = engine
                .scan(Duration::from_millis(duration_ms))
                .context("scan failed")?;
            info!(inserted, "scan complete");
            CommandOutput::Scan {
                results: engine.scan_results(MAX_SCAN_RESULTS),
            }
        }
        Command::Connect { address } => wait(engine.connect(&address.to_string())?),
        Command::Disconnect { address } => wait(engine.disconnect(&address.to_string())?),
        Command::Write(args) => wait(write(engine, &args)?),
        Command::Read(args) => wait(read(engine, &args)?),
        Command::Rssi { address } => CommandOutput::Rssi {
            rssi: engine.rssi(&address.to_string()),
        },
        Command::Mtu { address, size } => {
            engine.set_mtu(&address.to_string(), size)?;
            CommandOutput::success()
        }
    };

    serde_json::to_writer(&mut *out, &output).context("failed to serialise command output")?;
    writeln!(out).context("failed to write command output")?;
    Ok(())
}

fn write(engine: &BleEngine, args: &WriteArgs) -> Result<Completion> {
    let completion = engine.write(
        &args.address.to_string(),
        &args.service,
        &args.characteristic,
        args.data.as_bytes(),
        args.is_fast(),
    )?;
    Ok(completion)
}

fn read(engine: &BleEngine, args: &ReadArgs) -> Result<Completion> {
    let completion = engine.read(
        &args.address.to_string(),
        &args.service,
        &args.characteristic,
    )?;
    Ok(completion)
}
