use std::time::{Duration, Instant};

use clap::Parser;
use clap::error::ErrorKind;
use insta::assert_snapshot;
use pretty_assertions::assert_eq;

fn run_with_parsed_args(args: blectl::Args) -> anyhow::Result<String> {
    let mut output = Vec::new();
    let wait = args.wait();
    let (command, config) = args.into_command_and_config()?;
    blectl::run(command, &mut output, config, wait)?;
    Ok(String::from_utf8(output)?)
}

fn run_with_argv<const N: usize>(argv: [&str; N]) -> anyhow::Result<String> {
    let parsed_args = blectl::Args::try_parse_from(argv)?;
    run_with_parsed_args(parsed_args)
}

#[test]
fn mock_scan_prints_placeholder_devices() -> anyhow::Result<()> {
    let stdout = run_with_argv(["blectl", "--mock", "scan", "0"])?;

    assert_snapshot!(stdout.trim_end(), @r#"{"results":[{"address":"11:22:33:44:55:66","name":"MockDevice_2","rssi":-75},{"address":"AA:BB:CC:DD:EE:FF","name":"MockDevice_1","rssi":-60}]}"#);
    Ok(())
}

#[test]
fn output_is_a_single_line() -> anyhow::Result<()> {
    let stdout = run_with_argv(["blectl", "--mock", "scan", "0"])?;

    assert_eq!(1, stdout.lines().count());
    assert!(stdout.ends_with('\n'));
    Ok(())
}

#[test]
fn mock_connect_reports_success() -> anyhow::Result<()> {
    let stdout = run_with_argv(["blectl", "--mock", "connect", "AA:BB:CC:DD:EE:FF"])?;

    assert_snapshot!(stdout.trim_end(), @r#"{"success":true}"#);
    Ok(())
}

#[test]
fn mock_disconnect_reports_success() -> anyhow::Result<()> {
    let stdout = run_with_argv(["blectl", "--mock", "disconnect", "AA:BB:CC:DD:EE:FF"])?;

    assert_snapshot!(stdout.trim_end(), @r#"{"success":true}"#);
    Ok(())
}

#[test]
fn mock_fast_write_reports_success() -> anyhow::Result<()> {
    let stdout = run_with_argv([
        "blectl",
        "--mock",
        "write",
        "AA:BB:CC:DD:EE:FF",
        "180f",
        "2a19",
        "0102AA",
        "fast",
    ])?;

    assert_snapshot!(stdout.trim_end(), @r#"{"success":true}"#);
    Ok(())
}

#[test]
fn mock_read_prints_empty_hex() -> anyhow::Result<()> {
    let stdout = run_with_argv(["blectl", "--mock", "read", "AA:BB:CC:DD:EE:FF", "180f", "2a19"])?;

    assert_snapshot!(stdout.trim_end(), @r#"{"success":true,"data":""}"#);
    Ok(())
}

#[test]
fn mock_rssi_is_synthetic_for_unknown_device() -> anyhow::Result<()> {
    let stdout = run_with_argv(["blectl", "--mock", "rssi", "AA:BB:CC:DD:EE:FF"])?;

    assert_snapshot!(stdout.trim_end(), @r#"{"rssi":-55}"#);
    Ok(())
}

#[test]
fn mtu_accepts_positive_size() -> anyhow::Result<()> {
    let stdout = run_with_argv(["blectl", "--mock", "mtu", "AA:BB:CC:DD:EE:FF", "247"])?;

    assert_snapshot!(stdout.trim_end(), @r#"{"success":true}"#);
    Ok(())
}

#[test]
fn fake_scan_prints_fixture_devices() -> anyhow::Result<()> {
    let fake = blectl::FakeArgs::builder()
        .scan_fixture("AA:BB:CC:DD:EE:02|Speaker|-67;AA:BB:CC:DD:EE:01|Sensor|-41")?
        .build();
    let args = blectl::Args::new(blectl::Command::Scan { duration_ms: 0 }).with_fake(fake);

    let stdout = run_with_parsed_args(args)?;

    assert_snapshot!(stdout.trim_end(), @r#"{"results":[{"address":"AA:BB:CC:DD:EE:01","name":"Sensor","rssi":-41},{"address":"AA:BB:CC:DD:EE:02","name":"Speaker","rssi":-67}]}"#);
    Ok(())
}

#[test]
fn fake_connect_failure_is_reported_in_output() -> anyhow::Result<()> {
    let stdout = run_with_argv([
        "blectl",
        "--fake",
        "--fake-scan",
        "AA:BB:CC:DD:EE:01|Sensor|-41",
        "--fake-fail-connect",
        "AA:BB:CC:DD:EE:01",
        "connect",
        "AA:BB:CC:DD:EE:01",
    ])?;

    assert_snapshot!(stdout.trim_end(), @r#"{"success":false,"error":"the transport rejected `connect` for `AA:BB:CC:DD:EE:01`"}"#);
    Ok(())
}

#[test]
fn fake_write_without_connection_fails() -> anyhow::Result<()> {
    let stdout = run_with_argv([
        "blectl",
        "--fake",
        "--fake-scan",
        "AA:BB:CC:DD:EE:01|Sensor|-41",
        "write",
        "AA:BB:CC:DD:EE:01",
        "180f",
        "2a19",
        "01",
    ])?;

    assert_snapshot!(stdout.trim_end(), @r#"{"success":false,"error":"device `AA:BB:CC:DD:EE:01` is not connected"}"#);
    Ok(())
}

#[test]
fn wait_bound_is_reported_when_exceeded() -> anyhow::Result<()> {
    let stdout = run_with_argv([
        "blectl",
        "--fake",
        "--fake-scan",
        "AA:BB:CC:DD:EE:01|Sensor|-41",
        "--fake-latency",
        "100ms",
        "--wait",
        "10ms",
        "connect",
        "AA:BB:CC:DD:EE:01",
    ])?;

    assert_snapshot!(stdout.trim_end(), @r#"{"success":false,"error":"the task did not complete within 10ms"}"#);
    Ok(())
}

#[test]
fn fake_discovery_delay_is_applied() -> anyhow::Result<()> {
    let started_at = Instant::now();
    let stdout = run_with_argv([
        "blectl",
        "--fake",
        "--fake-scan",
        "AA:BB:CC:DD:EE:01|Sensor|-41",
        "--fake-discovery-delay",
        "40ms",
        "scan",
        "300",
    ])?;

    assert!(started_at.elapsed() >= Duration::from_millis(300));
    assert!(stdout.contains("\"Sensor\""));
    Ok(())
}

#[test]
fn invalid_fixture_is_rejected() {
    let result = blectl::FakeArgs::builder().scan_fixture("invalid-record");

    assert!(matches!(
        result,
        Err(blectl::FixtureError::InvalidRecordFieldCount)
    ));
}

#[test]
fn mtu_rejects_zero_size() {
    let result = blectl::Args::try_parse_from(["blectl", "mtu", "AA:BB:CC:DD:EE:FF", "0"]);

    let error = result.expect_err("mtu 0 should fail command parsing");
    assert_eq!(ErrorKind::ValueValidation, error.kind());
}

#[test]
fn write_rejects_non_hex_payload() {
    let result = blectl::Args::try_parse_from([
        "blectl",
        "write",
        "AA:BB:CC:DD:EE:FF",
        "180f",
        "2a19",
        "ZZ",
    ]);

    let error = result.expect_err("non-hex payload should fail command parsing");
    assert_eq!(ErrorKind::ValueValidation, error.kind());
}
