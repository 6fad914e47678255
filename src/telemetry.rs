use std::io::{self, IsTerminal};
use std::sync::OnceLock;
use std::time::Duration;

use indicatif::ProgressStyle;
use opentelemetry::global;
use opentelemetry::trace::TracerProvider as _;
use tracing::Metadata;
use tracing::level_filters::LevelFilter;
use tracing_indicatif::{IndicatifLayer, TickSettings};
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, filter, fmt};

use crate::error::TelemetryError;

const DEFAULT_FILTER: &str = "warn";
/// Spans carrying this field are rendered as spinners on interactive terminals.
const PROGRESS_FIELD: &str = "progress";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

static TRACING_INITIALISED: OnceLock<Result<(), TelemetryError>> = OnceLock::new();

/// Initialises structured logging and OpenTelemetry tracing support.
///
/// Only the first call in a process has any effect. Log output always goes to
/// stderr.
pub(crate) fn initialise_tracing(
    service_name: &str,
    interactive_terminal: bool,
    level_override: Option<LevelFilter>,
) -> Result<(), &'static TelemetryError> {
    TRACING_INITIALISED
        .get_or_init(|| initialise_tracing_once(service_name, interactive_terminal, level_override))
        .as_ref()
        .copied()
}

fn initialise_tracing_once(
    service_name: &str,
    interactive_terminal: bool,
    level_override: Option<LevelFilter>,
) -> Result<(), TelemetryError> {
    let tracer_provider = opentelemetry_sdk::trace::SdkTracerProvider::builder().build();
    let tracer = tracer_provider.tracer(service_name.to_owned());
    global::set_tracer_provider(tracer_provider);

    let log_filter = log_filter(level_override);
    let (output_layer, progress_layer): (BoxedLayer, _) =
        if interactive_terminal && io::stderr().is_terminal() {
            let indicatif_layer = IndicatifLayer::new()
                .with_progress_style(progress_style())
                .with_tick_settings(progress_tick_settings());
            let output_layer = fmt::layer()
                .pretty()
                .with_target(false)
                .with_writer(indicatif_layer.get_stderr_writer())
                .with_filter(log_filter)
                .boxed();
            let progress_layer =
                indicatif_layer.with_filter(filter::filter_fn(progress_span_filter));
            (output_layer, Some(progress_layer))
        } else {
            let output_layer = fmt::layer()
                .json()
                .with_target(false)
                .with_writer(io::stderr)
                .with_filter(log_filter)
                .boxed();
            (output_layer, None)
        };

    tracing_subscriber::registry()
        .with(output_layer)
        .with(progress_layer)
        .with(OpenTelemetryLayer::new(tracer))
        .try_init()?;
    Ok(())
}

fn log_filter(level_override: Option<LevelFilter>) -> EnvFilter {
    match level_override {
        Some(level) => EnvFilter::new(level.to_string()),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
    }
}

fn progress_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan.bold} {msg}")
        .unwrap_or_else(|_error| ProgressStyle::default_spinner())
}

fn progress_tick_settings() -> TickSettings {
    TickSettings {
        default_tick_interval: Some(Duration::from_millis(90)),
        ..TickSettings::default()
    }
}

fn progress_span_filter(metadata: &Metadata<'_>) -> bool {
    metadata.is_span()
        && metadata.target().starts_with("blectl::")
        && metadata.fields().field(PROGRESS_FIELD).is_some()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(LevelFilter::DEBUG, "debug")]
    #[case(LevelFilter::OFF, "off")]
    fn explicit_level_overrides_environment(#[case] level: LevelFilter, #[case] expected: &str) {
        assert_eq!(expected, log_filter(Some(level)).to_string());
    }
}
