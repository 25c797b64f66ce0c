//! Structured logging setup.
//!
//! Builds a `tracing` subscriber with:
//! - an `EnvFilter` honouring `RUST_LOG`, falling back to a caller default
//! - either Bunyan-formatted JSON or human-readable output
//! - a `LogTracer` bridge so `log` records from the HTTP stack are captured
//!
//! The command-line binary writes logs to stderr so stdout carries only
//! detection results.

use std::str::FromStr;

use tracing::Subscriber;
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_log::LogTracer;
use tracing_subscriber::{EnvFilter, Registry, fmt, fmt::MakeWriter, layer::SubscriberExt};

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Compact human-readable lines
    #[default]
    Pretty,
    /// Bunyan JSON, one object per line
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" | "bunyan" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Composes the subscriber without installing it.
///
/// # Parameters
/// - `name`: service name recorded in JSON output
/// - `env_filter`: directive used when `RUST_LOG` is unset (e.g. `"warn"`)
/// - `format`: output format
/// - `sink`: where log lines are written
pub fn get_subscriber<Sink>(
    name: String,
    env_filter: String,
    format: LogFormat,
    sink: Sink,
) -> impl Subscriber + Send + Sync
where
    Sink: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(env_filter));

    let (storage_layer, bunyan_layer, pretty_layer) = match format {
        LogFormat::Json => (
            Some(JsonStorageLayer),
            Some(BunyanFormattingLayer::new(name, sink)),
            None,
        ),
        LogFormat::Pretty => (
            None,
            None,
            Some(fmt::layer().compact().with_target(false).with_writer(sink)),
        ),
    };

    Registry::default()
        .with(env_filter)
        .with(storage_layer)
        .with(bunyan_layer)
        .with(pretty_layer)
}

/// Installs `subscriber` as the global default.
///
/// Must be called once per process.
///
/// # Errors
/// Fails if a logger or global subscriber was already installed.
pub fn init_subscriber(subscriber: impl Subscriber + Send + Sync) -> anyhow::Result<()> {
    LogTracer::init()?;
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
