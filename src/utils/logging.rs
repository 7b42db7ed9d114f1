//! Structured logging setup.
//!
//! The library itself only emits `tracing` events. Binaries, tests and benches that
//! want to see them call [`init_logging`] once with a [`LoggingConfig`].

use crate::config::LoggingConfig;
use crate::error::{ProtocolError, Result};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Install a global subscriber built from `config`.
///
/// `RUST_LOG` overrides the configured level when set. Fails if a global subscriber
/// is already installed or the log file cannot be opened.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str().to_lowercase()));

    let mut layers: Vec<BoxedLayer> = Vec::new();

    if config.log_to_console {
        layers.push(build_layer(config.json_format, std::io::stderr, true));
    }

    if config.log_to_file {
        let path = config.log_file_path.as_deref().ok_or_else(|| {
            ProtocolError::ConfigError("log_to_file is set without log_file_path".to_string())
        })?;
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        layers.push(build_layer(config.json_format, Mutex::new(file), false));
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| ProtocolError::ConfigError(format!("Failed to install subscriber: {e}")))?;

    tracing::info!(app = %config.app_name, level = %config.log_level, "Logging initialized");
    Ok(())
}

fn build_layer<W>(json: bool, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    if json {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_writer(writer)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_ansi(ansi)
            .with_writer(writer)
            .boxed()
    }
}
