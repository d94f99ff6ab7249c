use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::sync::Arc;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

use crate::config::LoggingConfig;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Installs the global subscriber. `RUST_LOG` wins over `config.level`.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let json = config.format == "json";
    let fmt_layer: BoxedLayer = match &config.file_path {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path))?;
            let writer = Arc::new(file);
            if json {
                fmt::layer().json().with_span_events(FmtSpan::CLOSE).with_writer(writer).boxed()
            } else {
                fmt::layer().with_ansi(false).with_span_events(FmtSpan::CLOSE).with_writer(writer).boxed()
            }
        }
        None => {
            if json {
                fmt::layer().json().with_span_events(FmtSpan::CLOSE).with_thread_ids(true).boxed()
            } else {
                fmt::layer().with_span_events(FmtSpan::CLOSE).with_thread_ids(true).boxed()
            }
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .try_init()
        .context("Logging already initialized")?;

    tracing::info!(level = %config.level, format = %config.format, "Logging initialized");
    Ok(())
}
