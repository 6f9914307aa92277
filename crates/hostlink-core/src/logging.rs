//! Tracing subscriber setup.
//!
//! `RUST_LOG` overrides the configured level. Output goes to stderr unless a
//! log file is configured, in which case it is appended without ANSI colours.

use crate::config::{LogFormat, LoggingSettings};
use crate::error::{Error, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(settings: &LoggingSettings) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .map_err(|e| Error::Config(format!("invalid log level '{}': {}", settings.level, e)))?;

    let installed = match (&settings.file, settings.format) {
        (None, LogFormat::Text) => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .try_init(),
        (None, LogFormat::Json) => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init(),
        (Some(path), LogFormat::Text) => {
            let file = open_log_file(path)?;
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(file).with_ansi(false))
                .try_init()
        }
        (Some(path), LogFormat::Json) => {
            let file = open_log_file(path)?;
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(file))
                .try_init()
        }
    };

    installed.map_err(|e| Error::Config(format!("logging already initialised: {}", e)))
}

fn open_log_file(path: &std::path::Path) -> Result<std::sync::Mutex<std::fs::File>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    Ok(std::sync::Mutex::new(file))
}
