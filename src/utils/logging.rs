//! Tracing subscriber setup.
//!
//! The engine emits structured `tracing` events throughout; this module
//! turns a [`LoggingConfig`] into the global subscriber. Output goes to
//! stderr, or to the configured log file in append mode. The `json`
//! format writes one object per line for log shippers; `compact` is the
//! grep-friendly text default.

use std::fs::{File, OpenOptions};
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};
use crate::error::Result;

/// Install the global tracing subscriber from config.
///
/// Call once at startup, before the first event. A `RUST_LOG` environment
/// variable overrides `cfg.level`.
///
/// # Errors
/// Returns an error when the configured log file cannot be opened.
pub fn init_logging(cfg: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.level));

    let sink: Option<Arc<File>> = match &cfg.file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(Arc::new(file))
        }
        None => None,
    };

    if cfg.format == LogFormat::Json {
        let builder = tracing_subscriber::fmt().json().with_env_filter(filter);
        match sink {
            Some(file) => builder.with_writer(file).init(),
            None => builder.init(),
        }
    } else {
        let builder = tracing_subscriber::fmt()
            .compact()
            .with_target(true)
            .with_env_filter(filter);
        match sink {
            // No colour codes in log files
            Some(file) => builder.with_ansi(false).with_writer(file).init(),
            None => builder.init(),
        }
    }

    Ok(())
}
