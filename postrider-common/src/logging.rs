//! Process-wide logging facade.
//!
//! One stdout layer, an optional plain-text file layer (tailed by the admin
//! `/logs` endpoint), and a reloadable level filter. The filter handle is the
//! only process-global this crate owns: the delivery engine's config overlay
//! calls [`set_level`] when an operator changes `logLevel` at runtime.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use tracing_subscriber::{
    Registry, filter::LevelFilter, layer::SubscriberExt, reload, util::SubscriberInitExt,
};

use crate::config::LogLevel;

static LEVEL_HANDLE: OnceLock<reload::Handle<LevelFilter, Registry>> = OnceLock::new();

const fn filter_for(level: LogLevel) -> LevelFilter {
    match level {
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Warning => LevelFilter::WARN,
        LogLevel::Error => LevelFilter::ERROR,
    }
}

/// Install the global subscriber.
///
/// Must be called once, before any task starts logging. Opens `log_file` in
/// append mode when given.
///
/// # Errors
///
/// Returns an error if the log file cannot be opened.
pub fn init(level: LogLevel, log_file: Option<&Path>) -> std::io::Result<()> {
    let (filter, handle) = reload::Layer::new(filter_for(level));

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Arc::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_target(false),
        )
        .with(file_layer)
        .init();

    let _ = LEVEL_HANDLE.set(handle);
    Ok(())
}

/// Retune the global level filter.
///
/// A no-op before [`init`]; failures to reload are reported on the old level
/// rather than propagated, since the caller is the delivery loop.
pub fn set_level(level: LogLevel) {
    if let Some(handle) = LEVEL_HANDLE.get()
        && let Err(error) = handle.reload(filter_for(level))
    {
        tracing::warn!(%error, "failed to apply log level change");
    }
}
