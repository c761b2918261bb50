//! Logging and tracing configuration
//!
//! The driver runs as a child of a test process, so stderr stays quiet unless
//! something goes wrong. A log file can be configured for full detail.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

/// Default filter: warnings only, so a clean run prints nothing
const DEFAULT_FILTER: &str = "emu_driver=warn,warn";

/// Default filter for the log file
const DEFAULT_FILE_FILTER: &str = "emu_driver=debug,emulator=debug,info";

/// Initialize tracing
///
/// Logs are controlled by the `RUST_LOG` environment variable. When `file` is
/// given, a second layer writes to it through a non-blocking appender; the
/// returned guard must be held until exit so buffered lines are flushed.
pub fn init(file: Option<&Path>) -> Option<WorkerGuard> {
    let stderr_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .with_filter(stderr_filter);

    let Some(path) = file else {
        tracing_subscriber::registry().with(stderr_layer).init();
        return None;
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let Some(name) = path.file_name() else {
        eprintln!("Warning: Invalid log file path: {}", path.display());
        tracing_subscriber::registry().with(stderr_layer).init();
        return None;
    };
    if let Err(e) = std::fs::create_dir_all(dir) {
        eprintln!("Warning: Could not create log directory: {}", e);
        tracing_subscriber::registry().with(stderr_layer).init();
        return None;
    }

    let appender = tracing_appender::rolling::never(dir, name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let file_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILE_FILTER));

    let file_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter(file_filter);

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Some(guard)
}
