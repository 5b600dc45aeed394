use std::fs;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initializes tracing with a console layer and a daily-rotated JSON file.
///
/// The file sink lives under `SCRUB_LOG_DIR` (default `logs/`). `RUST_LOG`
/// still controls filtering; the crate itself defaults to info.
pub fn init_logging() {
    let log_dir = std::env::var("SCRUB_LOG_DIR").unwrap_or_else(|_| "logs".to_string());
    let _ = fs::create_dir_all(&log_dir);

    let file_appender = tracing_appender::rolling::daily(&log_dir, "tabscrub.log");
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer().json().with_writer(non_blocking_writer);
    let console_layer = fmt::layer().with_writer(std::io::stdout);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("tabscrub=info".parse().unwrap()))
        .with(file_layer)
        .with(console_layer)
        .init();

    // The guard must outlive the process or buffered log lines are dropped
    std::mem::forget(guard);
}
