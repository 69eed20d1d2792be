pub mod bpt;
pub mod catalog;
pub mod common;
pub mod config;
pub mod dm;
pub mod execution;
pub mod page_cache;
pub mod server;
pub mod sql;
pub mod tss;
pub mod vm;
pub mod wal;

use std::fs;
use std::path;

use tracing_subscriber::prelude::*;

/// Wires up the dual stdout/rolling-file tracing layers the rest of the
/// crate logs through (Launcher.go relied on the implicit Go `log`
/// package; this expands to a `tracing`/`tracing-appender` layered setup
/// instead).
pub fn init_log() {
    let log_dir = path::Path::new(config::LOG_PATH).parent().unwrap();
    let log_filename = path::Path::new(config::LOG_PATH).file_name().unwrap().to_str().unwrap();
    fs::create_dir_all(log_dir).unwrap();

    let stdout_log = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(true)
        .with_thread_names(true)
        .with_level(true);

    let file_appender = tracing_appender::rolling::daily(log_dir, log_filename);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Leaked so the writer stays alive for the process lifetime; the
    // launcher binary never tears down logging before exit.
    Box::leak(Box::new(guard));

    let file_log = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_thread_names(true)
        .with_level(true);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config::LOG_LEVEL))
        .with(stdout_log)
        .with(file_log)
        .init();
}
