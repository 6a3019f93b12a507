//! Logging and tracing configuration
//!
//! One-shot commands log to stderr. Interactive commands (REPL, debugger)
//! log to a file so log lines never interleave with the prompt.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use super::paths;

/// File name of the interactive session log
const LOG_FILE: &str = "session.log";

fn default_filter(directives: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives))
}

/// Initialize tracing for one-shot commands (stderr logging)
///
/// Logs are controlled by the `RUST_LOG` environment variable.
/// Default level is INFO for this crate, WARN for dependencies.
pub fn init_cli() {
    tracing_subscriber::registry()
        .with(default_filter("microscript=info,warn"))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .init();
}

/// Initialize tracing for interactive commands (file logging)
///
/// Writes to `<data dir>/logs/session.log` through a non-blocking writer.
/// The returned guard must be held until exit so buffered lines are flushed.
/// Falls back to WARN-level stderr logging if the log directory is unusable.
pub fn init_interactive() -> Option<(PathBuf, WorkerGuard)> {
    let log_dir = paths::log_dir().filter(|dir| std::fs::create_dir_all(dir).is_ok());

    let Some(log_dir) = log_dir else {
        tracing_subscriber::registry()
            .with(default_filter("microscript=warn,warn"))
            .with(fmt::layer().with_writer(std::io::stderr).compact())
            .init();
        return None;
    };

    let appender = tracing_appender::rolling::never(&log_dir, LOG_FILE);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(default_filter("microscript=debug,info"))
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true),
        )
        .init();

    Some((log_dir.join(LOG_FILE), guard))
}
