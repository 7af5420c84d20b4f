//! Tracing setup. The TUI owns the terminal, so `run` logs to a daily file
//! only; `check` also echoes to stderr.

use std::env;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const LOG_FILE_NAME: &str = "dispatchator.log";

fn filter() -> EnvFilter {
    let debug_enabled = env::var("DISPATCH_DEBUG_LOG")
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    if debug_enabled {
        return EnvFilter::new("debug");
    }
    EnvFilter::try_from_env("DISPATCH_LOG").unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Keep the returned guard alive for the life of the process, or buffered
/// lines are lost on exit.
pub fn init(echo_stderr: bool) -> Option<WorkerGuard> {
    let file = dispatch_core::log_dir().and_then(|dir| {
        fs_err::create_dir_all(&dir).ok()?;
        Some(tracing_appender::rolling::daily(dir, LOG_FILE_NAME))
    });
    let (writer, guard) = match file {
        Some(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    let file_layer = writer.map(|writer| fmt::layer().with_writer(writer).with_ansi(false));
    let stderr_layer = echo_stderr.then(|| fmt::layer().with_writer(std::io::stderr));

    let _ = tracing_subscriber::registry()
        .with(filter())
        .with(file_layer)
        .with(stderr_layer)
        .try_init();
    guard
}
