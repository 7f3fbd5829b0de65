use clap::ValueEnum;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{filter::LevelFilter, fmt, EnvFilter};

const DEFAULT_LOG_PREFIX: &str = "threshold-server.log";

#[derive(Debug, Clone, ValueEnum, PartialEq)]
pub enum LogLevel {
    No,
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn to_tracing_level(&self) -> Option<Level> {
        match self {
            LogLevel::No => None,
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Warning => Some(Level::WARN),
            LogLevel::Error => Some(Level::ERROR),
        }
    }
}

/// Directory and file prefix for the daily rolled log.
fn rolling_target(log_file: &Path) -> (PathBuf, OsString) {
    let dir = log_file
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or(Path::new("."))
        .to_path_buf();
    let prefix = log_file
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| OsString::from(DEFAULT_LOG_PREFIX));

    (dir, prefix)
}

/// Installs the global subscriber, `RUST_LOG` overrides the level. With a log
/// file the output rolls daily next to it, otherwise it goes to stdout. Request
/// work runs on the blocking pool, so thread names are kept in every line.
/// The returned guard must outlive the server.
pub fn init_logger(log_level: LogLevel, log_file: Option<PathBuf>) -> Option<WorkerGuard> {
    let level = log_level.to_tracing_level()?;

    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();

    let (writer, guard) = match &log_file {
        Some(path) => {
            let (dir, prefix) = rolling_target(path);
            let (non_blocking, guard) = tracing_appender::non_blocking(rolling::daily(dir, prefix));
            (BoxMakeWriter::new(non_blocking), Some(guard))
        }
        None => (BoxMakeWriter::new(io::stdout), None),
    };

    let subscriber = fmt()
        .with_writer(writer)
        .with_ansi(log_file.is_none())
        .with_env_filter(env_filter)
        .with_thread_names(true)
        .with_file(false)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Couldn't install log subscriber");

    //We need to keep the worker guard alive
    guard
}
