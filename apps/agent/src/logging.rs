use directories::ProjectDirs;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Stdout plus a daily rolling file. `RUST_LOG` overrides the default level
/// (debug in debug builds, info in release).
pub fn init_logging(log_dir_override: Option<PathBuf>) -> Option<WorkerGuard> {
    let default_level = if cfg!(debug_assertions) { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let stdout_layer = fmt::layer().with_target(false).with_level(true);
    let registry = tracing_subscriber::registry().with(filter).with(stdout_layer);

    match log_dir_override.or_else(default_log_dir).and_then(ensure_dir) {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(dir, "cronvault-agent.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let file_layer = fmt::layer()
                .with_target(false)
                .with_level(true)
                .with_ansi(false)
                .with_writer(non_blocking);
            registry.with(file_layer).init();
            Some(guard)
        }
        None => {
            registry.init();
            None
        }
    }
}

fn default_log_dir() -> Option<PathBuf> {
    let proj = ProjectDirs::from("com", "cronvault", "Cronvault")?;
    Some(proj.data_local_dir().join("logs"))
}

fn ensure_dir(dir: PathBuf) -> Option<PathBuf> {
    if let Err(err) = std::fs::create_dir_all(&dir) {
        eprintln!("Failed to create log dir: {}", err);
        return None;
    }
    Some(dir)
}

/// Keeps secrets, filesystem paths and raw command output out of log lines.
pub struct Redact<T>(T);

impl<T> Redact<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }
}

impl<T> std::fmt::Display for Redact<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<redacted>")
    }
}
