//! Run-scoped logging.
//!
//! [`init`] builds a `tracing` subscriber (stderr, plus an optional
//! timestamped file under `logging.dir`) and installs it as the default
//! for the current thread only. The returned [`LogGuard`] owns it: when the
//! guard drops, the subscriber is uninstalled and the file writer flushed.
//! The pipeline never spawns tasks. Work moved onto a blocking thread
//! (index persistence, local embedding) clones the current
//! `tracing::Dispatch` and re-installs it there with
//! `tracing::dispatcher::with_default`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::subscriber::DefaultGuard;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Layer, Registry};

use crate::config::LoggingConfig;

/// Keeps the run's logging context alive.
pub struct LogGuard {
    _default: DefaultGuard,
    _file: Option<WorkerGuard>,
    log_file: Option<PathBuf>,
}

impl LogGuard {
    pub fn log_file(&self) -> Option<&PathBuf> {
        self.log_file.as_ref()
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

pub fn init(config: &LoggingConfig) -> Result<LogGuard> {
    let filter = build_filter(&config.level)?;
    let mut layers: Vec<BoxedLayer> = Vec::new();

    let stderr = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);
    layers.push(if config.json {
        stderr.json().boxed()
    } else {
        stderr.boxed()
    });

    let mut file_guard = None;
    let mut log_file = None;
    if let Some(ref dir) = config.dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
        let name = format!(
            "ingest_{}.log",
            chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
        );
        let appender = tracing_appender::rolling::never(dir, &name);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        layers.push(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .boxed(),
        );
        file_guard = Some(guard);
        log_file = Some(dir.join(name));
    }

    let subscriber = tracing_subscriber::registry().with(layers).with(filter);
    let default = tracing::subscriber::set_default(subscriber);

    if let Some(ref path) = log_file {
        tracing::debug!(path = %path.display(), "logging to file");
    }

    Ok(LogGuard {
        _default: default,
        _file: file_guard,
        log_file,
    })
}

/// `RUST_LOG` wins over the configured level. HTTP client crates are
/// capped at `warn` either way.
fn build_filter(level: &str) -> Result<EnvFilter> {
    let base = std::env::var("RUST_LOG").unwrap_or_else(|_| level.to_string());
    let filter = EnvFilter::try_new(base)
        .with_context(|| format!("Invalid log level: '{}'", level))?
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=warn".parse()?);
    Ok(filter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_logging_creates_timestamped_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = LoggingConfig {
            level: "info".to_string(),
            dir: Some(tmp.path().join("logs")),
            json: false,
        };
        let guard = init(&config).unwrap();
        tracing::info!("hello");
        let path = guard.log_file().cloned().unwrap();
        drop(guard);

        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("ingest_") && name.ends_with(".log"));
        assert!(path.exists());
    }
}
