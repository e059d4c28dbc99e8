use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Where log lines go. The visualizer owns the terminal, so it logs to a file.
#[derive(Debug, Clone)]
pub enum LogTarget {
    File(PathBuf),
    Stderr,
    /// No usable log location; events are dropped.
    Discard,
}

/// `$XDG_STATE_HOME/particle_mirror/particle_mirror.log`, falling back to
/// `~/.local/state`.
pub fn default_log_path() -> Option<PathBuf> {
    let state = std::env::var_os("XDG_STATE_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".local").join("state"))
        })?;
    Some(state.join("particle_mirror").join("particle_mirror.log"))
}

fn filter(level: &str) -> EnvFilter {
    // RUST_LOG wins over the CLI level.
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

fn open_log(path: &Path) -> Result<fs::File> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("create log directory {}", dir.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open log file {}", path.display()))
}

/// Installs the global subscriber. Call once, before anything logs.
pub fn init(level: &str, target: LogTarget) -> Result<()> {
    match target {
        LogTarget::Stderr => {
            let layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(filter(level));
            tracing_subscriber::registry()
                .with(layer)
                .try_init()
                .context("install tracing subscriber")?;
        }
        LogTarget::Discard => {
            let layer = fmt::layer()
                .with_writer(std::io::sink)
                .with_filter(filter(level));
            tracing_subscriber::registry()
                .with(layer)
                .try_init()
                .context("install tracing subscriber")?;
        }
        LogTarget::File(path) => {
            let file = open_log(&path)?;
            let layer = fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_filter(filter(level));
            tracing_subscriber::registry()
                .with(layer)
                .try_init()
                .context("install tracing subscriber")?;
            tracing::debug!(path = %path.display(), "logging to file");
        }
    }
    Ok(())
}
