//! Tracing setup for the relay CLI.
//!
//! # Separation of Concerns
//!
//! - **Tracing (this module)**: diagnostics via `RUST_LOG` on stderr, plus a
//!   per-run log file under `logs/` for `relay run`.
//!
//! - **Status protocol (`io/status`)**: product output on stdout consumed by
//!   the dashboard. Always written, unaffected by `RUST_LOG`.
//!
//! - **Handoff records (`io/handoff_log`)**: product artifacts in
//!   `.relay/handoffs/`.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Path of the run log for this process inside `log_dir`.
pub fn run_log_path(log_dir: &Path) -> PathBuf {
    let stamp = Utc::now().format("%Y%m%d_%H%M%S");
    log_dir.join(format!("run_{stamp}_{}.log", std::process::id()))
}

/// Initialize the tracing subscriber.
///
/// stderr reads `RUST_LOG` and defaults to `warn`. When `log_dir` is set, a
/// plain-text file layer is added that records `relay=info` by default, and
/// its path is returned.
///
/// # Example
/// ```bash
/// RUST_LOG=relay=debug relay run
/// ```
pub fn init(log_dir: Option<&Path>) -> Result<Option<PathBuf>> {
    let stderr_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .compact()
        .with_filter(stderr_filter);

    let (file_layer, log_path) = match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir)
                .with_context(|| format!("create log dir {}", dir.display()))?;
            let path = run_log_path(dir);
            let file = File::create(&path)
                .with_context(|| format!("create log file {}", path.display()))?;
            let file_filter = EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,relay=info"));
            let layer = fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(true)
                .with_filter(file_filter);
            (Some(layer), Some(path))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("install tracing subscriber")?;
    Ok(log_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_log_path_has_timestamp_and_pid() {
        let path = run_log_path(Path::new("logs"));
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .expect("file name");
        assert!(name.starts_with("run_"));
        assert!(name.ends_with(&format!("_{}.log", std::process::id())));
        // run_YYYYmmdd_HHMMSS_<pid>.log
        let stamp = &name["run_".len().."run_".len() + 15];
        assert_eq!(stamp.len(), 15);
        assert_eq!(&stamp[8..9], "_");
        assert!(path.starts_with("logs"));
    }
}
