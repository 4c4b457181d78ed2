use std::sync::Arc;

use bagit_pipeline::{Progress, ProgressFn};
use tracing_subscriber::EnvFilter;

/// Log to stderr. The filter comes from `BAGIT_LOG`, then `RUST_LOG`, then
/// `warn` (`info` with `--verbose`).
pub fn init(verbose: bool) {
    let fallback = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_env("BAGIT_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Forwards progress events to the log.
pub fn progress_sink() -> ProgressFn { Arc::new(log_progress) }

/// Logs one progress event at `info`.
pub fn log_progress(progress: &Progress) {
    tracing::info!(
        activity = %progress.activity,
        count = progress.count,
        total = ?progress.total,
        "{}",
        progress.item
    );
}
