//! What to do after a target fails to transfer.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use crate::error::FetchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    /// Try the same target again.
    RetryCurrent,
    /// Give up on this target and move on.
    ContinueWithNext,
    /// Cancel the whole transfer.
    Stop,
}

impl fmt::Display for FailureAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureAction::RetryCurrent => "retry",
            FailureAction::ContinueWithNext => "continue",
            FailureAction::Stop => "stop",
        })
    }
}

/// Decides how the fetcher reacts to one failed attempt. Shared by every
/// worker.
pub trait FailStrategy: Send + Sync {
    fn register_failure(&self, path: &str, cause: &FetchError) -> FailureAction;
}

/// Stops at the first failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailFast;

impl FailStrategy for FailFast {
    fn register_failure(&self, _: &str, _: &FetchError) -> FailureAction { FailureAction::Stop }
}

/// Never retries, never stops.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysContinue;

impl FailStrategy for AlwaysContinue {
    fn register_failure(&self, _: &str, _: &FetchError) -> FailureAction { FailureAction::ContinueWithNext }
}

/// Retries a target until it succeeds or the transfer is cancelled.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysRetry;

impl FailStrategy for AlwaysRetry {
    fn register_failure(&self, _: &str, _: &FetchError) -> FailureAction { FailureAction::RetryCurrent }
}

/// Retries a target up to `file_threshold` failures, and stops everything once
/// `total_threshold` failures have been seen across all targets. A threshold
/// of 0 is reached by the first failure.
#[derive(Debug)]
pub struct Threshold {
    file_threshold:  u32,
    total_threshold: u32,
    counts:          Mutex<Counts>,
}

#[derive(Debug, Default)]
struct Counts {
    total:    u32,
    per_file: HashMap<String, u32>,
}

impl Threshold {
    pub const DEFAULT_FILE_THRESHOLD: u32 = 3;
    pub const DEFAULT_TOTAL_THRESHOLD: u32 = 200;

    pub fn new(file_threshold: u32, total_threshold: u32) -> Self {
        Self {
            file_threshold,
            total_threshold,
            counts: Mutex::default(),
        }
    }

    pub fn file_threshold(&self) -> u32 { self.file_threshold }

    pub fn total_threshold(&self) -> u32 { self.total_threshold }
}

impl Default for Threshold {
    fn default() -> Self { Self::new(Self::DEFAULT_FILE_THRESHOLD, Self::DEFAULT_TOTAL_THRESHOLD) }
}

impl FailStrategy for Threshold {
    fn register_failure(&self, path: &str, cause: &FetchError) -> FailureAction {
        // Poisoning leaves the counters usable.
        let mut counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        counts.total = counts.total.saturating_add(1);
        let action = if counts.total >= self.total_threshold {
            FailureAction::Stop
        } else {
            let failures = counts.per_file.entry(path.to_string()).or_default();
            *failures = failures.saturating_add(1);
            if *failures >= self.file_threshold {
                FailureAction::ContinueWithNext
            } else {
                FailureAction::RetryCurrent
            }
        };
        tracing::debug!(path, total = counts.total, %action, error = %cause, "registered fetch failure");
        action
    }
}
