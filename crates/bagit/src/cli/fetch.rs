use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use anyhow::{Context, Result};
use bagit_core::LoadMode;
use bagit_fetch::{BagFetcher, ShutdownHandle, TransportRegistry};
use clap::Args;

use crate::config::{Config, FetchConfig, OnFailure};
use crate::logging;

/// Flags shared by the commands that transfer files.
#[derive(Clone, Debug, Default, Args)]
pub struct FetchArgs {
    /// What to do after a failed transfer.
    #[arg(long, value_enum, value_name = "STRATEGY")]
    pub on_failure:        Option<OnFailure>,
    /// Stop after this many failures in total (threshold strategy).
    #[arg(long, value_name = "N")]
    pub max_failures:      Option<u32>,
    /// Give up on a file after this many failures (threshold strategy).
    #[arg(long, value_name = "N")]
    pub max_file_failures: Option<u32>,
}

impl FetchArgs {
    fn settings(&self, config: &Config) -> FetchConfig {
        let mut fetch = config.fetch.clone();
        if let Some(on_failure) = self.on_failure {
            fetch.on_failure = on_failure;
        }
        if let Some(max) = self.max_failures {
            fetch.max_failures = max;
        }
        if let Some(max) = self.max_file_failures {
            fetch.max_file_failures = max;
        }
        fetch
    }

    pub fn fetcher(&self, config: &Config) -> BagFetcher {
        let fetch = self.settings(config);
        BagFetcher::new(TransportRegistry::with_defaults(&fetch.transport_settings()))
            .threads(super::threads(config))
            .shared_fail_strategy(Arc::from(fetch.strategy()))
            .grace(fetch.grace())
            .on_progress(logging::log_progress)
    }
}

/// Cancel transfers on the first Ctrl-C, exit on the second.
fn cancel_on_interrupt(handle: ShutdownHandle) -> Result<()> {
    let presses = AtomicUsize::new(0);
    ctrlc::set_handler(move || {
        if presses.fetch_add(1, Ordering::SeqCst) == 0 {
            tracing::warn!("interrupted, stopping transfers (press Ctrl-C again to exit now)");
            let handle = handle.clone();
            thread::spawn(move || {
                if !handle.shutdown() {
                    tracing::warn!(workers = handle.active_workers(), "transfers still running after the grace period");
                }
            });
        } else {
            tracing::warn!("exiting");
            process::exit(130);
        }
    })
    .context("failed to install the Ctrl-C handler")
}

#[derive(Clone, Debug, Args)]
pub struct FillHoleyArgs {
    /// Holey bag to fill in place.
    pub source: PathBuf,
    /// Skip files the progress ledger records as fetched.
    #[arg(long)]
    pub resume: bool,
    /// Check payload already on disk and fetch only what is missing or corrupt.
    #[arg(long)]
    pub verify: bool,
    #[command(flatten)]
    pub fetch:  FetchArgs,
}

impl FillHoleyArgs {
    pub fn run(self, config: &Config) -> Result<bool> {
        let bag = super::load(&self.source, LoadMode::Files, None)?;
        let fetcher = self.fetch.fetcher(config).resume(self.resume).verify(self.verify);
        cancel_on_interrupt(fetcher.shutdown_handle())?;
        let result = fetcher
            .fetch_into(&bag, &self.source)
            .with_context(|| format!("failed to fill {}", self.source.display()))?;
        Ok(super::report(&result))
    }
}

#[derive(Clone, Debug, Args)]
pub struct RetrieveArgs {
    /// Directory to retrieve the bag into.
    pub dest:   PathBuf,
    /// URL of the directory holding the remote bag.
    pub url:    String,
    /// Continue an earlier retrieval into the same directory.
    #[arg(long)]
    pub resume: bool,
    #[command(flatten)]
    pub fetch:  FetchArgs,
}

impl RetrieveArgs {
    pub fn run(self, config: &Config) -> Result<bool> {
        let fetcher = self.fetch.fetcher(config).resume(self.resume);
        cancel_on_interrupt(fetcher.shutdown_handle())?;
        let result = fetcher
            .fetch_remote_bag(&self.dest, &self.url)
            .with_context(|| format!("failed to retrieve {}", self.url))?;
        Ok(super::report(&result))
    }
}
