pub mod complete;
pub mod create;
pub mod fetch;
pub mod holey;
pub mod verify;

use std::path::Path;

use anyhow::{Context, Result, bail};
use bagit_core::{Bag, LoadMode, Loader, Version, Writer};
use bagit_pipeline::{Completer, VerifyResult, default_threads};

use crate::config::Config;

pub fn threads(config: &Config) -> usize { config.threads.unwrap_or_else(default_threads).max(1) }

pub fn load(path: &Path, mode: LoadMode, version: Option<Version>) -> Result<Bag> {
    let mut loader = Loader::new(mode);
    if let Some(version) = version {
        loader = loader.version(version);
    }
    loader
        .load(path)
        .with_context(|| format!("failed to load bag from {}", path.display()))
}

pub fn write(bag: &Bag, dest: &Path) -> Result<Bag> {
    Writer::new()
        .write(bag, dest)
        .with_context(|| format!("failed to write bag to {}", dest.display()))
}

/// Run `completer`, treating a cancelled run as an error.
pub fn complete(completer: &dyn Completer, bag: &Bag) -> Result<Bag> {
    match completer.complete(bag)? {
        Some(bag) => Ok(bag),
        None => bail!("completion was cancelled"),
    }
}

/// Print a verification result to stdout and return whether it succeeded.
pub fn report(result: &VerifyResult) -> bool {
    println!("{result}");
    result.success
}
