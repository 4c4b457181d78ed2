use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use bagit_core::{BAG_INFO, Bag, BagFile, PAYLOAD_PREFIX, relative_path};
use clap::Args;
use walkdir::WalkDir;

use super::complete::CompleteArgs;
use crate::config::Config;

#[derive(Clone, Debug, Args)]
pub struct CreateArgs {
    /// Directory to write the new bag to.
    pub dest:         PathBuf,
    /// Files and directories to add under data/. `dir/*` adds what is inside
    /// dir without dir itself.
    #[arg(required = true)]
    pub payload:      Vec<PathBuf>,
    /// An existing bag-info.txt to start from.
    #[arg(long, value_name = "FILE")]
    pub bag_info_txt: Option<PathBuf>,
    #[command(flatten)]
    pub complete:     CompleteArgs,
}

impl CreateArgs {
    pub fn run(self, config: &Config) -> Result<bool> {
        let mut bag = Bag::new(self.complete.version.unwrap_or_default());
        for path in &self.payload {
            add_payload(&mut bag, path)?;
        }
        if let Some(info) = &self.bag_info_txt {
            if info.file_name() != Some(OsStr::new(BAG_INFO)) {
                bail!("{} must be named {BAG_INFO}", info.display());
            }
            bag.put(BagFile::from_path(BAG_INFO, info))
                .with_context(|| format!("failed to read {}", info.display()))?;
        }
        tracing::info!(payload = bag.payload_len(), "creating bag");

        let completed = super::complete(&self.complete.completer(config), &bag)?;
        super::write(&completed, &self.dest)?;
        println!("Created bag at {}", self.dest.display());
        Ok(true)
    }
}

/// Add `path` below the payload directory. A trailing `/*` adds the children
/// of the directory instead of the directory.
fn add_payload(bag: &mut Bag, path: &Path) -> Result<()> {
    let (root, children) = match path.to_str().and_then(|p| p.strip_suffix("/*")) {
        Some(dir) => (PathBuf::from(dir), true),
        None => (path.to_path_buf(), false),
    };
    let canonical = fs::canonicalize(&root).with_context(|| format!("{} does not exist", root.display()))?;
    let name = canonical
        .file_name()
        .and_then(OsStr::to_str)
        .with_context(|| format!("{} has no usable file name", root.display()))?;

    if canonical.is_file() {
        if children {
            bail!("{} is not a directory", root.display());
        }
        bag.put(BagFile::from_path(format!("{PAYLOAD_PREFIX}{name}"), &canonical))?;
        return Ok(());
    }

    let prefix = if children {
        PAYLOAD_PREFIX.to_string()
    } else {
        format!("{PAYLOAD_PREFIX}{name}/")
    };
    for entry in WalkDir::new(&canonical).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        match relative_path(&canonical, entry.path()) {
            Some(rel) => bag.put(BagFile::from_path(format!("{prefix}{rel}"), entry.path()))?,
            None => tracing::warn!(path = %entry.path().display(), "skipping file with non UTF-8 name"),
        }
    }
    Ok(())
}
