use std::path::PathBuf;

use anyhow::Result;
use bagit_core::{Algorithm, LoadMode, Version};
use bagit_pipeline::{DefaultCompleter, TagManifestCompleter, UpdateCompleter};
use clap::Args;

use crate::config::Config;
use crate::logging;

/// Flags shared by the commands that complete a bag.
#[derive(Clone, Debug, Default, Args)]
pub struct CompleteArgs {
    /// Do not write bag-info.txt.
    #[arg(long)]
    pub exclude_bag_info:           bool,
    /// Leave Bagging-Date as it is.
    #[arg(long)]
    pub no_update_bagging_date:     bool,
    /// Leave Bag-Size as it is.
    #[arg(long)]
    pub no_update_bag_size:         bool,
    /// Leave Payload-Oxum as it is.
    #[arg(long)]
    pub no_update_payload_oxum:     bool,
    /// Do not write a tag manifest.
    #[arg(long)]
    pub exclude_tag_manifest:       bool,
    #[arg(long, value_name = "ALGORITHM")]
    pub tag_manifest_algorithm:     Option<Algorithm>,
    #[arg(long, value_name = "ALGORITHM")]
    pub payload_manifest_algorithm: Option<Algorithm>,
    /// BagIt version of the written bag.
    #[arg(id = "bag_version", long = "bag-version", value_name = "VERSION")]
    pub version:                    Option<Version>,
    /// Separator between checksum and path in manifests.
    #[arg(long, value_name = "SEPARATOR")]
    pub manifest_separator:         Option<String>,
}

impl CompleteArgs {
    pub fn completer(&self, config: &Config) -> DefaultCompleter {
        DefaultCompleter::new()
            .generate_bag_info(!self.exclude_bag_info)
            .update_bagging_date(!self.no_update_bagging_date)
            .update_bag_size(!self.no_update_bag_size)
            .update_payload_oxum(!self.no_update_payload_oxum)
            .generate_tag_manifest(!self.exclude_tag_manifest)
            .payload_algorithm(self.payload_manifest_algorithm.unwrap_or(config.payload_algorithm))
            .tag_algorithm(self.tag_manifest_algorithm.unwrap_or(config.tag_algorithm))
            .separator(separator(&self.manifest_separator, config))
            .threads(super::threads(config))
            .on_progress(logging::progress_sink())
    }
}

fn separator(flag: &Option<String>, config: &Config) -> String {
    flag.clone().unwrap_or_else(|| config.manifest_separator.clone())
}

#[derive(Clone, Debug, Args)]
pub struct MakeCompleteArgs {
    /// Bag to complete.
    pub source:   PathBuf,
    /// Directory to write the completed bag to.
    pub dest:     PathBuf,
    #[command(flatten)]
    pub complete: CompleteArgs,
}

impl MakeCompleteArgs {
    pub fn run(self, config: &Config) -> Result<bool> {
        let mut bag = super::load(&self.source, LoadMode::Files, None)?;
        if let Some(version) = self.complete.version {
            bag.set_version(version);
        }
        let completed = super::complete(&self.complete.completer(config), &bag)?;
        super::write(&completed, &self.dest)?;
        println!("Wrote complete bag to {}", self.dest.display());
        Ok(true)
    }
}

#[derive(Clone, Debug, Args)]
pub struct UpdateArgs {
    /// Bag to update.
    pub source:             PathBuf,
    /// Write the updated bag here instead of in place.
    #[arg(long, value_name = "DIR")]
    pub dest:               Option<PathBuf>,
    #[arg(long, value_name = "SEPARATOR")]
    pub manifest_separator: Option<String>,
}

impl UpdateArgs {
    pub fn run(self, config: &Config) -> Result<bool> {
        let bag = super::load(&self.source, LoadMode::Files, None)?;
        let completer = UpdateCompleter::new()
            .payload_algorithm(config.payload_algorithm)
            .separator(separator(&self.manifest_separator, config))
            .threads(super::threads(config))
            .on_progress(logging::progress_sink());
        let updated = super::complete(&completer, &bag)?;
        let dest = self.dest.as_ref().unwrap_or(&self.source);
        super::write(&updated, dest)?;
        println!("Updated bag at {}", dest.display());
        Ok(true)
    }
}

#[derive(Clone, Debug, Args)]
pub struct UpdateTagManifestsArgs {
    /// Bag whose tag manifests are regenerated in place.
    pub source:                 PathBuf,
    #[arg(long, value_name = "ALGORITHM")]
    pub tag_manifest_algorithm: Option<Algorithm>,
    #[arg(long, value_name = "SEPARATOR")]
    pub manifest_separator:     Option<String>,
}

impl UpdateTagManifestsArgs {
    pub fn run(self, config: &Config) -> Result<bool> {
        let bag = super::load(&self.source, LoadMode::Files, None)?;
        let completer = TagManifestCompleter::new()
            .tag_algorithm(self.tag_manifest_algorithm.unwrap_or(config.tag_algorithm))
            .separator(separator(&self.manifest_separator, config))
            .threads(super::threads(config));
        let updated = super::complete(&completer, &bag)?;
        super::write(&updated, &self.source)?;
        println!("Updated tag manifests of {}", self.source.display());
        Ok(true)
    }
}
