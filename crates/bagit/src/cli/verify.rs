use std::path::PathBuf;

use anyhow::Result;
use bagit_core::{LoadMode, ManifestKind, Version};
use bagit_pipeline::{CompleteVerifier, FailMode, ManifestVerifier, ValidVerifier, Verifier};
use clap::Args;

use crate::config::Config;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Check {
    Valid,
    Complete,
    PayloadManifests,
    TagManifests,
}

#[derive(Clone, Debug, Args)]
pub struct VerifyArgs {
    /// Bag directory to check.
    pub source:                        PathBuf,
    /// fail_fast, fail_step, fail_stage or fail_slow.
    #[arg(long, value_name = "MODE")]
    pub fail_mode:                     Option<FailMode>,
    /// Do not require bagit.txt.
    #[arg(long)]
    pub missing_bagit_tolerant:        bool,
    /// Allow directories next to data/.
    #[arg(long)]
    pub additional_directory_tolerant: bool,
    /// Treat the bag as this BagIt version regardless of bagit.txt.
    #[arg(id = "bag_version", long = "bag-version", value_name = "VERSION")]
    pub version:                       Option<Version>,
}

impl VerifyArgs {
    fn verifier(&self, check: Check, threads: usize) -> Box<dyn Verifier> {
        let complete = CompleteVerifier::new()
            .missing_declaration_tolerant(self.missing_bagit_tolerant)
            .additional_directories_tolerant(self.additional_directory_tolerant);
        match check {
            Check::Valid => Box::new(ValidVerifier::new().complete(complete).threads(threads)),
            Check::Complete => Box::new(complete),
            Check::PayloadManifests => Box::new(ManifestVerifier::new().threads(threads).only(ManifestKind::Payload)),
            Check::TagManifests => Box::new(ManifestVerifier::new().threads(threads).only(ManifestKind::Tag)),
        }
    }

    pub fn run(self, check: Check, config: &Config) -> Result<bool> {
        let bag = super::load(&self.source, LoadMode::Files, self.version)?;
        let mode = self.fail_mode.unwrap_or(config.fail_mode);
        tracing::info!(source = %self.source.display(), ?check, %mode, "verifying bag");
        let result = self.verifier(check, super::threads(config)).verify(&bag, mode);
        Ok(super::report(&result))
    }
}
