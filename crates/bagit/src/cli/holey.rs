use std::path::PathBuf;

use anyhow::{Context, Result};
use bagit_core::LoadMode;
use bagit_pipeline::{FailMode, HolePuncher, TagMode, ValidVerifier, Verifier};
use clap::{Args, ValueEnum};

use crate::config::Config;

/// Plain tag file handling for `makeholey`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Tags {
    /// Keep them in the holey bag.
    #[default]
    Keep,
    /// List them in fetch.txt instead.
    Move,
    /// Keep them and also list them in fetch.txt.
    Copy,
}

impl From<Tags> for TagMode {
    fn from(tags: Tags) -> Self {
        match tags {
            Tags::Keep => TagMode::Keep,
            Tags::Move => TagMode::Move,
            Tags::Copy => TagMode::CopyAndAdvertise,
        }
    }
}

#[derive(Clone, Debug, Args)]
pub struct MakeHoleyArgs {
    /// Bag to make holey.
    pub source:              PathBuf,
    /// Directory to write the holey bag to.
    pub dest:                PathBuf,
    /// URL the payload will be fetched from.
    pub base_url:            String,
    /// Do not repeat `data/` in the fetch URLs.
    #[arg(long)]
    pub exclude_payload_dir: bool,
    /// Keep payload files that are present and valid, only punch the others.
    #[arg(long)]
    pub resume:              bool,
    #[arg(long, value_enum, default_value_t = Tags::Keep)]
    pub tags:                Tags,
}

impl MakeHoleyArgs {
    pub fn run(self, config: &Config) -> Result<bool> {
        let bag = super::load(&self.source, LoadMode::Manifests, None)?;
        let mut puncher = HolePuncher::new(&self.base_url)
            .with_context(|| format!("invalid base URL {}", self.base_url))?
            .include_payload_directory(!self.exclude_payload_dir)
            .tag_mode(self.tags.into());
        if self.resume {
            let verified = ValidVerifier::new()
                .threads(super::threads(config))
                .verify(&bag, FailMode::FailSlow);
            puncher = puncher.resume(verified);
        }
        let holey = puncher.make_holey(&bag)?;
        super::write(&holey, &self.dest)?;
        println!("Wrote holey bag to {}", self.dest.display());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::cli::complete::{CompleteArgs, MakeCompleteArgs};

    fn complete_bag(dir: &std::path::Path) {
        fs::create_dir_all(dir.join("data")).unwrap();
        fs::write(dir.join("data/a.txt"), "alpha").unwrap();
        fs::write(dir.join("data/b.txt"), "beta").unwrap();
        let args = MakeCompleteArgs {
            source:   dir.to_path_buf(),
            dest:     dir.to_path_buf(),
            complete: CompleteArgs::default(),
        };
        assert!(args.run(&Config::default()).unwrap());
    }

    #[test]
    fn test_make_holey_lists_payload() {
        let src = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        complete_bag(src.path());

        let args = MakeHoleyArgs {
            source:              src.path().to_path_buf(),
            dest:                dest.path().to_path_buf(),
            base_url:            "http://example.org/bags/b1".to_string(),
            exclude_payload_dir: false,
            resume:              false,
            tags:                Tags::Keep,
        };
        assert!(args.run(&Config::default()).unwrap());

        let fetch = fs::read_to_string(dest.path().join("fetch.txt")).unwrap();
        assert!(fetch.contains("http://example.org/bags/b1/data/a.txt  5  data/a.txt"));
        assert!(fetch.contains("http://example.org/bags/b1/data/b.txt  4  data/b.txt"));
        assert!(!dest.path().join("data/a.txt").exists());
        assert!(dest.path().join("manifest-md5.txt").is_file());
        assert!(dest.path().join("bag-info.txt").is_file());
    }

    #[test]
    fn test_resume_keeps_valid_payload() {
        let src = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        complete_bag(src.path());
        fs::write(src.path().join("data/b.txt"), "corrupt").unwrap();

        let args = MakeHoleyArgs {
            source:              src.path().to_path_buf(),
            dest:                dest.path().to_path_buf(),
            base_url:            "http://example.org/b1/".to_string(),
            exclude_payload_dir: true,
            resume:              true,
            tags:                Tags::Keep,
        };
        assert!(args.run(&Config::default()).unwrap());

        let fetch = fs::read_to_string(dest.path().join("fetch.txt")).unwrap();
        assert!(!fetch.contains("a.txt"));
        assert!(fetch.contains("http://example.org/b1/b.txt"));
        assert_eq!(fs::read_to_string(dest.path().join("data/a.txt")).unwrap(), "alpha");
        assert!(!dest.path().join("data/b.txt").exists());
    }
}
