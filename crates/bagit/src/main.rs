use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::cli::complete::{MakeCompleteArgs, UpdateArgs, UpdateTagManifestsArgs};
use crate::cli::create::CreateArgs;
use crate::cli::fetch::{FillHoleyArgs, RetrieveArgs};
use crate::cli::holey::MakeHoleyArgs;
use crate::cli::verify::{Check, VerifyArgs};
use crate::config::Config;

mod cli;
mod config;
mod logging;

#[derive(Debug, Parser)]
#[command(name = "bagit", version = env!("CARGO_PKG_VERSION"), about, long_about = None, propagate_version = true)]
pub struct App {
    /// Configuration file. Defaults to ./bagit.toml when present.
    #[arg(long, global = true, value_name = "PATH")]
    pub config:  Option<PathBuf>,
    /// Log progress.
    #[arg(short, long, global = true)]
    pub verbose: bool,
    /// Worker threads for hashing and transfers.
    #[arg(long, global = true, value_name = "N")]
    pub threads: Option<usize>,
    #[command(subcommand)]
    pub cmd:     Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    #[command(name = "create", about = "Create a bag from files and directories")]
    Create(CreateArgs),
    #[command(name = "makecomplete", alias = "make-complete", about = "Write a completed copy of a bag")]
    MakeComplete(MakeCompleteArgs),
    #[command(name = "update", about = "Bring manifests and bag-info up to date with the payload")]
    Update(UpdateArgs),
    #[command(name = "updatetagmanifests", alias = "update-tag-manifests", about = "Regenerate the tag manifests")]
    UpdateTagManifests(UpdateTagManifestsArgs),
    #[command(name = "makeholey", alias = "make-holey", about = "Write a holey copy of a bag")]
    MakeHoley(MakeHoleyArgs),
    #[command(name = "fillholey", alias = "fill-holey", about = "Fetch the files a holey bag lists")]
    FillHoley(FillHoleyArgs),
    #[command(name = "retrieve", about = "Retrieve a bag published below a URL")]
    Retrieve(RetrieveArgs),
    #[command(name = "verifyvalid", alias = "verify-valid", about = "Check that a bag is complete and its checksums match")]
    VerifyValid(VerifyArgs),
    #[command(name = "verifycomplete", alias = "verify-complete", about = "Check that a bag is complete")]
    VerifyComplete(VerifyArgs),
    #[command(
        name = "verifypayloadmanifests",
        alias = "verify-payload-manifests",
        about = "Check the payload manifest checksums"
    )]
    VerifyPayloadManifests(VerifyArgs),
    #[command(name = "verifytagmanifests", alias = "verify-tag-manifests", about = "Check the tag manifest checksums")]
    VerifyTagManifests(VerifyArgs),
}

impl Commands {
    /// `Ok(false)` when the command ran but the bag failed a check or a
    /// transfer did not finish.
    pub fn run(self, config: &Config) -> Result<bool> {
        match self {
            Commands::Create(args) => args.run(config),
            Commands::MakeComplete(args) => args.run(config),
            Commands::Update(args) => args.run(config),
            Commands::UpdateTagManifests(args) => args.run(config),
            Commands::MakeHoley(args) => args.run(config),
            Commands::FillHoley(args) => args.run(config),
            Commands::Retrieve(args) => args.run(config),
            Commands::VerifyValid(args) => args.run(Check::Valid, config),
            Commands::VerifyComplete(args) => args.run(Check::Complete, config),
            Commands::VerifyPayloadManifests(args) => args.run(Check::PayloadManifests, config),
            Commands::VerifyTagManifests(args) => args.run(Check::TagManifests, config),
        }
    }
}

fn run(app: App) -> Result<bool> {
    let mut config = Config::load(app.config.as_deref())?;
    if app.threads.is_some() {
        config.threads = app.threads;
    }
    app.cmd.run(&config)
}

fn main() -> ExitCode {
    let app = App::parse();
    logging::init(app.verbose);
    match run(app) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            tracing::debug!(error = ?e, "command failed");
            eprintln!("error: {e:#}");
            ExitCode::from(2)
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_command_is_well_formed() { App::command().debug_assert(); }

    #[test]
    fn test_global_flags_after_subcommand() {
        let app = App::try_parse_from(["bagit", "verifyvalid", "bag", "--threads", "3", "-v"]).unwrap();
        assert_eq!(app.threads, Some(3));
        assert!(app.verbose);
        assert!(matches!(app.cmd, Commands::VerifyValid(_)));
    }

    #[test]
    fn test_hyphenated_aliases() {
        let app = App::try_parse_from(["bagit", "fill-holey", "bag"]).unwrap();
        assert!(matches!(app.cmd, Commands::FillHoley(_)));
        let app = App::try_parse_from(["bagit", "make-holey", "bag", "out", "http://example.org/b"]).unwrap();
        assert!(matches!(app.cmd, Commands::MakeHoley(_)));
    }

    #[test]
    fn test_unknown_algorithm_is_rejected() {
        let parsed =
            App::try_parse_from(["bagit", "create", "out", "file.txt", "--payload-manifest-algorithm", "crc32"]);
        assert!(parsed.is_err());
    }
}
