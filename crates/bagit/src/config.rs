//! Settings shared by every command.
//!
//! Read from `bagit.toml` (or the file given with `--config`), then from
//! `BAGIT_*` environment variables. Nested keys use a double underscore:
//! `BAGIT_FETCH__MAX_FAILURES=10`. Command-line flags win over both.

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use bagit_core::{Algorithm, DEFAULT_SEPARATOR};
use bagit_fetch::{AlwaysContinue, AlwaysRetry, FailFast, FailStrategy, Threshold, TransportSettings};
use bagit_pipeline::FailMode;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::{Deserialize, Deserializer};

pub const DEFAULT_FILE: &str = "bagit.toml";
const ENV_PREFIX: &str = "BAGIT_";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Worker count. Available parallelism when unset.
    pub threads:            Option<usize>,
    #[serde(deserialize_with = "parsed")]
    pub fail_mode:          FailMode,
    #[serde(deserialize_with = "parsed")]
    pub payload_algorithm:  Algorithm,
    #[serde(deserialize_with = "parsed")]
    pub tag_algorithm:      Algorithm,
    pub manifest_separator: String,
    pub fetch:              FetchConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            threads:            None,
            fail_mode:          FailMode::FailFast,
            payload_algorithm:  Algorithm::Md5,
            tag_algorithm:      Algorithm::Md5,
            manifest_separator: DEFAULT_SEPARATOR.to_string(),
            fetch:              FetchConfig::default(),
        }
    }
}

/// What the fetcher does after a failed transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OnFailure {
    /// Stop at the first failure.
    None,
    /// Give up on the file and move on.
    Next,
    /// Retry the file until it succeeds.
    Retry,
    /// Retry up to the per-file limit, stop at the total limit.
    Threshold,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub on_failure:          OnFailure,
    pub max_failures:        u32,
    pub max_file_failures:   u32,
    pub shutdown_grace_secs: u64,
    pub http_timeout_secs:   u64,
    pub user_agent:          Option<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            on_failure:          OnFailure::Threshold,
            max_failures:        Threshold::DEFAULT_TOTAL_THRESHOLD,
            max_file_failures:   Threshold::DEFAULT_FILE_THRESHOLD,
            shutdown_grace_secs: 10,
            http_timeout_secs:   60,
            user_agent:          None,
        }
    }
}

impl FetchConfig {
    pub fn strategy(&self) -> Box<dyn FailStrategy> {
        match self.on_failure {
            OnFailure::None => Box::new(FailFast),
            OnFailure::Next => Box::new(AlwaysContinue),
            OnFailure::Retry => Box::new(AlwaysRetry),
            OnFailure::Threshold => Box::new(Threshold::new(self.max_file_failures, self.max_failures)),
        }
    }

    pub fn transport_settings(&self) -> TransportSettings {
        let mut settings = TransportSettings {
            timeout: Duration::from_secs(self.http_timeout_secs),
            ..TransportSettings::default()
        };
        if let Some(agent) = &self.user_agent {
            settings.user_agent = agent.clone();
        }
        settings
    }

    pub fn grace(&self) -> Duration { Duration::from_secs(self.shutdown_grace_secs) }
}

impl Config {
    /// Load from `path`, or from `bagit.toml` in the working directory when it
    /// exists. An explicit path that does not exist is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) if !path.is_file() => bail!("config file {} does not exist", path.display()),
            Some(path) => Some(path.to_path_buf()),
            None => Some(PathBuf::from(DEFAULT_FILE)).filter(|p| p.is_file()),
        };
        let mut figment = Figment::new();
        if let Some(file) = &file {
            tracing::debug!(path = %file.display(), "reading configuration");
            figment = figment.merge(Toml::file(file));
        }
        Self::extract(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
            .with_context(|| match &file {
                Some(file) => format!("invalid configuration in {}", file.display()),
                None => "invalid configuration".to_string(),
            })
    }

    pub fn extract(figment: Figment) -> Result<Self> { Ok(figment.extract()?) }
}

/// Deserialize a string through the target's `FromStr`.
fn parsed<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: Display,
{
    let raw = String::deserialize(deserializer)?;
    raw.parse().map_err(serde::de::Error::custom)
}
