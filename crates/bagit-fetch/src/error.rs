use std::io;

use bagit_pipeline::VerifyResult;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("bag cannot be fetched:\n{0}")]
    InvalidBag(VerifyResult),

    #[error("no transport registered for scheme {scheme:?} (url {url})")]
    UnknownScheme { scheme: String, url: String },

    #[error("invalid URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("transfer of {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("{url} answered HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("{path} does not match its manifest checksum")]
    Fixity {
        path:   String,
        #[source]
        source: bagit_fixity::VerificationError,
    },

    #[error("transfer cancelled")]
    Cancelled,

    #[error("I/O error on {path}")]
    Io {
        path:   String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Core(#[from] bagit_core::CoreError),

    #[error(transparent)]
    Pipeline(#[from] bagit_pipeline::PipelineError),

    #[error(transparent)]
    Fs(#[from] bagit_fs::Error),
}

impl FetchError {
    pub(crate) fn io(path: impl Into<String>) -> impl FnOnce(io::Error) -> FetchError {
        let path = path.into();
        move |source| FetchError::Io { path, source }
    }

    pub(crate) fn transport(url: impl Into<String>, message: impl ToString) -> FetchError {
        FetchError::Transport {
            url:     url.into(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FetchError>;
