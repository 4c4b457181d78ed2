//! Structural errors. These are fatal to the operation that hit them and are
//! never retried.

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("{path}:{line}: malformed manifest line {text:?}")]
    MalformedManifest {
        path: String,
        line: usize,
        text: String,
    },

    #[error("{path}:{line}: malformed fetch line {text:?}")]
    MalformedFetch {
        path: String,
        line: usize,
        text: String,
    },

    #[error("{path}:{line}: malformed metadata line {text:?}")]
    MalformedInfo {
        path: String,
        line: usize,
        text: String,
    },

    #[error("{path}: malformed bag declaration: {reason}")]
    MalformedDeclaration { path: String, reason: String },

    #[error("{path}: tag file starts with a byte-order mark")]
    ByteOrderMark { path: String },

    #[error("{path}:{line}: backslash in file path {file:?}")]
    Backslash {
        path: String,
        line: usize,
        file: String,
    },

    #[error("{0}: not a manifest filename")]
    NotAManifest(String),

    #[error("{0}: not valid UTF-8")]
    Encoding(String),

    #[error("invalid bag version {0:?}")]
    InvalidVersion(String),

    #[error("failed to read {path}")]
    Io {
        path:   String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Fs(#[from] bagit_fs::Error),
}

impl CoreError {
    pub(crate) fn io(path: impl Into<String>) -> impl FnOnce(io::Error) -> CoreError {
        let path = path.into();
        move |source| CoreError::Io { path, source }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
