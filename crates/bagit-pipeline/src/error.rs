use std::io;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("failed to read {path}")]
    Io {
        path:   String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Core(#[from] bagit_core::CoreError),

    #[error("invalid base URL {url:?}: {reason}")]
    BaseUrl { url: String, reason: String },
}

impl PipelineError {
    pub(crate) fn io(path: impl Into<String>) -> impl FnOnce(io::Error) -> PipelineError {
        let path = path.into();
        move |source| PipelineError::Io { path, source }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
