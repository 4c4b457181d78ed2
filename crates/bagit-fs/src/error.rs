use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to write {}", path.display())]
    Write {
        path:   PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to create directory {}", path.display())]
    CreateDir {
        path:   PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to rename {} to {}", from.display(), to.display())]
    Rename {
        from:   PathBuf,
        to:     PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to remove {}", path.display())]
    Remove {
        path:   PathBuf,
        #[source]
        source: io::Error,
    },
}

impl Error {
    pub fn io(&self) -> &io::Error {
        match self {
            Error::Write { source, .. }
            | Error::CreateDir { source, .. }
            | Error::Rename { source, .. }
            | Error::Remove { source, .. } => source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

pub(crate) fn write_err(path: &Path) -> impl FnOnce(io::Error) -> Error + '_ {
    move |source| Error::Write {
        path: path.to_path_buf(),
        source,
    }
}
