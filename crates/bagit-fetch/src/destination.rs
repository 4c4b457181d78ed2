//! Where fetched bytes go.

use std::io::Write;
use std::path::PathBuf;

use bagit_core::BagFile;
use bagit_fs::{StagedFile, remove_file_if_exists};

use crate::error::Result;

/// A file being received. Nothing is visible under its final name until
/// [`commit`](Destination::commit).
pub trait Destination: Send {
    fn sink(&mut self) -> &mut dyn Write;

    fn commit(self: Box<Self>) -> Result<BagFile>;

    fn abandon(self: Box<Self>);
}

pub trait DestinationFactory: Send + Sync {
    fn create(&self, path: &str, size: Option<u64>) -> Result<Box<dyn Destination>>;

    /// Remove a committed file that turned out to be corrupt.
    fn discard(&self, _path: &str) -> Result<()> { Ok(()) }
}

/// Stages each file beside its final location inside the bag directory.
#[derive(Debug, Clone)]
pub struct FileSystemDestinations {
    root: PathBuf,
}

impl FileSystemDestinations {
    pub fn new(root: impl Into<PathBuf>) -> Self { Self { root: root.into() } }
}

struct StagedDestination {
    path:   String,
    staged: StagedFile,
}

impl Destination for StagedDestination {
    fn sink(&mut self) -> &mut dyn Write { &mut self.staged }

    fn commit(self: Box<Self>) -> Result<BagFile> {
        let Self { path, staged } = *self;
        let local = staged.commit()?;
        Ok(BagFile::from_path(path, local))
    }

    fn abandon(self: Box<Self>) { self.staged.abandon(); }
}

impl DestinationFactory for FileSystemDestinations {
    fn create(&self, path: &str, _size: Option<u64>) -> Result<Box<dyn Destination>> {
        let staged = StagedFile::new(self.root.join(path))?;
        Ok(Box::new(StagedDestination {
            path: path.to_string(),
            staged,
        }))
    }

    fn discard(&self, path: &str) -> Result<()> {
        remove_file_if_exists(self.root.join(path))?;
        Ok(())
    }
}

/// Keeps fetched files in memory.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryDestinations;

struct Buffer {
    path:  String,
    bytes: Vec<u8>,
}

impl Destination for Buffer {
    fn sink(&mut self) -> &mut dyn Write { &mut self.bytes }

    fn commit(self: Box<Self>) -> Result<BagFile> {
        let Self { path, bytes } = *self;
        Ok(BagFile::from_bytes(path, bytes))
    }

    fn abandon(self: Box<Self>) {}
}

impl DestinationFactory for MemoryDestinations {
    fn create(&self, path: &str, size: Option<u64>) -> Result<Box<dyn Destination>> {
        let capacity = size.and_then(|s| usize::try_from(s).ok()).unwrap_or(0).min(1 << 20);
        Ok(Box::new(Buffer {
            path:  path.to_string(),
            bytes: Vec::with_capacity(capacity),
        }))
    }
}
