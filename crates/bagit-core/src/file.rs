use std::fmt;
use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bagit_fixity::Algorithm;

/// Backing storage of a [`BagFile`].
pub trait Source: Send + Sync + fmt::Debug {
    fn size(&self) -> u64;
    fn exists(&self) -> bool;
    fn open(&self) -> io::Result<Box<dyn Read + Send>>;

    /// Location on the local file system, when there is one.
    fn local_path(&self) -> Option<&Path> { None }
}

/// A file on disk, read lazily.
#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self { Self { path: path.into() } }
}

impl Source for FileSource {
    fn size(&self) -> u64 { self.path.metadata().map(|m| m.len()).unwrap_or(0) }

    fn exists(&self) -> bool { self.path.is_file() }

    fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(io::BufReader::new(File::open(&self.path)?)))
    }

    fn local_path(&self) -> Option<&Path> { Some(&self.path) }
}

#[derive(Debug)]
pub struct MemorySource {
    bytes: Arc<[u8]>,
}

impl Source for MemorySource {
    fn size(&self) -> u64 { self.bytes.len() as u64 }

    fn exists(&self) -> bool { true }

    fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(Cursor::new(SharedBytes(self.bytes.clone()))))
    }
}

struct SharedBytes(Arc<[u8]>);

impl AsRef<[u8]> for SharedBytes {
    fn as_ref(&self) -> &[u8] { &self.0 }
}

/// Placeholder for a file known only by name, e.g. from a fetch manifest.
#[derive(Debug)]
pub struct MissingSource;

impl Source for MissingSource {
    fn size(&self) -> u64 { 0 }

    fn exists(&self) -> bool { false }

    fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        Err(io::Error::new(io::ErrorKind::NotFound, "file is not present in the bag"))
    }
}

/// A named, lazily readable byte stream inside a bag.
///
/// Identity is the bag-relative path. Cloning shares the source; replacing the
/// backing store means constructing a new `BagFile`.
#[derive(Clone)]
pub struct BagFile {
    path:   String,
    source: Arc<dyn Source>,
}

impl BagFile {
    pub fn new(path: impl Into<String>, source: Arc<dyn Source>) -> Self {
        Self {
            path: path.into(),
            source,
        }
    }

    pub fn from_path(path: impl Into<String>, local: impl Into<PathBuf>) -> Self {
        Self::new(path, Arc::new(FileSource::new(local)))
    }

    pub fn from_bytes(path: impl Into<String>, bytes: impl AsRef<[u8]>) -> Self {
        Self::from_shared(path, Arc::from(bytes.as_ref()))
    }

    pub fn from_shared(path: impl Into<String>, bytes: Arc<[u8]>) -> Self {
        Self::new(path, Arc::new(MemorySource { bytes }))
    }

    pub fn missing(path: impl Into<String>) -> Self { Self::new(path, Arc::new(MissingSource)) }

    pub fn path(&self) -> &str { &self.path }

    pub fn size(&self) -> u64 { self.source.size() }

    pub fn exists(&self) -> bool { self.source.exists() }

    pub fn open(&self) -> io::Result<Box<dyn Read + Send>> { self.source.open() }

    pub fn local_path(&self) -> Option<&Path> { self.source.local_path() }

    pub fn read_all(&self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.size() as usize);
        self.open()?.read_to_end(&mut buf)?;
        Ok(buf)
    }

    pub fn digest(&self, algorithm: Algorithm) -> io::Result<String> {
        bagit_fixity::digest(self.open()?, algorithm)
    }

    pub fn matches(&self, algorithm: Algorithm, expected: &str) -> io::Result<bool> {
        bagit_fixity::matches(self.open()?, algorithm, expected)
    }
}

impl PartialEq for BagFile {
    fn eq(&self, other: &Self) -> bool { self.path == other.path }
}

impl Eq for BagFile {}

impl fmt::Debug for BagFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BagFile")
            .field("path", &self.path)
            .field("source", &self.source)
            .finish()
    }
}
