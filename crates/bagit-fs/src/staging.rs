use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result, write_err};
use crate::primitives::{ensure_parent, sibling_tmp};

/// A file written beside its destination and renamed into place on
/// [`commit`](StagedFile::commit).
///
/// Dropping an uncommitted `StagedFile` removes the partial file, so an
/// aborted transfer never leaves a truncated file under the final name.
pub struct StagedFile {
    staging:     PathBuf,
    destination: PathBuf,
    file:        Option<File>,
    committed:   bool,
}

impl StagedFile {
    pub fn new(destination: impl Into<PathBuf>) -> Result<Self> {
        let destination = destination.into();
        ensure_parent(&destination)?;
        let staging = sibling_tmp(&destination, "part");
        let file = File::create(&staging).map_err(write_err(&staging))?;
        Ok(Self {
            staging,
            destination,
            file: Some(file),
            committed: false,
        })
    }

    pub fn staging_path(&self) -> &Path { &self.staging }

    pub fn destination(&self) -> &Path { &self.destination }

    /// Flush, then rename over the destination.
    pub fn commit(mut self) -> Result<PathBuf> {
        if let Some(file) = self.file.take() {
            file.sync_all().map_err(write_err(&self.staging))?;
        }
        fs::rename(&self.staging, &self.destination).map_err(|source| Error::Rename {
            from: self.staging.clone(),
            to: self.destination.clone(),
            source,
        })?;
        self.committed = true;
        tracing::trace!(path = %self.destination.display(), "staged file committed");
        Ok(self.destination.clone())
    }

    /// Discard the staged bytes. Equivalent to dropping.
    pub fn abandon(self) {}
}

impl Write for StagedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.file.as_mut() {
            Some(file) => file.write(buf),
            None => Err(io::Error::other("staged file already closed")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.committed {
            self.file.take();
            let _ = fs::remove_file(&self.staging);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_commit_moves_into_place() -> Result<()> {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("data/file.txt");
        let mut staged = StagedFile::new(&dest)?;
        staged.write_all(b"payload").unwrap();
        assert!(!dest.exists());
        assert!(staged.staging_path().exists());

        let committed = staged.commit()?;
        assert_eq!(committed, dest);
        assert_eq!(fs::read(&dest).unwrap(), b"payload");
        Ok(())
    }

    #[test]
    fn test_cleanup_on_drop() -> Result<()> {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("file.txt");
        let mut staged = StagedFile::new(&dest)?;
        staged.write_all(b"partial").unwrap();
        let staging = staged.staging_path().to_path_buf();
        staged.abandon();
        assert!(!staging.exists());
        assert!(!dest.exists());
        Ok(())
    }

    #[test]
    fn test_commit_replaces_existing() -> Result<()> {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("file.txt");
        fs::write(&dest, "old").unwrap();
        let mut staged = StagedFile::new(&dest)?;
        staged.write_all(b"new").unwrap();
        staged.commit()?;
        assert_eq!(fs::read_to_string(&dest).unwrap(), "new");
        Ok(())
    }
}
