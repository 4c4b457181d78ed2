use std::fs;
use std::io;
use std::path::Path;

use bagit_fs::{StagedFile, atomic_write, remove_file_if_exists};
use walkdir::WalkDir;

use crate::bag::Bag;
use crate::classify::{DATA_DIR, FileKind, classify};
use crate::error::{CoreError, Result};
use crate::file::BagFile;
use crate::load::relative_path;
use crate::tag::TagFile;

/// Writes a bag to a directory.
///
/// Typed tags are serialized; plain tags and payload are copied unless they
/// already live at the target path. Payload files that do not exist (holes)
/// are skipped.
///
/// Tags are written exactly as their byte view reads, which is what tag
/// manifests are computed over.
#[derive(Debug, Clone)]
pub struct Writer {
    prune_tags:    bool,
    prune_payload: bool,
}

impl Default for Writer {
    fn default() -> Self {
        Self {
            prune_tags:    true,
            prune_payload: false,
        }
    }
}

impl Writer {
    pub fn new() -> Self { Self::default() }

    /// Delete well-known tag files (manifests, fetch files, bag-info) on disk
    /// that the bag no longer has.
    #[must_use]
    pub fn prune_tags(mut self, prune: bool) -> Self {
        self.prune_tags = prune;
        self
    }

    /// Delete payload files on disk that the bag no longer has.
    #[must_use]
    pub fn prune_payload(mut self, prune: bool) -> Self {
        self.prune_payload = prune;
        self
    }

    /// Returns the bag re-rooted at `root`, with payload and plain tags backed
    /// by the written files.
    pub fn write(&self, bag: &Bag, root: impl AsRef<Path>) -> Result<Bag> {
        let root = root.as_ref();
        fs::create_dir_all(root).map_err(CoreError::io(root.display().to_string()))?;

        let mut written = bag.clone();
        written.set_root(Some(root.to_path_buf()));

        for tag in bag.tags() {
            self.write_tag_file(tag, root)?;
            if let TagFile::Plain(file) = tag {
                if file.exists() {
                    written.put_tag(TagFile::Plain(BagFile::from_path(file.path(), root.join(file.path()))));
                }
            }
        }

        for file in bag.payload() {
            if !file.exists() {
                continue;
            }
            let dest = root.join(file.path());
            copy_file(file, &dest)?;
            written.put(BagFile::from_path(file.path(), dest))?;
        }

        if self.prune_tags {
            prune_tags(bag, root)?;
        }
        if self.prune_payload {
            prune_payload(bag, root)?;
        }
        tracing::debug!(root = %root.display(), payload = bag.payload_len(), "wrote bag");
        Ok(written)
    }

    fn write_tag_file(&self, tag: &TagFile, root: &Path) -> Result<()> {
        let dest = root.join(tag.path());
        match tag {
            TagFile::Plain(file) if file.exists() => copy_file(file, &dest),
            TagFile::Plain(_) => Ok(()),
            TagFile::Manifest(m) => Ok(atomic_write(&dest, &m.to_bytes())?),
            TagFile::Declaration(d) => Ok(atomic_write(&dest, &d.to_bytes())?),
            TagFile::Metadata(i) => Ok(atomic_write(&dest, &i.to_bytes())?),
            TagFile::Fetch(f) => Ok(atomic_write(&dest, &f.to_bytes())?),
        }
    }
}

/// Write the single tag file at `path` from `bag` into `root`.
pub fn write_tag(bag: &Bag, root: impl AsRef<Path>, path: &str) -> Result<()> {
    match bag.tag(path) {
        Some(tag) => Writer::default().write_tag_file(tag, root.as_ref()),
        None => Err(CoreError::Io {
            path:   path.to_string(),
            source: io::Error::new(io::ErrorKind::NotFound, "tag file is not in the bag"),
        }),
    }
}

/// Delete the tag file at `path` under `root`. Returns whether it existed.
pub fn remove_tag(root: impl AsRef<Path>, path: &str) -> Result<bool> {
    Ok(remove_file_if_exists(root.as_ref().join(path))?)
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn copy_file(file: &BagFile, dest: &Path) -> Result<()> {
    if file.local_path().is_some_and(|src| same_file(src, dest)) {
        return Ok(());
    }
    let mut input = file.open().map_err(CoreError::io(file.path()))?;
    let mut staged = StagedFile::new(dest)?;
    io::copy(&mut input, &mut staged).map_err(CoreError::io(file.path()))?;
    staged.commit()?;
    Ok(())
}

fn prune_tags(bag: &Bag, root: &Path) -> Result<()> {
    for entry in fs::read_dir(root).map_err(CoreError::io(root.display().to_string()))? {
        let entry = entry.map_err(CoreError::io(root.display().to_string()))?;
        let Some(name) = relative_path(root, &entry.path()) else { continue };
        let known = !matches!(classify(&name), FileKind::Plain | FileKind::Payload | FileKind::Declaration);
        if known && entry.path().is_file() && bag.tag(&name).is_none() {
            tracing::debug!(path = %name, "removing stale tag file");
            remove_file_if_exists(entry.path())?;
        }
    }
    Ok(())
}

fn prune_payload(bag: &Bag, root: &Path) -> Result<()> {
    let data = root.join(DATA_DIR);
    if !data.is_dir() {
        return Ok(());
    }
    for entry in WalkDir::new(&data).min_depth(1) {
        let entry = entry.map_err(|e| CoreError::Io {
            path:   data.display().to_string(),
            source: e.into(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(rel) = relative_path(root, entry.path()) {
            if bag.payload_file(&rel).is_none() {
                tracing::debug!(path = %rel, "removing payload file no longer in bag");
                remove_file_if_exists(entry.path())?;
            }
        }
    }
    Ok(())
}
