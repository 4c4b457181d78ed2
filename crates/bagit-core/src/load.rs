use std::fs;
use std::io;
use std::path::{Component, Path};

use walkdir::WalkDir;

use crate::bag::Bag;
use crate::classify::{DECLARATION, is_payload};
use crate::declaration::{Declaration, Version};
use crate::error::{CoreError, Result};
use crate::file::BagFile;

/// How payload files are found when loading a bag directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadMode {
    /// Walk the directory; every file under `data/` is payload.
    #[default]
    Files,
    /// Infer payload from payload manifests and `fetch.txt` without reading
    /// the payload directory. Inferred files may not exist.
    Manifests,
}

#[derive(Debug, Clone, Default)]
pub struct Loader {
    mode:         LoadMode,
    version:      Option<Version>,
    follow_links: bool,
    skip_hidden:  bool,
}

impl Loader {
    pub fn new(mode: LoadMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    /// Follow symbolic links while walking. Off by default, so links are
    /// ignored.
    #[must_use]
    pub fn follow_links(mut self, follow: bool) -> Self {
        self.follow_links = follow;
        self
    }

    /// Skip files and directories whose name starts with `.`.
    #[must_use]
    pub fn skip_hidden(mut self, skip: bool) -> Self {
        self.skip_hidden = skip;
        self
    }

    /// Use `version` instead of the one declared in `bagit.txt`.
    #[must_use]
    pub fn version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    pub fn load(&self, root: impl AsRef<Path>) -> Result<Bag> {
        let root = root.as_ref();
        let declared = match fs::read(root.join(DECLARATION)) {
            Ok(bytes) => Some(Declaration::parse(&bytes)?.version),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(CoreError::Io {
                path:   DECLARATION.to_string(),
                source: e,
            }),
        };

        let mut bag = Bag::new(self.version.or(declared).unwrap_or_default());
        bag.set_root(Some(root.to_path_buf()));
        match self.mode {
            LoadMode::Files => self.load_files(&mut bag, root)?,
            LoadMode::Manifests => load_manifests(&mut bag, root)?,
        }
        tracing::debug!(
            root = %root.display(),
            mode = ?self.mode,
            payload = bag.payload_len(),
            "loaded bag"
        );
        Ok(bag)
    }

    fn load_files(&self, bag: &mut Bag, root: &Path) -> Result<()> {
        let walker = WalkDir::new(root)
            .min_depth(1)
            .follow_links(self.follow_links)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !(self.skip_hidden && is_hidden(e)));
        for entry in walker {
            let entry = entry.map_err(|e| CoreError::Io {
                path:   e.path().map(|p| p.display().to_string()).unwrap_or_default(),
                source: e.into(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            match relative_path(root, entry.path()) {
                Some(rel) => bag.put(BagFile::from_path(rel, entry.path()))?,
                None => tracing::warn!(path = %entry.path().display(), "skipping file with non UTF-8 name"),
            }
        }
        Ok(())
    }
}

/// Load `root` by walking it.
pub fn load(root: impl AsRef<Path>) -> Result<Bag> { Loader::new(LoadMode::Files).load(root) }

/// Bag-relative path with `/` separators. `None` for paths that are not
/// valid UTF-8 or escape `root`.
pub fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            _ => return None,
        }
    }
    (!parts.is_empty()).then(|| parts.join("/"))
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_str().is_some_and(|n| n.starts_with('.'))
}

fn load_manifests(bag: &mut Bag, root: &Path) -> Result<()> {
    let mut top_level = Vec::new();
    for entry in fs::read_dir(root).map_err(CoreError::io(root.display().to_string()))? {
        let entry = entry.map_err(CoreError::io(root.display().to_string()))?;
        if entry.path().is_file() {
            if let Some(rel) = relative_path(root, &entry.path()) {
                top_level.push((rel, entry.path()));
            }
        }
    }
    top_level.sort();
    for (rel, path) in top_level {
        bag.put(BagFile::from_path(rel, path))?;
    }

    let nested_tags: Vec<String> = bag
        .tag_manifests()
        .flat_map(|m| m.paths())
        .filter(|p| !is_payload(p) && !bag.contains(p))
        .map(str::to_string)
        .collect();
    for rel in nested_tags {
        let local = root.join(&rel);
        if local.is_file() {
            bag.put(BagFile::from_path(rel, local))?;
        }
    }

    let mut payload: Vec<String> = bag
        .payload_manifests()
        .flat_map(|m| m.paths())
        .filter(|p| is_payload(p))
        .map(str::to_string)
        .collect();
    if let Some(fetch) = bag.fetch_manifest() {
        payload.extend(fetch.items().iter().map(|i| i.path.clone()).filter(|p| is_payload(p)));
    }
    for rel in payload {
        let local = root.join(&rel);
        bag.put(BagFile::from_path(rel, local))?;
    }
    Ok(())
}
