//! Completers bring manifests and bag-info up to date with a bag's files.
//!
//! Each manifest is processed in up to three passes:
//!
//! - **clean** drops entries whose file no longer exists
//! - **regenerate** recomputes existing entries
//! - **extend** adds entries for files the manifest does not list yet
//!
//! Each pass is restricted to a [`Scope`]. Digests are computed on a rayon pool;
//! every worker folds into a private map and the maps are merged into the
//! manifest once all workers are done.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use bagit_core::{
    Algorithm, Bag, BagInfo, DEFAULT_SEPARATOR, Declaration, FileKind, Manifest, ManifestKind, TagFile, classify,
};
use rayon::prelude::*;

use crate::cancel::CancelToken;
use crate::error::{PipelineError, Result};
use crate::pool;
use crate::progress::{ProgressFn, report};
use crate::verify::{bag_file, file_exists};

/// A set of bag-relative files and directories. An empty scope matches
/// every path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope {
    pub files: Vec<String>,
    pub dirs:  Vec<String>,
}

impl Scope {
    /// Matches everything.
    pub fn all() -> Self { Self::default() }

    pub fn files(files: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            files: files.into_iter().map(Into::into).collect(),
            dirs:  Vec::new(),
        }
    }

    pub fn dirs(dirs: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            files: Vec::new(),
            dirs:  dirs.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_empty(&self) -> bool { self.files.is_empty() && self.dirs.is_empty() }

    pub fn matches(&self, path: &str) -> bool {
        self.is_empty()
            || self.files.iter().any(|f| f == path)
            || self.dirs.iter().any(|d| {
                let dir = d.trim_end_matches('/');
                path.strip_prefix(dir).is_some_and(|rest| rest.starts_with('/'))
            })
    }

    /// This scope plus `paths`. A scope that already matches everything is
    /// returned unchanged.
    fn including(&self, paths: impl IntoIterator<Item = String>) -> Scope {
        let mut scope = self.clone();
        if !scope.is_empty() {
            scope.files.extend(paths);
        }
        scope
    }
}

/// Scopes for the three manifest passes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Limits {
    pub add:    Scope,
    pub update: Scope,
    pub delete: Scope,
}

impl Limits {
    /// Every pass restricted to `scope`.
    pub fn only(scope: Scope) -> Self {
        Self {
            add:    scope.clone(),
            update: scope.clone(),
            delete: scope,
        }
    }
}

pub trait Completer: Send + Sync {
    /// A completed copy of `bag`, or `None` when cancelled. Nothing is
    /// written to storage.
    fn complete(&self, bag: &Bag) -> Result<Option<Bag>>;

    fn cancel_token(&self) -> &CancelToken;

    fn cancel(&self) { self.cancel_token().cancel(); }

    fn is_cancelled(&self) -> bool { self.cancel_token().is_cancelled() }
}

/// Worker pool settings shared by every completer.
#[derive(Clone)]
struct Workers {
    threads:  usize,
    cancel:   CancelToken,
    progress: Option<ProgressFn>,
}

impl Default for Workers {
    fn default() -> Self {
        Self {
            threads:  pool::default_threads(),
            cancel:   CancelToken::new(),
            progress: None,
        }
    }
}

impl fmt::Debug for Workers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workers")
            .field("threads", &self.threads)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

/// `Some(())` to go on, `None` once cancelled.
type Step = Option<()>;

impl Workers {
    fn cancelled(&self) -> bool { self.cancel.is_cancelled() }

    fn manifests(bag: &Bag, kind: ManifestKind) -> Vec<Algorithm> {
        bag.manifests_of(kind).map(Manifest::algorithm).collect()
    }

    /// Digests of `paths`, computed in parallel. `None` when cancelled.
    fn digest_all(&self, bag: &Bag, algorithm: Algorithm, paths: &[String]) -> Result<Option<HashMap<String, String>>> {
        let total = paths.len() as u64;
        let count = AtomicU64::new(0);
        let digests = pool::install(self.threads, "bagit-complete", || {
            paths
                .par_iter()
                .try_fold(HashMap::new, |mut acc, path| {
                    if self.cancelled() {
                        return Ok(acc);
                    }
                    let n = count.fetch_add(1, Ordering::Relaxed) + 1;
                    report(&self.progress, "creating manifest entry", path, n, Some(total));
                    let file = bag_file(bag, path).ok_or_else(|| PipelineError::Io {
                        path:   path.clone(),
                        source: std::io::Error::new(std::io::ErrorKind::NotFound, "file is not in the bag"),
                    })?;
                    let hex = file.digest(algorithm).map_err(PipelineError::io(path.as_str()))?;
                    tracing::debug!(path = %path, %algorithm, "generated fixity");
                    acc.insert(path.clone(), hex);
                    Ok::<_, PipelineError>(acc)
                })
                .try_reduce(HashMap::new, |mut a, b| {
                    a.extend(b);
                    Ok(a)
                })
        })?;
        Ok((!self.cancelled()).then_some(digests))
    }

    /// Remove entries in `scope` whose file is gone, from every manifest of
    /// `kind`.
    fn clean(&self, bag: &mut Bag, kind: ManifestKind, scope: &Scope) -> Step {
        let algorithms = Self::manifests(bag, kind);
        let total = algorithms.len() as u64;
        for (i, algorithm) in algorithms.into_iter().enumerate() {
            if self.cancelled() {
                return None;
            }
            let Some(mut manifest) = bag.manifest(kind, algorithm).cloned() else { continue };
            report(&self.progress, "cleaning manifest", manifest.path(), i as u64 + 1, Some(total));
            let before = manifest.len();
            manifest.retain(|path, _| !scope.matches(path) || file_exists(bag, path));
            if manifest.len() != before {
                tracing::debug!(manifest = %manifest.path(), removed = before - manifest.len(), "cleaned manifest");
                bag.put_manifest(manifest);
            }
        }
        Some(())
    }

    /// Recompute entries in `scope` whose file exists.
    fn regenerate(&self, bag: &mut Bag, kind: ManifestKind, algorithm: Algorithm, scope: &Scope) -> Result<Step> {
        let Some(mut manifest) = bag.manifest(kind, algorithm).cloned() else { return Ok(Some(())) };
        let paths: Vec<String> = manifest
            .paths()
            .filter(|p| scope.matches(p) && file_exists(bag, p))
            .map(str::to_string)
            .collect();
        if paths.is_empty() {
            return Ok(Some(()));
        }
        tracing::debug!(manifest = %manifest.path(), entries = paths.len(), "regenerating manifest");
        let Some(digests) = self.digest_all(bag, algorithm, &paths)? else { return Ok(None) };
        for path in paths {
            if let Some(hex) = digests.get(&path) {
                manifest.insert(path, hex.clone());
            }
        }
        bag.put_manifest(manifest);
        Ok(Some(()))
    }

    /// Add entries for files in `scope` that the manifest does not list. The
    /// manifest is created with `separator` if absent, and only stored when it
    /// ends up non-empty.
    fn extend(
        &self,
        bag: &mut Bag,
        kind: ManifestKind,
        algorithm: Algorithm,
        separator: &str,
        scope: &Scope,
    ) -> Result<Step> {
        let mut manifest = match bag.manifest(kind, algorithm) {
            Some(existing) => existing.clone(),
            None => {
                let mut created = Manifest::empty(kind, algorithm);
                created.set_separator(separator);
                created
            }
        };
        let candidates: Vec<String> = match kind {
            ManifestKind::Payload => bag
                .payload()
                .filter(|f| f.exists() && !manifest.contains(f.path()))
                .map(|f| f.path().to_string())
                .collect(),
            // A tag file that some manifest already covers is left alone, and
            // tag manifests never list each other.
            ManifestKind::Tag => bag
                .tags()
                .filter(|t| t.exists() && !matches!(classify(t.path()), FileKind::TagManifest(_)))
                .map(TagFile::path)
                .filter(|p| !bag.has_checksum(p))
                .map(str::to_string)
                .collect(),
        };
        let candidates: Vec<String> = candidates.into_iter().filter(|p| scope.matches(p)).collect();

        if !candidates.is_empty() {
            let Some(digests) = self.digest_all(bag, algorithm, &candidates)? else { return Ok(None) };
            for path in candidates {
                if let Some(hex) = digests.get(&path) {
                    manifest.insert(path, hex.clone());
                }
            }
        }
        if !manifest.is_empty() {
            bag.put_manifest(manifest);
        }
        Ok(Some(()))
    }

    fn remove_all(bag: &mut Bag, kind: ManifestKind) {
        for path in bag.manifest_paths(kind) {
            bag.remove(&path);
        }
    }
}

macro_rules! worker_settings {
    () => {
        /// Number of hashing workers.
        #[must_use]
        pub fn threads(mut self, threads: usize) -> Self {
            self.workers.threads = threads.max(1);
            self
        }

        /// Share `token` with the caller so the completion can be cancelled.
        #[must_use]
        pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
            self.workers.cancel = token;
            self
        }

        #[must_use]
        pub fn on_progress(mut self, progress: ProgressFn) -> Self {
            self.workers.progress = Some(progress);
            self
        }
    };
}

/// Makes a bag complete: declaration, bag-info, payload manifests and tag
/// manifests.
#[derive(Debug, Clone)]
pub struct DefaultCompleter {
    generate_tag_manifest:   bool,
    update_payload_oxum:     bool,
    update_bagging_date:     bool,
    update_bag_size:         bool,
    generate_bag_info:       bool,
    clear_payload_manifests: bool,
    clear_tag_manifests:     bool,
    payload_algorithm:       Algorithm,
    tag_algorithm:           Algorithm,
    separator:               String,
    workers:                 Workers,
}

impl Default for DefaultCompleter {
    fn default() -> Self {
        Self {
            generate_tag_manifest:   true,
            update_payload_oxum:     true,
            update_bagging_date:     true,
            update_bag_size:         true,
            generate_bag_info:       true,
            clear_payload_manifests: false,
            clear_tag_manifests:     true,
            payload_algorithm:       Algorithm::Md5,
            tag_algorithm:           Algorithm::Md5,
            separator:               DEFAULT_SEPARATOR.to_string(),
            workers:                 Workers::default(),
        }
    }
}

impl DefaultCompleter {
    pub fn new() -> Self { Self::default() }

    worker_settings!();

    #[must_use]
    pub fn generate_tag_manifest(mut self, generate: bool) -> Self {
        self.generate_tag_manifest = generate;
        self
    }

    #[must_use]
    pub fn update_payload_oxum(mut self, update: bool) -> Self {
        self.update_payload_oxum = update;
        self
    }

    #[must_use]
    pub fn update_bagging_date(mut self, update: bool) -> Self {
        self.update_bagging_date = update;
        self
    }

    #[must_use]
    pub fn update_bag_size(mut self, update: bool) -> Self {
        self.update_bag_size = update;
        self
    }

    #[must_use]
    pub fn generate_bag_info(mut self, generate: bool) -> Self {
        self.generate_bag_info = generate;
        self
    }

    #[must_use]
    pub fn clear_payload_manifests(mut self, clear: bool) -> Self {
        self.clear_payload_manifests = clear;
        self
    }

    #[must_use]
    pub fn clear_tag_manifests(mut self, clear: bool) -> Self {
        self.clear_tag_manifests = clear;
        self
    }

    #[must_use]
    pub fn payload_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.payload_algorithm = algorithm;
        self
    }

    #[must_use]
    pub fn tag_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.tag_algorithm = algorithm;
        self
    }

    /// Separator for newly created manifests.
    #[must_use]
    pub fn separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    fn bag_info(&self, bag: &mut Bag) {
        if bag.bag_info().is_none() {
            if !self.generate_bag_info {
                return;
            }
            bag.put_bag_info(BagInfo::new());
        }
        let oxum = bag.payload_oxum();
        let size = bag.bag_size();
        let Some(info) = bag.bag_info_mut() else { return };
        if self.update_payload_oxum {
            info.set_payload_oxum(oxum);
        }
        if self.update_bagging_date {
            info.set_bagging_date(chrono::Local::now().date_naive());
        }
        if self.update_bag_size {
            info.set_bag_size(size);
        }
    }

    fn payload_manifests(&self, bag: &mut Bag) -> Result<Step> {
        if self.clear_payload_manifests {
            Workers::remove_all(bag, ManifestKind::Payload);
        }
        let workers = &self.workers;
        if workers.clean(bag, ManifestKind::Payload, &Scope::all()).is_none() {
            return Ok(None);
        }
        let mut algorithms = Workers::manifests(bag, ManifestKind::Payload);
        if !algorithms.contains(&self.payload_algorithm) {
            algorithms.push(self.payload_algorithm);
        }
        for algorithm in algorithms {
            if workers
                .extend(bag, ManifestKind::Payload, algorithm, &self.separator, &Scope::all())?
                .is_none()
            {
                return Ok(None);
            }
        }
        Ok(Some(()))
    }

    fn tag_manifests(&self, bag: &mut Bag) -> Result<Step> {
        let workers = &self.workers;
        if self.clear_tag_manifests {
            Workers::remove_all(bag, ManifestKind::Tag);
        } else {
            if workers.clean(bag, ManifestKind::Tag, &Scope::all()).is_none() {
                return Ok(None);
            }
            for algorithm in Workers::manifests(bag, ManifestKind::Tag) {
                if workers.regenerate(bag, ManifestKind::Tag, algorithm, &Scope::all())?.is_none() {
                    return Ok(None);
                }
            }
        }
        if self.generate_tag_manifest {
            return workers.extend(bag, ManifestKind::Tag, self.tag_algorithm, &self.separator, &Scope::all());
        }
        Ok(Some(()))
    }
}

impl Completer for DefaultCompleter {
    fn complete(&self, bag: &Bag) -> Result<Option<Bag>> {
        tracing::info!(payload = bag.payload_len(), "completing bag");
        let mut out = bag.clone();
        if out.declaration().is_none() {
            out.put_declaration(Declaration::new(out.version()));
        }
        if self.payload_manifests(&mut out)?.is_some() {
            // Bag-Size counts the payload manifests, so bag-info comes after them.
            self.bag_info(&mut out);
            if self.tag_manifests(&mut out)?.is_some() {
                return Ok(Some(out));
            }
        }
        tracing::info!("completion cancelled");
        Ok(None)
    }

    fn cancel_token(&self) -> &CancelToken { &self.workers.cancel }
}

/// Updates an existing bag in place without adding metadata it did not have.
#[derive(Debug, Clone)]
pub struct UpdateCompleter {
    limits:            Limits,
    payload_algorithm: Algorithm,
    separator:         String,
    update_bag_info:   bool,
    workers:           Workers,
}

impl Default for UpdateCompleter {
    fn default() -> Self {
        Self {
            limits:            Limits::default(),
            payload_algorithm: Algorithm::Md5,
            separator:         DEFAULT_SEPARATOR.to_string(),
            update_bag_info:   true,
            workers:           Workers::default(),
        }
    }
}

impl UpdateCompleter {
    pub fn new() -> Self { Self::default() }

    worker_settings!();

    #[must_use]
    pub fn limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    #[must_use]
    pub fn limit_add(mut self, scope: Scope) -> Self {
        self.limits.add = scope;
        self
    }

    #[must_use]
    pub fn limit_update(mut self, scope: Scope) -> Self {
        self.limits.update = scope;
        self
    }

    #[must_use]
    pub fn limit_delete(mut self, scope: Scope) -> Self {
        self.limits.delete = scope;
        self
    }

    /// Algorithm of the payload manifest created when the bag has none.
    #[must_use]
    pub fn payload_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.payload_algorithm = algorithm;
        self
    }

    #[must_use]
    pub fn separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// Refresh the Payload-Oxum, Bagging-Date and Bag-Size fields that
    /// bag-info already has.
    #[must_use]
    pub fn update_bag_info(mut self, update: bool) -> Self {
        self.update_bag_info = update;
        self
    }

    fn bag_info(&self, bag: &mut Bag) {
        if !self.update_bag_info {
            return;
        }
        let oxum = bag.payload_oxum();
        let size = bag.bag_size();
        let Some(info) = bag.bag_info_mut() else { return };
        if info.payload_oxum().is_some() {
            info.set_payload_oxum(oxum);
        }
        if info.bagging_date().is_some() {
            info.set_bagging_date(chrono::Local::now().date_naive());
        }
        if info.bag_size().is_some() {
            info.set_bag_size(size);
        }
    }

    fn manifests(&self, bag: &mut Bag, kind: ManifestKind, update: &Scope) -> Result<Step> {
        let workers = &self.workers;
        if workers.clean(bag, kind, &self.limits.delete).is_none() {
            return Ok(None);
        }
        let mut algorithms = Workers::manifests(bag, kind);
        if algorithms.is_empty() && kind == ManifestKind::Payload {
            algorithms.push(self.payload_algorithm);
        }
        for algorithm in algorithms {
            if workers.regenerate(bag, kind, algorithm, update)?.is_none()
                || workers
                    .extend(bag, kind, algorithm, &self.separator, &self.limits.add)?
                    .is_none()
            {
                return Ok(None);
            }
        }
        Ok(Some(()))
    }
}

/// Paths of tag files whose content differs between two snapshots.
fn changed_tags(before: &Bag, after: &Bag) -> Vec<String> {
    let mut changed: Vec<String> = after
        .payload_manifests()
        .filter(|&m| before.manifest(m.kind(), m.algorithm()) != Some(m))
        .map(|m| m.path().to_string())
        .collect();
    if before.bag_info() != after.bag_info() {
        changed.push(bagit_core::BAG_INFO.to_string());
    }
    changed
}

impl Completer for UpdateCompleter {
    fn complete(&self, bag: &Bag) -> Result<Option<Bag>> {
        tracing::info!(payload = bag.payload_len(), "updating bag");
        let mut out = bag.clone();
        if self.manifests(&mut out, ManifestKind::Payload, &self.limits.update)?.is_none() {
            return Ok(None);
        }
        self.bag_info(&mut out);
        let tag_update = self.limits.update.including(changed_tags(bag, &out));
        if self.manifests(&mut out, ManifestKind::Tag, &tag_update)?.is_none() {
            return Ok(None);
        }
        Ok(Some(out))
    }

    fn cancel_token(&self) -> &CancelToken { &self.workers.cancel }
}

/// Brings only the tag manifests up to date.
#[derive(Debug, Clone)]
pub struct TagManifestCompleter {
    limits:        Limits,
    tag_algorithm: Algorithm,
    separator:     String,
    workers:       Workers,
}

impl Default for TagManifestCompleter {
    fn default() -> Self {
        Self {
            limits:        Limits::default(),
            tag_algorithm: Algorithm::Md5,
            separator:     DEFAULT_SEPARATOR.to_string(),
            workers:       Workers::default(),
        }
    }
}

impl TagManifestCompleter {
    pub fn new() -> Self { Self::default() }

    worker_settings!();

    #[must_use]
    pub fn limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    #[must_use]
    pub fn tag_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.tag_algorithm = algorithm;
        self
    }

    #[must_use]
    pub fn separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }
}

impl Completer for TagManifestCompleter {
    fn complete(&self, bag: &Bag) -> Result<Option<Bag>> {
        let workers = &self.workers;
        let mut out = bag.clone();
        if workers.clean(&mut out, ManifestKind::Tag, &self.limits.delete).is_none() {
            return Ok(None);
        }
        for algorithm in Workers::manifests(&out, ManifestKind::Tag) {
            if workers
                .regenerate(&mut out, ManifestKind::Tag, algorithm, &self.limits.update)?
                .is_none()
            {
                return Ok(None);
            }
        }
        let extended = workers.extend(
            &mut out,
            ManifestKind::Tag,
            self.tag_algorithm,
            &self.separator,
            &self.limits.add,
        )?;
        Ok(extended.map(|()| out))
    }

    fn cancel_token(&self) -> &CancelToken { &self.workers.cancel }
}
