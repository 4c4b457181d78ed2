//! Retrieving a bag that is published as a plain directory tree.

use std::fs;
use std::path::Path;

use bagit_core::{
    Algorithm, BAG_INFO, Bag, DECLARATION, FETCH, FileKind, LoadMode, Loader, ManifestKind, classify,
    manifest_filename, write_tag,
};
use bagit_pipeline::{Category, HolePuncher, Message, TagMode, VerifyResult};
use url::Url;

use crate::destination::{DestinationFactory, FileSystemDestinations};
use crate::error::{FetchError, Result};
use crate::fetcher::BagFetcher;
use crate::transport::{FetchContext, Transport};

/// Copies single tag files from below a base URL into the local bag
/// directory, reusing one transport.
struct TagCopier<'a> {
    fetcher:      &'a BagFetcher,
    base:         Url,
    transport:    Box<dyn Transport>,
    destinations: FileSystemDestinations,
}

impl TagCopier<'_> {
    /// `Ok(false)` when the remote bag has no file at `path`.
    fn copy(&mut self, path: &str) -> Result<bool> {
        let url = self.base.join(path).map_err(|e| FetchError::InvalidUrl {
            url:    format!("{}{path}", self.base),
            reason: e.to_string(),
        })?;
        let ctx = FetchContext {
            path,
            cancel: self.fetcher.cancel_token(),
            progress: self.fetcher.progress(),
        };
        let mut destination = self.destinations.create(path, None)?;
        match self.transport.fetch(&url, None, destination.sink(), &ctx) {
            Ok(bytes) => {
                destination.commit()?;
                tracing::debug!(path, url = %url, bytes, "copied tag file");
                Ok(true)
            }
            Err(FetchError::Cancelled) => {
                destination.abandon();
                Err(FetchError::Cancelled)
            }
            Err(e) => {
                destination.abandon();
                tracing::debug!(path, url = %url, error = %e, "not present in remote bag");
                Ok(false)
            }
        }
    }
}

impl BagFetcher {
    /// Make `dest_dir` a holey copy of the bag below `base_url`, then fill it.
    ///
    /// `bagit.txt` and at least one payload manifest must exist remotely.
    /// Tag manifests, every tag file they list and `bag-info.txt` are copied
    /// when present. Without a remote `fetch.txt`, one pointing at
    /// `<base_url>/data/...` is written from the payload manifests. When
    /// resuming, a local `fetch.txt` is kept as is.
    pub fn fetch_remote_bag(&self, dest_dir: impl AsRef<Path>, base_url: &str) -> Result<VerifyResult> {
        let root = dest_dir.as_ref();
        let base = directory_url(base_url)?;
        if !self.registry().supports(base.scheme()) {
            return Err(FetchError::UnknownScheme {
                scheme: base.scheme().to_string(),
                url:    base_url.to_string(),
            });
        }
        fs::create_dir_all(root).map_err(FetchError::io(root.display().to_string()))?;
        tracing::info!(url = %base, root = %root.display(), "retrieving remote bag");

        let mut transport = self.registry().create(base.scheme())?;
        transport.initialize()?;
        let mut copier = TagCopier {
            fetcher: self,
            base,
            transport,
            destinations: FileSystemDestinations::new(root),
        };
        let result = self.retrieve(&mut copier, root);
        copier.transport.close();
        match result {
            Err(FetchError::Cancelled) => Ok(VerifyResult::fail(Message::new(
                Category::TransferCancelled,
                "Transfer cancelled.",
            ))),
            other => other,
        }
    }

    fn retrieve(&self, copier: &mut TagCopier<'_>, root: &Path) -> Result<VerifyResult> {
        if !copier.copy(DECLARATION)? {
            return Ok(VerifyResult::fail(Message::about(
                Category::NoBagitTxt,
                DECLARATION,
                format!("Remote bag at {} does not have {DECLARATION}.", copier.base),
            )));
        }

        for algorithm in Algorithm::ALL {
            for kind in [ManifestKind::Tag, ManifestKind::Payload] {
                copier.copy(&manifest_filename(kind, algorithm))?;
            }
        }

        let keep_local_fetch = self.is_resuming() && root.join(FETCH).is_file();
        let remote_fetch = if keep_local_fetch {
            tracing::debug!("keeping local {FETCH}");
            true
        } else {
            copier.copy(FETCH)?
        };

        let partial = Loader::new(LoadMode::Manifests).load(root)?;
        if partial.payload_manifests().next().is_none() {
            return Ok(VerifyResult::fail(Message::new(
                Category::NoPayloadManifest,
                format!("Remote bag at {} does not have any payload manifests.", copier.base),
            )));
        }

        for (path, manifest) in listed_tags(&partial) {
            if !copier.copy(&path)? {
                tracing::warn!(path = %path, manifest = %manifest, "tag file listed in a tag manifest is missing remotely");
                return Ok(VerifyResult::fail(Message::about(
                    Category::TagManifestContainsMissingFile,
                    path.as_str(),
                    format!("File {path} in manifest {manifest} missing from bag."),
                )));
            }
        }
        if !root.join(BAG_INFO).is_file() {
            copier.copy(BAG_INFO)?;
        }

        if !remote_fetch {
            tracing::info!("remote bag has no {FETCH}, deriving one from the payload manifests");
            let holey = HolePuncher::new(copier.base.as_str())?
                .include_payload_directory(true)
                .tag_mode(TagMode::Keep)
                .make_holey(&partial)?;
            write_tag(&holey, root, FETCH)?;
        }

        let bag = Loader::new(LoadMode::Manifests).load(root)?;
        self.fetch_into(&bag, root)
    }
}

/// Plain tag files named by tag manifests that are not on disk yet, each
/// with the first manifest that lists it.
fn listed_tags(bag: &Bag) -> Vec<(String, String)> {
    let mut paths: Vec<(String, String)> = bag
        .tag_manifests()
        .flat_map(|m| m.paths().map(move |p| (p.to_string(), m.path().to_string())))
        .filter(|(p, _)| classify(p) == FileKind::Plain)
        .filter(|(p, _)| !bag.get(p).is_some_and(|f| f.exists()))
        .collect();
    paths.sort();
    paths.dedup_by(|a, b| a.0 == b.0);
    paths
}

/// `url` with a trailing slash, so relative joins stay below it.
fn directory_url(url: &str) -> Result<Url> {
    let mut parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
        url:    url.to_string(),
        reason: e.to_string(),
    })?;
    if parsed.cannot_be_a_base() {
        return Err(FetchError::InvalidUrl {
            url:    url.to_string(),
            reason: "cannot be a base URL".to_string(),
        });
    }
    if !parsed.path().ends_with('/') {
        let path = format!("{}/", parsed.path());
        parsed.set_path(&path);
    }
    Ok(parsed)
}
