use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bagit_fixity::Algorithm;

use crate::classify::{BAG_INFO, DECLARATION, FETCH, FETCH_PROGRESS, FileKind, classify, is_payload};
use crate::declaration::{Declaration, Version};
use crate::error::Result;
use crate::fetch::FetchManifest;
use crate::file::BagFile;
use crate::info::{BagInfo, Oxum, human_size};
use crate::manifest::{Manifest, ManifestKind};
use crate::tag::TagFile;

/// A snapshot of a bag.
///
/// Payload and tag files live in two disjoint path-keyed maps. Cloning is
/// cheap: files and typed tags are shared, and the typed accessors ending in
/// `_mut` copy a shared value before handing out a mutable reference.
#[derive(Debug, Clone, Default)]
pub struct Bag {
    version: Version,
    root:    Option<PathBuf>,
    payload: BTreeMap<String, BagFile>,
    tags:    BTreeMap<String, TagFile>,
}

impl Bag {
    pub fn new(version: Version) -> Self {
        Self {
            version,
            ..Default::default()
        }
    }

    pub fn version(&self) -> Version { self.version }

    pub fn set_version(&mut self, version: Version) { self.version = version; }

    /// Directory this bag was loaded from or written to.
    pub fn root(&self) -> Option<&Path> { self.root.as_deref() }

    pub fn set_root(&mut self, root: Option<PathBuf>) { self.root = root; }

    /// Insert a file, classifying it by path. Tag files with a well-known name
    /// are parsed and stored typed.
    pub fn put(&mut self, file: BagFile) -> Result<()> {
        match classify(file.path()) {
            FileKind::Payload => {
                self.payload.insert(file.path().to_string(), file);
            }
            FileKind::Plain => {
                self.tags.insert(file.path().to_string(), TagFile::Plain(file));
            }
            _ => {
                let tag = TagFile::from_bag_file(file)?;
                self.put_tag(tag);
            }
        }
        Ok(())
    }

    /// Insert an already typed tag. Callers are responsible for the path
    /// matching the variant, which every constructor of the typed values
    /// guarantees.
    pub fn put_tag(&mut self, tag: TagFile) { self.tags.insert(tag.path().to_string(), tag); }

    pub fn put_manifest(&mut self, manifest: Manifest) {
        self.put_tag(TagFile::Manifest(Arc::new(manifest)));
    }

    pub fn put_declaration(&mut self, declaration: Declaration) {
        self.put_tag(TagFile::Declaration(Arc::new(declaration)));
    }

    pub fn put_bag_info(&mut self, info: BagInfo) { self.put_tag(TagFile::Metadata(Arc::new(info))); }

    /// Stores `fetch.txt` or the progress ledger, depending on its path.
    pub fn put_fetch(&mut self, fetch: FetchManifest) { self.put_tag(TagFile::Fetch(Arc::new(fetch))); }

    /// Stores `ledger` as `fetch-progress.txt` whatever its path was.
    pub fn put_fetch_progress(&mut self, ledger: FetchManifest) { self.put_fetch(ledger.into_ledger()); }

    pub fn remove(&mut self, path: &str) -> bool {
        if is_payload(path) {
            self.payload.remove(path).is_some()
        } else {
            self.tags.remove(path).is_some()
        }
    }

    pub fn contains(&self, path: &str) -> bool { self.payload.contains_key(path) || self.tags.contains_key(path) }

    /// Byte view of any file in the bag.
    pub fn get(&self, path: &str) -> Option<BagFile> {
        if is_payload(path) {
            self.payload.get(path).cloned()
        } else {
            self.tags.get(path).map(TagFile::to_bag_file)
        }
    }

    pub fn payload_file(&self, path: &str) -> Option<&BagFile> { self.payload.get(path) }

    pub fn tag(&self, path: &str) -> Option<&TagFile> { self.tags.get(path) }

    pub fn payload(&self) -> impl Iterator<Item = &BagFile> { self.payload.values() }

    pub fn payload_len(&self) -> usize { self.payload.len() }

    pub fn tags(&self) -> impl Iterator<Item = &TagFile> { self.tags.values() }

    pub fn manifests(&self) -> impl Iterator<Item = &Manifest> {
        self.tags.values().filter_map(|t| match t {
            TagFile::Manifest(m) => Some(m.as_ref()),
            _ => None,
        })
    }

    pub fn manifests_of(&self, kind: ManifestKind) -> impl Iterator<Item = &Manifest> {
        self.manifests().filter(move |m| m.kind() == kind)
    }

    pub fn payload_manifests(&self) -> impl Iterator<Item = &Manifest> { self.manifests_of(ManifestKind::Payload) }

    pub fn tag_manifests(&self) -> impl Iterator<Item = &Manifest> { self.manifests_of(ManifestKind::Tag) }

    pub fn manifest(&self, kind: ManifestKind, algorithm: Algorithm) -> Option<&Manifest> {
        self.manifests_of(kind).find(|m| m.algorithm() == algorithm)
    }

    pub fn manifest_mut(&mut self, kind: ManifestKind, algorithm: Algorithm) -> Option<&mut Manifest> {
        let path = crate::classify::manifest_filename(kind, algorithm);
        match self.tags.get_mut(&path) {
            Some(TagFile::Manifest(m)) => Some(Arc::make_mut(m)),
            _ => None,
        }
    }

    /// Paths of all manifests of `kind`.
    pub fn manifest_paths(&self, kind: ManifestKind) -> Vec<String> {
        self.manifests_of(kind).map(|m| m.path().to_string()).collect()
    }

    pub fn declaration(&self) -> Option<&Declaration> {
        match self.tags.get(DECLARATION) {
            Some(TagFile::Declaration(d)) => Some(d.as_ref()),
            _ => None,
        }
    }

    pub fn bag_info(&self) -> Option<&BagInfo> {
        match self.tags.get(BAG_INFO) {
            Some(TagFile::Metadata(i)) => Some(i.as_ref()),
            _ => None,
        }
    }

    pub fn bag_info_mut(&mut self) -> Option<&mut BagInfo> {
        match self.tags.get_mut(BAG_INFO) {
            Some(TagFile::Metadata(i)) => Some(Arc::make_mut(i)),
            _ => None,
        }
    }

    pub fn fetch_manifest(&self) -> Option<&FetchManifest> { self.fetch_at(FETCH) }

    pub fn fetch_progress(&self) -> Option<&FetchManifest> { self.fetch_at(FETCH_PROGRESS) }

    pub fn fetch_progress_mut(&mut self) -> Option<&mut FetchManifest> {
        match self.tags.get_mut(FETCH_PROGRESS) {
            Some(TagFile::Fetch(f)) => Some(Arc::make_mut(f)),
            _ => None,
        }
    }

    fn fetch_at(&self, path: &str) -> Option<&FetchManifest> {
        match self.tags.get(path) {
            Some(TagFile::Fetch(f)) => Some(f.as_ref()),
            _ => None,
        }
    }

    /// Every checksum recorded for `path` by manifests of the matching kind.
    pub fn checksums(&self, path: &str) -> Vec<(Algorithm, String)> {
        let kind = if is_payload(path) {
            ManifestKind::Payload
        } else {
            ManifestKind::Tag
        };
        self.manifests_of(kind)
            .filter_map(|m| m.get(path).map(|hex| (m.algorithm(), hex.to_string())))
            .collect()
    }

    /// Whether any manifest, of either kind, has a checksum for `path`.
    pub fn has_checksum(&self, path: &str) -> bool { self.manifests().any(|m| m.contains(path)) }

    pub fn payload_oxum(&self) -> Oxum {
        Oxum {
            octets:  self.payload.values().map(BagFile::size).sum(),
            streams: self.payload.len() as u64,
        }
    }

    /// Octets of the tag files that Bag-Size counts: every tag file except
    /// bag-info.txt and the tag manifests, whose content depends on Bag-Size.
    pub fn tag_octets(&self) -> u64 {
        self.tags
            .values()
            .filter(|t| match t {
                TagFile::Metadata(_) => false,
                TagFile::Manifest(m) => m.kind() == ManifestKind::Payload,
                _ => true,
            })
            .map(TagFile::size)
            .sum()
    }

    /// Human readable size of tags plus payload. Stable once the payload
    /// manifests are up to date.
    pub fn bag_size(&self) -> String { human_size(self.tag_octets() + self.payload_oxum().octets) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchItem;

    fn sample() -> Bag {
        let mut bag = Bag::new(Version::V0_97);
        bag.put(BagFile::from_bytes("data/a.txt", b"hello")).unwrap();
        bag.put(BagFile::from_bytes("data/b.txt", b"abc")).unwrap();
        bag.put(BagFile::from_bytes(
            "manifest-md5.txt",
            b"5d41402abc4b2a76b9719d911017c592  data/a.txt\n",
        ))
        .unwrap();
        bag.put(BagFile::from_bytes("bag-info.txt", b"Source-Organization: Example\n")).unwrap();
        bag.put(BagFile::from_bytes("notes.txt", b"free text")).unwrap();
        bag
    }

    #[test]
    fn test_put_classifies_once() {
        let bag = sample();
        assert_eq!(bag.payload_len(), 2);
        assert_eq!(bag.tags().count(), 3);
        assert_eq!(bag.payload_manifests().count(), 1);
        assert!(matches!(bag.tag("manifest-md5.txt"), Some(TagFile::Manifest(_))));
        assert!(matches!(bag.tag("notes.txt"), Some(TagFile::Plain(_))));
        assert_eq!(bag.bag_info().unwrap().get("source-organization"), Some("Example"));
    }

    #[test]
    fn test_reinsert_replaces_typed_form() {
        let mut bag = sample();
        bag.put(BagFile::from_bytes("manifest-md5.txt", b"")).unwrap();
        assert_eq!(bag.manifests().count(), 1);
        assert!(bag.manifest(ManifestKind::Payload, Algorithm::Md5).unwrap().is_empty());
    }

    #[test]
    fn test_copy_on_write() {
        let original = sample();
        let mut copy = original.clone();
        copy.manifest_mut(ManifestKind::Payload, Algorithm::Md5)
            .unwrap()
            .insert("data/b.txt", "900150983cd24fb0d6963f7d28e17f72");
        copy.bag_info_mut().unwrap().set("Bag-Count", "1 of 1");

        assert_eq!(original.manifest(ManifestKind::Payload, Algorithm::Md5).unwrap().len(), 1);
        assert_eq!(copy.manifest(ManifestKind::Payload, Algorithm::Md5).unwrap().len(), 2);
        assert!(!original.bag_info().unwrap().contains("Bag-Count"));
    }

    #[test]
    fn test_checksums_and_oxum() {
        let bag = sample();
        assert_eq!(
            bag.checksums("data/a.txt"),
            vec![(Algorithm::Md5, "5d41402abc4b2a76b9719d911017c592".to_string())]
        );
        assert!(bag.checksums("data/b.txt").is_empty());
        assert!(bag.has_checksum("data/a.txt"));
        assert_eq!(bag.payload_oxum(), Oxum { octets: 8, streams: 2 });
    }

    #[test]
    fn test_bag_size_leaves_out_bag_info_and_tag_manifests() {
        let mut bag = sample();
        assert_eq!(bag.tag_octets(), 45 + 9);
        assert_eq!(bag.bag_size(), "62 bytes");
        bag.put(BagFile::from_bytes("tagmanifest-md5.txt", b"0cc175b9c0f1b6a831c399e269772661  notes.txt\n"))
            .unwrap();
        bag.bag_info_mut().unwrap().set("Bag-Size", "62 bytes");
        assert_eq!(bag.bag_size(), "62 bytes");
    }

    #[test]
    fn test_remove_and_get() {
        let mut bag = sample();
        assert_eq!(bag.get("bag-info.txt").unwrap().read_all().unwrap(), b"Source-Organization: Example\n");
        assert!(bag.remove("data/a.txt"));
        assert!(!bag.remove("data/a.txt"));
        assert!(bag.get("data/a.txt").is_none());
        assert!(bag.remove("notes.txt"));
        assert!(!bag.contains("notes.txt"));
    }

    #[test]
    fn test_put_fetch_progress_stores_a_ledger() {
        let mut bag = sample();
        let mut fetch = FetchManifest::new();
        fetch.push(FetchItem::new("data/c.txt", None, "http://example.org/c.txt"));
        bag.put_fetch_progress(fetch);
        assert!(bag.fetch_manifest().is_none());
        let ledger = bag.fetch_progress().unwrap();
        assert!(ledger.is_ledger());
        assert_eq!(ledger.to_bytes(), b"http://example.org/c.txt  -  NOT_FETCHED  data/c.txt\n");
    }

    #[test]
    fn test_malformed_tag_is_rejected() {
        let mut bag = Bag::new(Version::V0_97);
        assert!(bag.put(BagFile::from_bytes("manifest-md5.txt", b"garbage\n")).is_err());
        assert!(bag.tag("manifest-md5.txt").is_none());
    }
}
