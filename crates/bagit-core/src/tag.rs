use std::sync::Arc;

use crate::classify::{BAG_INFO, DECLARATION, FileKind, classify};
use crate::declaration::Declaration;
use crate::error::Result;
use crate::fetch::FetchManifest;
use crate::file::BagFile;
use crate::info::BagInfo;
use crate::manifest::Manifest;

/// A tag file in its typed form.
///
/// Typed variants are shared between bag snapshots and cloned on write.
#[derive(Debug, Clone)]
pub enum TagFile {
    Plain(BagFile),
    Manifest(Arc<Manifest>),
    Declaration(Arc<Declaration>),
    Metadata(Arc<BagInfo>),
    Fetch(Arc<FetchManifest>),
}

impl TagFile {
    /// Read and parse `file` according to its name.
    pub fn from_bag_file(file: BagFile) -> Result<Self> {
        Ok(match classify(file.path()) {
            FileKind::PayloadManifest(_) | FileKind::TagManifest(_) => {
                TagFile::Manifest(Arc::new(Manifest::from_bag_file(&file)?))
            }
            FileKind::Declaration => TagFile::Declaration(Arc::new(Declaration::from_bag_file(&file)?)),
            FileKind::Metadata => TagFile::Metadata(Arc::new(BagInfo::from_bag_file(&file)?)),
            FileKind::FetchManifest | FileKind::FetchProgress => {
                TagFile::Fetch(Arc::new(FetchManifest::from_bag_file(&file)?))
            }
            FileKind::Plain | FileKind::Payload => TagFile::Plain(file),
        })
    }

    pub fn path(&self) -> &str {
        match self {
            TagFile::Plain(file) => file.path(),
            TagFile::Manifest(m) => m.path(),
            TagFile::Declaration(_) => DECLARATION,
            TagFile::Metadata(_) => BAG_INFO,
            TagFile::Fetch(f) => f.path(),
        }
    }

    /// Byte view. Typed variants are serialized on demand.
    pub fn to_bag_file(&self) -> BagFile {
        match self {
            TagFile::Plain(file) => file.clone(),
            TagFile::Manifest(m) => m.to_bag_file(),
            TagFile::Declaration(d) => d.to_bag_file(),
            TagFile::Metadata(i) => i.to_bag_file(),
            TagFile::Fetch(f) => f.to_bag_file(),
        }
    }

    pub fn exists(&self) -> bool {
        match self {
            TagFile::Plain(file) => file.exists(),
            _ => true,
        }
    }

    pub fn size(&self) -> u64 {
        match self {
            TagFile::Plain(file) => file.size(),
            TagFile::Manifest(m) => m.to_bytes().len() as u64,
            TagFile::Declaration(d) => d.to_bytes().len() as u64,
            TagFile::Metadata(i) => i.to_bytes().len() as u64,
            TagFile::Fetch(f) => f.to_bytes().len() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ManifestKind;
    use bagit_fixity::Algorithm;

    #[test]
    fn test_from_bag_file_types_by_name() {
        let manifest = TagFile::from_bag_file(BagFile::from_bytes(
            "manifest-md5.txt",
            b"d41d8cd98f00b204e9800998ecf8427e  data/a.txt\n",
        ))
        .unwrap();
        match &manifest {
            TagFile::Manifest(m) => {
                assert_eq!(m.kind(), ManifestKind::Payload);
                assert_eq!(m.algorithm(), Algorithm::Md5);
            }
            other => panic!("unexpected {other:?}"),
        }

        let info = TagFile::from_bag_file(BagFile::from_bytes("bag-info.txt", b"A: b\n")).unwrap();
        assert!(matches!(info, TagFile::Metadata(_)));
        assert_eq!(info.path(), "bag-info.txt");

        let plain = TagFile::from_bag_file(BagFile::from_bytes("notes/readme.txt", b"hi")).unwrap();
        assert!(matches!(plain, TagFile::Plain(_)));
        assert_eq!(plain.size(), 2);
    }

    #[test]
    fn test_typed_view_serializes() {
        let tag = TagFile::Declaration(Arc::new(Declaration::new(Default::default())));
        let file = tag.to_bag_file();
        assert_eq!(file.path(), "bagit.txt");
        assert_eq!(file.size(), tag.size());
        assert!(tag.exists());
    }
}
