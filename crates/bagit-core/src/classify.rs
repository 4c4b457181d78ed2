use bagit_fixity::Algorithm;

use crate::manifest::ManifestKind;

pub const DATA_DIR: &str = "data";
pub const PAYLOAD_PREFIX: &str = "data/";
pub const DECLARATION: &str = "bagit.txt";
pub const BAG_INFO: &str = "bag-info.txt";
pub const FETCH: &str = "fetch.txt";
pub const FETCH_PROGRESS: &str = "fetch-progress.txt";

/// What a bag-relative path is, by naming convention alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Payload,
    Plain,
    PayloadManifest(Algorithm),
    TagManifest(Algorithm),
    Declaration,
    Metadata,
    FetchManifest,
    FetchProgress,
}

impl FileKind {
    pub fn is_tag(self) -> bool { self != FileKind::Payload }

    pub fn is_manifest(self) -> bool {
        matches!(self, FileKind::PayloadManifest(_) | FileKind::TagManifest(_))
    }
}

pub fn is_payload(path: &str) -> bool { path.starts_with(PAYLOAD_PREFIX) }

pub fn classify(path: &str) -> FileKind {
    if is_payload(path) {
        return FileKind::Payload;
    }
    match path {
        DECLARATION => FileKind::Declaration,
        BAG_INFO => FileKind::Metadata,
        FETCH => FileKind::FetchManifest,
        FETCH_PROGRESS => FileKind::FetchProgress,
        _ => match parse_manifest_name(path) {
            Some((ManifestKind::Payload, alg)) => FileKind::PayloadManifest(alg),
            Some((ManifestKind::Tag, alg)) => FileKind::TagManifest(alg),
            None => FileKind::Plain,
        },
    }
}

/// `manifest-<alg>.txt` or `tagmanifest-<alg>.txt` at the top level of the bag.
pub fn parse_manifest_name(path: &str) -> Option<(ManifestKind, Algorithm)> {
    if path.contains('/') {
        return None;
    }
    let stem = path.strip_suffix(".txt")?;
    let (kind, alg) = if let Some(alg) = stem.strip_prefix("tagmanifest-") {
        (ManifestKind::Tag, alg)
    } else {
        (ManifestKind::Payload, stem.strip_prefix("manifest-")?)
    };
    // Only exact BagIt names here; `SHA-256` style names are not filenames.
    Algorithm::ALL
        .into_iter()
        .find(|a| a.bagit_name() == alg)
        .map(|a| (kind, a))
}

pub fn manifest_filename(kind: ManifestKind, algorithm: Algorithm) -> String {
    format!("{}{}.txt", kind.prefix(), algorithm.bagit_name())
}
