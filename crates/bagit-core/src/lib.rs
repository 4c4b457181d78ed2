//! The BagIt data model.
//!
//! A [`Bag`] is a snapshot of payload files under `data/` and tag files at or
//! below the bag root. Tag files with a well-known name are parsed once, when
//! they are put into the bag, and kept in typed form:
//!
//! - [`Manifest`]: `manifest-<alg>.txt` and `tagmanifest-<alg>.txt`
//! - [`Declaration`]: `bagit.txt`
//! - [`BagInfo`]: `bag-info.txt`
//! - [`FetchManifest`]: `fetch.txt` and the `fetch-progress.txt` ledger
//!
//! Every file is a [`BagFile`]: a path plus a lazily read [`Source`]. Bags are
//! read from disk with a [`Loader`] and written back with a [`Writer`].
//!
//! # Example
//!
//! ```
//! use bagit_core::{Algorithm, Bag, BagFile, Manifest, ManifestKind, Version};
//!
//! let mut bag = Bag::new(Version::V0_97);
//! bag.put(BagFile::from_bytes("data/hello.txt", b"hello")).unwrap();
//!
//! let mut manifest = Manifest::empty(ManifestKind::Payload, Algorithm::Md5);
//! manifest.insert("data/hello.txt", "5d41402abc4b2a76b9719d911017c592");
//! bag.put_manifest(manifest);
//!
//! assert_eq!(bag.payload_oxum().to_string(), "5.1");
//! ```

pub use bagit_fixity::Algorithm;

pub use self::bag::Bag;
pub use self::classify::{
    BAG_INFO, DATA_DIR, DECLARATION, FETCH, FETCH_PROGRESS, FileKind, PAYLOAD_PREFIX, classify, is_payload,
    manifest_filename, parse_manifest_name,
};
pub use self::declaration::{Declaration, UTF8, Version};
pub use self::error::{CoreError, Result};
pub use self::fetch::{FetchItem, FetchManifest, FetchStatus};
pub use self::file::{BagFile, FileSource, MemorySource, MissingSource, Source};
pub use self::info::{
    BAG_COUNT, BAG_GROUP_IDENTIFIER, BAG_SIZE, BAGGING_DATE, BagInfo, EXTERNAL_IDENTIFIER, Oxum, PAYLOAD_OXUM,
    SOURCE_ORGANIZATION, human_size,
};
pub use self::load::{LoadMode, Loader, load, relative_path};
pub use self::manifest::{DEFAULT_SEPARATOR, Manifest, ManifestKind};
pub use self::tag::TagFile;
pub use self::write::{Writer, remove_tag, write_tag};

mod bag;
mod classify;
mod declaration;
mod error;
mod fetch;
mod file;
mod info;
mod load;
mod manifest;
mod tag;
mod write;
