use std::io::Cursor;
use std::sync::Arc;

use bagit_fixity::Algorithm;
use indexmap::IndexMap;

use crate::classify::{manifest_filename, parse_manifest_name};
use crate::error::{CoreError, Result};
use crate::file::BagFile;

pub const DEFAULT_SEPARATOR: &str = "  ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManifestKind {
    Payload,
    Tag,
}

impl ManifestKind {
    pub fn prefix(self) -> &'static str {
        match self {
            ManifestKind::Payload => "manifest-",
            ManifestKind::Tag => "tagmanifest-",
        }
    }
}

#[derive(Debug, Clone)]
struct Original {
    bytes:       Arc<[u8]>,
    separator:   String,
    fingerprint: String,
}

/// Ordered `path -> hex digest` mapping.
///
/// Filename, kind and algorithm always agree: [`Manifest::new`] derives kind
/// and algorithm from the filename and [`Manifest::empty`] derives the
/// filename from them.
#[derive(Debug, Clone)]
pub struct Manifest {
    path:      String,
    kind:      ManifestKind,
    algorithm: Algorithm,
    separator: String,
    entries:   IndexMap<String, String>,
    original:  Option<Original>,
}

impl Manifest {
    /// An empty manifest named `path`.
    pub fn new(path: impl Into<String>) -> Result<Self> {
        let path = path.into();
        let (kind, algorithm) =
            parse_manifest_name(&path).ok_or_else(|| CoreError::NotAManifest(path.clone()))?;
        Ok(Self {
            path,
            kind,
            algorithm,
            separator: DEFAULT_SEPARATOR.to_string(),
            entries: IndexMap::new(),
            original: None,
        })
    }

    /// An empty manifest named `manifest-<alg>.txt` or
    /// `tagmanifest-<alg>.txt`.
    pub fn empty(kind: ManifestKind, algorithm: Algorithm) -> Self {
        Self {
            path: manifest_filename(kind, algorithm),
            kind,
            algorithm,
            separator: DEFAULT_SEPARATOR.to_string(),
            entries: IndexMap::new(),
            original: None,
        }
    }

    /// Parse manifest bytes. The first separator seen is kept for
    /// regeneration.
    pub fn parse(path: impl Into<String>, bytes: Arc<[u8]>) -> Result<Self> {
        let mut manifest = Self::new(path)?;
        let text = std::str::from_utf8(&bytes).map_err(|_| CoreError::Encoding(manifest.path.clone()))?;
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);

        let mut separator = None;
        for (idx, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let malformed = || CoreError::MalformedManifest {
                path: manifest.path.clone(),
                line: idx + 1,
                text: line.to_string(),
            };
            let split = line.find([' ', '\t']).ok_or_else(malformed)?;
            let (hex, rest) = line.split_at(split);
            let file = rest.trim_start_matches([' ', '\t']);
            if hex.is_empty() || file.is_empty() {
                return Err(malformed());
            }
            if file.contains('\\') {
                return Err(CoreError::Backslash {
                    path: manifest.path.clone(),
                    line: idx + 1,
                    file: file.to_string(),
                });
            }
            if separator.is_none() {
                separator = Some(rest[..rest.len() - file.len()].to_string());
            }
            manifest.entries.insert(file.to_string(), hex.to_ascii_lowercase());
        }

        if let Some(separator) = separator {
            manifest.separator = separator;
        }
        manifest.original = Some(Original {
            bytes,
            separator: manifest.separator.clone(),
            fingerprint: manifest.fingerprint(),
        });
        Ok(manifest)
    }

    pub fn from_bag_file(file: &BagFile) -> Result<Self> {
        let bytes = file.read_all().map_err(CoreError::io(file.path()))?;
        Self::parse(file.path(), Arc::from(bytes))
    }

    pub fn path(&self) -> &str { &self.path }

    pub fn kind(&self) -> ManifestKind { self.kind }

    pub fn algorithm(&self) -> Algorithm { self.algorithm }

    pub fn separator(&self) -> &str { &self.separator }

    pub fn set_separator(&mut self, separator: impl Into<String>) { self.separator = separator.into(); }

    pub fn get(&self, path: &str) -> Option<&str> { self.entries.get(path).map(String::as_str) }

    pub fn contains(&self, path: &str) -> bool { self.entries.contains_key(path) }

    pub fn insert(&mut self, path: impl Into<String>, hex: impl Into<String>) -> Option<String> {
        self.entries.insert(path.into(), hex.into().to_ascii_lowercase())
    }

    pub fn remove(&mut self, path: &str) -> Option<String> { self.entries.shift_remove(path) }

    pub fn retain(&mut self, mut keep: impl FnMut(&str, &str) -> bool) {
        self.entries.retain(|path, hex| keep(path, hex));
    }

    pub fn clear(&mut self) { self.entries.clear(); }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(p, h)| (p.as_str(), h.as_str()))
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> { self.entries.keys().map(String::as_str) }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// SHA-256 over the entries sorted by path. Independent of ordering and
    /// formatting, so two manifests with equal content share a fingerprint.
    pub fn fingerprint(&self) -> String {
        let mut sorted: Vec<_> = self.entries.iter().collect();
        sorted.sort();
        let mut canonical = Vec::new();
        for (path, hex) in sorted {
            canonical.extend_from_slice(path.as_bytes());
            canonical.push(0);
            canonical.extend_from_slice(hex.as_bytes());
            canonical.push(b'\n');
        }
        // Reading from memory cannot fail.
        bagit_fixity::digest(Cursor::new(canonical), Algorithm::Sha256).unwrap_or_default()
    }

    /// Whether the content still equals what was parsed.
    pub fn is_unchanged(&self) -> bool {
        self.original.as_ref().is_some_and(|o| {
            o.separator == self.separator && o.fingerprint == self.fingerprint()
        })
    }

    pub fn original_bytes(&self) -> Option<&Arc<[u8]>> { self.original.as_ref().map(|o| &o.bytes) }

    /// Serialized form. The parsed bytes are reused verbatim when the content
    /// is unchanged and `reuse_original` is set.
    pub fn to_bytes_with(&self, reuse_original: bool) -> Arc<[u8]> {
        if reuse_original && self.is_unchanged() {
            if let Some(original) = &self.original {
                return original.bytes.clone();
            }
        }
        let mut out = String::new();
        for (path, hex) in &self.entries {
            out.push_str(hex);
            out.push_str(&self.separator);
            out.push_str(path);
            out.push('\n');
        }
        Arc::from(out.into_bytes())
    }

    pub fn to_bytes(&self) -> Arc<[u8]> { self.to_bytes_with(true) }

    pub fn to_bag_file(&self) -> BagFile { BagFile::from_shared(self.path.clone(), self.to_bytes()) }
}

impl PartialEq for Manifest {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path && self.fingerprint() == other.fingerprint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn parse(name: &str, text: &str) -> Result<Manifest> { Manifest::parse(name, Arc::from(text.as_bytes())) }

    #[test]
    fn test_kind_and_algorithm_from_name() {
        let m = Manifest::new("tagmanifest-sha1.txt").unwrap();
        assert_eq!(m.kind(), ManifestKind::Tag);
        assert_eq!(m.algorithm(), Algorithm::Sha1);
        assert!(matches!(Manifest::new("manifest.txt"), Err(CoreError::NotAManifest(_))));
    }

    #[test]
    fn test_empty_manifest_name_agrees_with_kind() {
        let m = Manifest::empty(ManifestKind::Tag, Algorithm::Sha256);
        assert_eq!(m.path(), "tagmanifest-sha256.txt");
        let named = Manifest::new(m.path()).unwrap();
        assert_eq!((named.kind(), named.algorithm()), (m.kind(), m.algorithm()));
    }

    #[test]
    fn test_parse_preserves_order_and_separator() {
        let m = parse(
            "manifest-md5.txt",
            "900150983cd24fb0d6963f7d28e17f72\tdata/b.txt\nD41D8CD98F00B204E9800998ECF8427E\tdata/a b.txt\n",
        )
        .unwrap();
        let paths: Vec<_> = m.paths().collect();
        assert_eq!(paths, vec!["data/b.txt", "data/a b.txt"]);
        assert_eq!(m.separator(), "\t");
        assert_eq!(m.get("data/a b.txt"), Some("d41d8cd98f00b204e9800998ecf8427e"));
    }

    #[test]
    fn test_parse_rejects_backslash() {
        let err = parse("manifest-md5.txt", "abc  data\\windows.txt\n").unwrap_err();
        assert!(matches!(err, CoreError::Backslash { line: 1, .. }));
    }

    #[test]
    fn test_parse_rejects_malformed_line() {
        let err = parse("manifest-md5.txt", "abc  data/a.txt\njustonetoken\n").unwrap_err();
        assert!(matches!(err, CoreError::MalformedManifest { line: 2, .. }));
    }

    #[test]
    fn test_original_bytes_reused_until_changed() {
        let text = "900150983cd24fb0d6963f7d28e17f72    data/a.txt\r\n";
        let mut m = parse("manifest-md5.txt", text).unwrap();
        assert!(m.is_unchanged());
        assert_eq!(&*m.to_bytes(), text.as_bytes());

        // Same content written back in: still reused.
        m.insert("data/a.txt", "900150983CD24FB0D6963F7D28E17F72");
        assert_eq!(&*m.to_bytes(), text.as_bytes());

        m.insert("data/b.txt", "d41d8cd98f00b204e9800998ecf8427e");
        assert!(!m.is_unchanged());
        assert_eq!(
            &*m.to_bytes(),
            "900150983cd24fb0d6963f7d28e17f72    data/a.txt\nd41d8cd98f00b204e9800998ecf8427e    data/b.txt\n"
                .as_bytes()
        );
    }

    #[test]
    fn test_regenerate_ignores_original_when_asked() {
        let m = parse("manifest-md5.txt", "900150983cd24fb0d6963f7d28e17f72 data/a.txt\n").unwrap();
        assert_eq!(&*m.to_bytes_with(false), b"900150983cd24fb0d6963f7d28e17f72 data/a.txt\n");

        let mut m = m;
        m.set_separator("  ");
        assert!(!m.is_unchanged());
        assert_eq!(&*m.to_bytes(), b"900150983cd24fb0d6963f7d28e17f72  data/a.txt\n");
    }

    #[test]
    fn test_fingerprint_ignores_order() {
        let mut a = Manifest::empty(ManifestKind::Payload, Algorithm::Md5);
        a.insert("data/1", "aa");
        a.insert("data/2", "bb");
        let mut b = Manifest::empty(ManifestKind::Payload, Algorithm::Md5);
        b.insert("data/2", "bb");
        b.insert("data/1", "aa");
        assert_eq!(a, b);
        b.remove("data/1");
        assert_ne!(a, b);
    }

    proptest! {
        #[test]
        fn prop_serialized_manifest_parses_back(
            entries in proptest::collection::btree_map("data/[a-z0-9 ._-]{1,20}[a-z]", "[0-9a-f]{32}", 0..20)
        ) {
            let mut m = Manifest::empty(ManifestKind::Payload, Algorithm::Md5);
            for (path, hex) in &entries {
                m.insert(path.clone(), hex.clone());
            }
            let parsed = Manifest::parse(m.path(), m.to_bytes()).unwrap();
            prop_assert_eq!(parsed.len(), entries.len());
            for (path, hex) in &entries {
                prop_assert_eq!(parsed.get(path), Some(hex.as_str()));
            }
        }
    }
}
