use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::classify::DECLARATION;
use crate::error::{CoreError, Result};
use crate::file::BagFile;

const VERSION_KEY: &str = "BagIt-Version";
const ENCODING_KEY: &str = "Tag-File-Character-Encoding";
pub const UTF8: &str = "UTF-8";

/// A `M.N` BagIt version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
}

impl Version {
    pub const V0_93: Version = Version::new(0, 93);
    pub const V0_94: Version = Version::new(0, 94);
    pub const V0_95: Version = Version::new(0, 95);
    pub const V0_96: Version = Version::new(0, 96);
    pub const V0_97: Version = Version::new(0, 97);
    pub const V1_0: Version = Version::new(1, 0);

    pub const KNOWN: [Version; 6] = [
        Version::V0_93,
        Version::V0_94,
        Version::V0_95,
        Version::V0_96,
        Version::V0_97,
        Version::V1_0,
    ];

    pub const fn new(major: u32, minor: u32) -> Self { Self { major, minor } }

    pub fn is_known(self) -> bool { Self::KNOWN.contains(&self) }
}

impl Default for Version {
    fn default() -> Self { Version::V0_97 }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}.{}", self.major, self.minor) }
}

impl FromStr for Version {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || CoreError::InvalidVersion(s.to_string());
        let (major, minor) = s.trim().split_once('.').ok_or_else(invalid)?;
        Ok(Version {
            major: major.parse().map_err(|_| invalid())?,
            minor: minor.parse().map_err(|_| invalid())?,
        })
    }
}

/// `bagit.txt`.
#[derive(Debug, Clone)]
pub struct Declaration {
    pub version:  Version,
    pub encoding: String,
    original:     Option<(Version, String, Arc<[u8]>)>,
}

impl Declaration {
    pub fn new(version: Version) -> Self {
        Self {
            version,
            encoding: UTF8.to_string(),
            original: None,
        }
    }

    /// Parse `bagit.txt`. A byte-order mark is rejected.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
            return Err(CoreError::ByteOrderMark {
                path: DECLARATION.to_string(),
            });
        }
        let malformed = |reason: String| CoreError::MalformedDeclaration {
            path: DECLARATION.to_string(),
            reason,
        };
        let text = std::str::from_utf8(bytes).map_err(|_| CoreError::Encoding(DECLARATION.to_string()))?;

        let mut version = None;
        let mut encoding = None;
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            let (key, value) = line
                .split_once(':')
                .ok_or_else(|| malformed(format!("unexpected line {line:?}")))?;
            match key.trim() {
                VERSION_KEY => {
                    version = Some(
                        value
                            .parse::<Version>()
                            .map_err(|_| malformed(format!("invalid version {:?}", value.trim())))?,
                    )
                }
                ENCODING_KEY => encoding = Some(value.trim().to_string()),
                other => return Err(malformed(format!("unexpected key {other:?}"))),
            }
        }

        let version = version.ok_or_else(|| malformed(format!("missing {VERSION_KEY}")))?;
        let encoding = encoding.ok_or_else(|| malformed(format!("missing {ENCODING_KEY}")))?;
        Ok(Self {
            original: Some((version, encoding.clone(), Arc::from(bytes))),
            version,
            encoding,
        })
    }

    pub fn from_bag_file(file: &BagFile) -> Result<Self> {
        let bytes = file.read_all().map_err(CoreError::io(file.path()))?;
        Self::parse(&bytes)
    }

    /// The parsed bytes while version and encoding are unchanged, otherwise the
    /// canonical two lines.
    pub fn to_bytes(&self) -> Vec<u8> {
        if let Some((version, encoding, bytes)) = &self.original {
            if *version == self.version && *encoding == self.encoding {
                return bytes.to_vec();
            }
        }
        format!("{VERSION_KEY}: {}\n{ENCODING_KEY}: {}\n", self.version, self.encoding).into_bytes()
    }

    pub fn to_bag_file(&self) -> BagFile { BagFile::from_shared(DECLARATION, Arc::from(self.to_bytes())) }
}

impl PartialEq for Declaration {
    fn eq(&self, other: &Self) -> bool { self.version == other.version && self.encoding == other.encoding }
}

impl Eq for Declaration {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let declaration = Declaration::new(Version::V1_0);
        assert_eq!(
            declaration.to_bytes(),
            b"BagIt-Version: 1.0\nTag-File-Character-Encoding: UTF-8\n"
        );
        assert_eq!(Declaration::parse(&declaration.to_bytes()).unwrap(), declaration);
    }

    #[test]
    fn test_rejects_bom() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice(b"BagIt-Version: 0.97\r\nTag-File-Character-Encoding: UTF-8\r\n");
        assert!(matches!(Declaration::parse(&bytes), Err(CoreError::ByteOrderMark { .. })));
        let parsed = Declaration::parse(&bytes[3..]).unwrap();
        assert_eq!(parsed.version, Version::V0_97);
        assert_eq!(parsed.to_bytes(), &bytes[3..]);

        let mut upgraded = parsed;
        upgraded.version = Version::V1_0;
        assert_eq!(upgraded.to_bytes(), b"BagIt-Version: 1.0\nTag-File-Character-Encoding: UTF-8\n");
    }

    #[test]
    fn test_rejects_missing_and_unknown_lines() {
        assert!(matches!(
            Declaration::parse(b"BagIt-Version: 0.97\n"),
            Err(CoreError::MalformedDeclaration { .. })
        ));
        assert!(matches!(
            Declaration::parse(b"BagIt-Version: 0.97\nTag-File-Character-Encoding: UTF-8\nExtra: 1\n"),
            Err(CoreError::MalformedDeclaration { .. })
        ));
        assert!(matches!(
            Declaration::parse(b"BagIt-Version: x\nTag-File-Character-Encoding: UTF-8\n"),
            Err(CoreError::MalformedDeclaration { .. })
        ));
    }

    #[test]
    fn test_version_parse_and_display() {
        let version: Version = "0.96".parse().unwrap();
        assert_eq!(version, Version::V0_96);
        assert_eq!(version.to_string(), "0.96");
        assert!(version.is_known());
        assert!(!Version::new(2, 0).is_known());
        assert!("1".parse::<Version>().is_err());
    }
}
