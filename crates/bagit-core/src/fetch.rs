use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::classify::{FETCH, FETCH_PROGRESS};
use crate::error::{CoreError, Result};
use crate::file::BagFile;

const NO_SIZE: &str = "-";

/// Last known state of one fetch entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchStatus {
    NotFetched,
    FetchFailed,
    VerifyFailed,
    Succeeded,
}

impl FetchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FetchStatus::NotFetched => "NOT_FETCHED",
            FetchStatus::FetchFailed => "FETCH_FAILED",
            FetchStatus::VerifyFailed => "VERIFY_FAILED",
            FetchStatus::Succeeded => "SUCCEEDED",
        }
    }
}

impl fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for FetchStatus {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "NOT_FETCHED" => Ok(FetchStatus::NotFetched),
            "FETCH_FAILED" => Ok(FetchStatus::FetchFailed),
            "VERIFY_FAILED" => Ok(FetchStatus::VerifyFailed),
            "SUCCEEDED" => Ok(FetchStatus::Succeeded),
            _ => Err(()),
        }
    }
}

/// One line of `fetch.txt`. Identity is `(path, url)`.
#[derive(Debug, Clone)]
pub struct FetchItem {
    pub path:   String,
    pub size:   Option<u64>,
    pub url:    String,
    pub status: Option<FetchStatus>,
}

impl FetchItem {
    pub fn new(path: impl Into<String>, size: Option<u64>, url: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            size,
            url: url.into(),
            status: None,
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: FetchStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn same_target(&self, other: &FetchItem) -> bool { self.path == other.path && self.url == other.url }

    fn same_line(&self, other: &FetchItem) -> bool {
        self.same_target(other) && self.size == other.size && self.status == other.status
    }
}

impl PartialEq for FetchItem {
    fn eq(&self, other: &Self) -> bool { self.same_target(other) }
}

impl Eq for FetchItem {}

/// `fetch.txt`, or the `fetch-progress.txt` ledger which shares its format
/// and always records a status.
#[derive(Debug, Clone)]
pub struct FetchManifest {
    path:     String,
    items:    Vec<FetchItem>,
    original: Option<(Vec<FetchItem>, Arc<[u8]>)>,
}

impl FetchManifest {
    pub fn new() -> Self {
        Self {
            path:     FETCH.to_string(),
            items:    Vec::new(),
            original: None,
        }
    }

    pub fn ledger() -> Self {
        Self {
            path:     FETCH_PROGRESS.to_string(),
            items:    Vec::new(),
            original: None,
        }
    }

    pub fn is_ledger(&self) -> bool { self.path == FETCH_PROGRESS }

    /// The same items as a progress ledger.
    pub fn into_ledger(self) -> Self {
        if self.is_ledger() {
            return self;
        }
        Self {
            path:     FETCH_PROGRESS.to_string(),
            items:    self.items,
            original: None,
        }
    }

    pub fn parse(path: impl Into<String>, bytes: &[u8]) -> Result<Self> {
        let path = path.into();
        let text = std::str::from_utf8(bytes).map_err(|_| CoreError::Encoding(path.clone()))?;
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);

        let mut items = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            items.push(parse_line(&path, idx + 1, line)?);
        }
        Ok(Self {
            path,
            original: Some((items.clone(), Arc::from(bytes))),
            items,
        })
    }

    pub fn from_bag_file(file: &BagFile) -> Result<Self> {
        let bytes = file.read_all().map_err(CoreError::io(file.path()))?;
        Self::parse(file.path(), &bytes)
    }

    pub fn path(&self) -> &str { &self.path }

    pub fn items(&self) -> &[FetchItem] { &self.items }

    pub fn len(&self) -> usize { self.items.len() }

    pub fn is_empty(&self) -> bool { self.items.is_empty() }

    /// Adds an item, replacing any existing item for the same `(path, url)`.
    pub fn push(&mut self, item: FetchItem) {
        match self.items.iter_mut().find(|i| i.same_target(&item)) {
            Some(existing) => *existing = item,
            None => self.items.push(item),
        }
    }

    pub fn find(&self, path: &str, url: &str) -> Option<&FetchItem> {
        self.items.iter().find(|i| i.path == path && i.url == url)
    }

    pub fn items_for<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a FetchItem> + 'a {
        self.items.iter().filter(move |i| i.path == path)
    }

    /// Returns false when no item matches.
    pub fn set_status(&mut self, path: &str, url: &str, status: FetchStatus) -> bool {
        match self.items.iter_mut().find(|i| i.path == path && i.url == url) {
            Some(item) => {
                item.status = Some(status);
                true
            }
            None => false,
        }
    }

    pub fn remove_path(&mut self, path: &str) -> usize {
        let before = self.items.len();
        self.items.retain(|i| i.path != path);
        before - self.items.len()
    }

    fn is_unchanged(&self) -> bool {
        self.original.as_ref().is_some_and(|(items, _)| {
            items.len() == self.items.len() && items.iter().zip(&self.items).all(|(a, b)| a.same_line(b))
        })
    }

    /// The parsed bytes while no item changed, otherwise regenerated lines.
    pub fn to_bytes(&self) -> Vec<u8> {
        if let Some((_, bytes)) = self.original.as_ref().filter(|_| self.is_unchanged()) {
            return bytes.to_vec();
        }
        let mut out = String::new();
        for item in &self.items {
            out.push_str(&item.url.replace(' ', "%20"));
            out.push_str("  ");
            match item.size {
                Some(size) => out.push_str(&size.to_string()),
                None => out.push_str(NO_SIZE),
            }
            out.push_str("  ");
            let status = match item.status {
                Some(status) => Some(status),
                None if self.is_ledger() => Some(FetchStatus::NotFetched),
                None => None,
            };
            if let Some(status) = status {
                out.push_str(status.as_str());
                out.push_str("  ");
            }
            out.push_str(&item.path);
            out.push('\n');
        }
        out.into_bytes()
    }

    pub fn to_bag_file(&self) -> BagFile { BagFile::from_shared(self.path.clone(), Arc::from(self.to_bytes())) }
}

impl PartialEq for FetchManifest {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
            && self.items.len() == other.items.len()
            && self.items.iter().zip(&other.items).all(|(a, b)| a.same_line(b))
    }
}

impl Default for FetchManifest {
    fn default() -> Self { Self::new() }
}

/// Split off the first whitespace-delimited field.
fn next_field(s: &str) -> Option<(&str, &str)> {
    let s = s.trim_start_matches([' ', '\t']);
    let end = s.find([' ', '\t'])?;
    Some((&s[..end], s[end..].trim_start_matches([' ', '\t'])))
}

fn parse_line(path: &str, line_no: usize, line: &str) -> Result<FetchItem> {
    let malformed = || CoreError::MalformedFetch {
        path: path.to_string(),
        line: line_no,
        text: line.to_string(),
    };
    let (url, rest) = next_field(line).ok_or_else(malformed)?;
    let (size, rest) = next_field(rest).ok_or_else(malformed)?;
    let size = match size {
        NO_SIZE => None,
        n => Some(n.parse::<u64>().map_err(|_| malformed())?),
    };
    let (status, file) = match next_field(rest) {
        Some((token, file)) => match token.parse::<FetchStatus>() {
            Ok(status) if !file.is_empty() => (Some(status), file),
            _ => (None, rest),
        },
        None => (None, rest),
    };
    if file.is_empty() {
        return Err(malformed());
    }
    if file.contains('\\') {
        return Err(CoreError::Backslash {
            path: path.to_string(),
            line: line_no,
            file: file.to_string(),
        });
    }
    Ok(FetchItem {
        path: file.to_string(),
        size,
        url: url.to_string(),
        status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_with_and_without_status() {
        let text = "http://example.org/bag/data/a.txt  5  data/a.txt\n\
                    http://example.org/bag/data/b%20c.txt\t-\tFETCH_FAILED\tdata/b c.txt\n";
        let fetch = FetchManifest::parse("fetch.txt", text.as_bytes()).unwrap();
        assert_eq!(fetch.len(), 2);

        let a = &fetch.items()[0];
        assert_eq!(a.path, "data/a.txt");
        assert_eq!(a.size, Some(5));
        assert_eq!(a.status, None);

        let b = &fetch.items()[1];
        assert_eq!(b.path, "data/b c.txt");
        assert_eq!(b.size, None);
        assert_eq!(b.status, Some(FetchStatus::FetchFailed));
    }

    #[test]
    fn test_write_encodes_spaces_and_ledger_status() {
        let mut ledger = FetchManifest::ledger();
        ledger.push(FetchItem::new("data/x y.txt", None, "http://h/x y.txt"));
        assert_eq!(
            String::from_utf8(ledger.to_bytes()).unwrap(),
            "http://h/x%20y.txt  -  NOT_FETCHED  data/x y.txt\n"
        );
    }

    #[test]
    fn test_identity_is_path_and_url() {
        let mut fetch = FetchManifest::new();
        fetch.push(FetchItem::new("data/a", Some(1), "http://one/a"));
        fetch.push(FetchItem::new("data/a", Some(1), "http://two/a"));
        fetch.push(FetchItem::new("data/a", Some(2), "http://one/a").with_status(FetchStatus::Succeeded));
        assert_eq!(fetch.len(), 2);
        assert_eq!(fetch.find("data/a", "http://one/a").unwrap().size, Some(2));
        assert_eq!(fetch.items_for("data/a").count(), 2);

        assert!(fetch.set_status("data/a", "http://two/a", FetchStatus::VerifyFailed));
        assert!(!fetch.set_status("data/b", "http://two/a", FetchStatus::VerifyFailed));
        assert_eq!(fetch.remove_path("data/a"), 2);
    }

    #[test]
    fn test_malformed_lines() {
        for text in ["http://h/a", "http://h/a  notanumber  data/a", "http://h/a  5  "] {
            assert!(
                matches!(FetchManifest::parse("fetch.txt", text.as_bytes()), Err(CoreError::MalformedFetch { .. })),
                "{text:?}"
            );
        }
        assert!(matches!(
            FetchManifest::parse("fetch.txt", b"http://h/a  5  data\\a"),
            Err(CoreError::Backslash { .. })
        ));
    }

    #[test]
    fn test_path_named_like_status_is_a_path() {
        let fetch = FetchManifest::parse("fetch.txt", b"http://h/a  5  SUCCEEDED").unwrap();
        assert_eq!(fetch.items()[0].path, "SUCCEEDED");
        assert_eq!(fetch.items()[0].status, None);
    }

    proptest! {
        #[test]
        fn prop_ledger_lines_parse_back(
            size in proptest::option::of(0u64..u64::MAX),
            name in "[a-z][a-z0-9 _.-]{0,15}[a-z]",
            status in prop_oneof![
                Just(FetchStatus::NotFetched),
                Just(FetchStatus::FetchFailed),
                Just(FetchStatus::VerifyFailed),
                Just(FetchStatus::Succeeded),
            ],
        ) {
            let mut ledger = FetchManifest::ledger();
            let path = format!("data/{name}");
            ledger.push(FetchItem::new(path.clone(), size, format!("http://h/{}", name.replace(' ', "%20"))).with_status(status));
            let parsed = FetchManifest::parse("fetch-progress.txt", &ledger.to_bytes()).unwrap();
            let item = &parsed.items()[0];
            prop_assert_eq!(&item.path, &path);
            prop_assert_eq!(item.size, size);
            prop_assert_eq!(item.status, Some(status));
        }
    }
}
