use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::NaiveDate;

use crate::classify::BAG_INFO;
use crate::error::{CoreError, Result};
use crate::file::BagFile;

pub const PAYLOAD_OXUM: &str = "Payload-Oxum";
pub const BAGGING_DATE: &str = "Bagging-Date";
pub const BAG_SIZE: &str = "Bag-Size";
pub const SOURCE_ORGANIZATION: &str = "Source-Organization";
pub const EXTERNAL_IDENTIFIER: &str = "External-Identifier";
pub const BAG_GROUP_IDENTIFIER: &str = "Bag-Group-Identifier";
pub const BAG_COUNT: &str = "Bag-Count";

const LINE_LENGTH: usize = 79;
const INDENT: &str = "   ";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Octet count and stream count of a payload: `<bytes>.<files>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Oxum {
    pub octets:  u64,
    pub streams: u64,
}

impl fmt::Display for Oxum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}.{}", self.octets, self.streams) }
}

impl FromStr for Oxum {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (octets, streams) = s.trim().split_once('.').ok_or(())?;
        Ok(Oxum {
            octets:  octets.parse().map_err(|_| ())?,
            streams: streams.parse().map_err(|_| ())?,
        })
    }
}

/// `bag-info.txt`: ordered, repeatable, case-insensitive `Key: Value` pairs.
///
/// Parsed bytes are written back verbatim for as long as the entries are
/// unchanged, so tag manifest checksums of untouched files stay valid.
#[derive(Debug, Clone, Default)]
pub struct BagInfo {
    entries:  Vec<(String, String)>,
    original: Option<Parsed>,
}

#[derive(Debug, Clone)]
struct Parsed {
    entries: Vec<(String, String)>,
    bytes:   Arc<[u8]>,
}

impl BagInfo {
    pub fn new() -> Self { Self::default() }

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes).map_err(|_| CoreError::Encoding(BAG_INFO.to_string()))?;
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);

        let mut entries: Vec<(String, String)> = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            if line.starts_with([' ', '\t']) {
                match entries.last_mut() {
                    Some((_, value)) => {
                        if !value.is_empty() {
                            value.push(' ');
                        }
                        value.push_str(line.trim());
                        continue;
                    }
                    None => {
                        return Err(CoreError::MalformedInfo {
                            path: BAG_INFO.to_string(),
                            line: idx + 1,
                            text: line.to_string(),
                        });
                    }
                }
            }
            let (key, value) = line.split_once(':').ok_or_else(|| CoreError::MalformedInfo {
                path: BAG_INFO.to_string(),
                line: idx + 1,
                text: line.to_string(),
            })?;
            entries.push((key.trim().to_string(), value.trim().to_string()));
        }
        Ok(Self {
            original: Some(Parsed {
                entries: entries.clone(),
                bytes:   Arc::from(bytes),
            }),
            entries,
        })
    }

    pub fn from_bag_file(file: &BagFile) -> Result<Self> {
        let bytes = file.read_all().map_err(CoreError::io(file.path()))?;
        Self::parse(&bytes)
    }

    /// First value for `key`, compared case-insensitively.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool { self.get(key).is_some() }

    /// Replace the first value for `key`, or append when absent.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(key)) {
            Some((_, v)) => *v = value,
            None => self.entries.push((key.to_string(), value)),
        }
    }

    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.push((key.into(), value.into()));
    }

    /// Removes every value for `key`.
    pub fn remove(&mut self, key: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(k, _)| !k.eq_ignore_ascii_case(key));
        before - self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn payload_oxum(&self) -> Option<Oxum> { self.get(PAYLOAD_OXUM)?.parse().ok() }

    pub fn set_payload_oxum(&mut self, oxum: Oxum) { self.set(PAYLOAD_OXUM, oxum.to_string()); }

    pub fn bagging_date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(self.get(BAGGING_DATE)?, DATE_FORMAT).ok()
    }

    pub fn set_bagging_date(&mut self, date: NaiveDate) {
        self.set(BAGGING_DATE, date.format(DATE_FORMAT).to_string());
    }

    pub fn bag_size(&self) -> Option<&str> { self.get(BAG_SIZE) }

    pub fn set_bag_size(&mut self, size: impl Into<String>) { self.set(BAG_SIZE, size); }

    pub fn to_bytes(&self) -> Vec<u8> {
        if let Some(original) = self.original.as_ref().filter(|o| o.entries == self.entries) {
            return original.bytes.to_vec();
        }
        let mut out = String::new();
        for (key, value) in &self.entries {
            write_folded(&mut out, key, value);
        }
        out.into_bytes()
    }

    pub fn to_bag_file(&self) -> BagFile { BagFile::from_shared(BAG_INFO, Arc::from(self.to_bytes())) }
}

impl PartialEq for BagInfo {
    fn eq(&self, other: &Self) -> bool { self.entries == other.entries }
}

impl Eq for BagInfo {}

/// Write `key: value`, folding on spaces so that no line exceeds
/// [`LINE_LENGTH`] unless a single word is longer.
fn write_folded(out: &mut String, key: &str, value: &str) {
    let value = value.replace("\r\n", "\n").replace('\r', "\n");
    let line = format!("{key}: {value}");
    let mut first = true;
    for segment in line.split('\n') {
        let mut rest = segment;
        loop {
            // Never break inside the `key: ` prefix.
            let (width, min_break) = if first {
                (LINE_LENGTH, key.len() + 1)
            } else {
                (LINE_LENGTH - INDENT.len(), 0)
            };
            let (part, remainder) = split_at_width(rest, width, min_break);
            if !first {
                out.push_str(INDENT);
            }
            out.push_str(part);
            out.push('\n');
            first = false;
            match remainder {
                Some(r) if !r.is_empty() => rest = r,
                _ => break,
            }
        }
    }
}

fn split_at_width(s: &str, width: usize, min_break: usize) -> (&str, Option<&str>) {
    if s.chars().count() <= width {
        return (s, None);
    }
    // Byte offset just past the char at index `width`; a space there still
    // allows a break.
    let limit = s.char_indices().nth(width + 1).map_or(s.len(), |(i, _)| i);
    match s[..limit].rfind(' ') {
        Some(i) if i > min_break => (&s[..i], Some(&s[i + 1..])),
        _ => (s, None),
    }
}

/// Human readable size: bytes below 1 KB, otherwise KB/MB/GB/TB (base 1024)
/// with one decimal place and a trailing `.0` dropped.
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{bytes} bytes");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = format!("{value:.1}");
    let rounded = rounded.strip_suffix(".0").unwrap_or(&rounded);
    format!("{} {}", rounded, UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_first_wins() {
        let info = BagInfo::parse(b"Contact-Name: Ada\ncontact-name: Grace\nPayload-Oxum: 8.2\n").unwrap();
        assert_eq!(info.get("CONTACT-NAME"), Some("Ada"));
        assert_eq!(info.get_all("Contact-Name").collect::<Vec<_>>(), vec!["Ada", "Grace"]);
        assert_eq!(info.payload_oxum(), Some(Oxum { octets: 8, streams: 2 }));
    }

    #[test]
    fn test_continuation_lines() {
        let info = BagInfo::parse(b"External-Description: first part\n   second part\n\tthird\nBag-Count: 1 of 2\n")
            .unwrap();
        assert_eq!(info.get("External-Description"), Some("first part second part third"));
        assert_eq!(info.get(BAG_COUNT), Some("1 of 2"));
        assert!(matches!(BagInfo::parse(b"  dangling\n"), Err(CoreError::MalformedInfo { line: 1, .. })));
        assert!(matches!(BagInfo::parse(b"no colon here\n"), Err(CoreError::MalformedInfo { .. })));
    }

    #[test]
    fn test_set_replaces_first_and_remove_drops_all() {
        let mut info = BagInfo::new();
        info.append("Note", "a");
        info.append("note", "b");
        info.set("NOTE", "c");
        assert_eq!(info.get_all("note").collect::<Vec<_>>(), vec!["c", "b"]);
        assert_eq!(info.remove("Note"), 2);
        assert!(info.is_empty());
    }

    #[test]
    fn test_long_values_fold_and_parse_back() {
        let words: Vec<String> = (0..40).map(|i| format!("word{i}")).collect();
        let value = words.join(" ");
        let mut info = BagInfo::new();
        info.set("External-Description", value.clone());

        let bytes = info.to_bytes();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.lines().count() > 1);
        assert!(text.lines().all(|l| l.len() <= LINE_LENGTH));
        assert!(text.lines().skip(1).all(|l| l.starts_with(INDENT)));

        let parsed = BagInfo::parse(&bytes).unwrap();
        assert_eq!(parsed.get("External-Description"), Some(value.as_str()));
    }

    #[test]
    fn test_unbreakable_value_is_kept_whole() {
        let value = "x".repeat(200);
        let mut info = BagInfo::new();
        info.set("Key", value.clone());
        let text = String::from_utf8(info.to_bytes()).unwrap();
        assert_eq!(text, format!("Key: {value}\n"));
    }

    #[test]
    fn test_unchanged_info_keeps_its_bytes() {
        let text = b"Source-Organization: Example\r\nExternal-Description: one\n  two\r\n";
        let mut info = BagInfo::parse(text).unwrap();
        assert_eq!(info.to_bytes(), text);

        info.set("Bag-Count", "1 of 1");
        assert_eq!(
            String::from_utf8(info.to_bytes()).unwrap(),
            "Source-Organization: Example\nExternal-Description: one two\nBag-Count: 1 of 1\n"
        );
    }

    #[test]
    fn test_bagging_date() {
        let mut info = BagInfo::new();
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        info.set_bagging_date(date);
        assert_eq!(info.get(BAGGING_DATE), Some("2024-03-09"));
        assert_eq!(info.bagging_date(), Some(date));
    }

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(0), "0 bytes");
        assert_eq!(human_size(1023), "1023 bytes");
        assert_eq!(human_size(1024), "1 KB");
        assert_eq!(human_size(1536), "1.5 KB");
        assert_eq!(human_size(2 * 1024 * 1024), "2 MB");
        assert_eq!(human_size(5 * 1024 * 1024 * 1024 * 1024 * 1024), "5120 TB");
    }
}
