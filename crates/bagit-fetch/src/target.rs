use std::cmp::Reverse;

use bagit_core::{FetchItem, FetchManifest, FetchStatus};

/// One file to fetch, with every URL it can be fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTarget {
    pub path:    String,
    pub size:    Option<u64>,
    pub sources: Vec<String>,
}

impl FetchTarget {
    fn from_item(item: &FetchItem) -> Self {
        Self {
            path:    item.path.clone(),
            size:    item.size,
            sources: vec![item.url.clone()],
        }
    }

    fn add(&mut self, item: &FetchItem) {
        if !self.sources.contains(&item.url) {
            self.sources.push(item.url.clone());
        }
        self.size = self.size.max(item.size);
    }
}

/// Group fetch entries by path. With `resume`, paths the ledger marks
/// `SUCCEEDED` are left out.
///
/// Largest targets come first so long transfers start early; unknown sizes go
/// last and ties are ordered by path.
pub fn plan(fetch: &FetchManifest, ledger: Option<&FetchManifest>, resume: bool) -> Vec<FetchTarget> {
    let mut targets: Vec<FetchTarget> = Vec::new();
    for item in fetch.items() {
        match targets.iter_mut().find(|t| t.path == item.path) {
            Some(target) => target.add(item),
            None => targets.push(FetchTarget::from_item(item)),
        }
    }
    if resume {
        if let Some(ledger) = ledger {
            targets.retain(|t| {
                !ledger
                    .items_for(&t.path)
                    .any(|i| i.status == Some(FetchStatus::Succeeded))
            });
        }
    }
    targets.sort_by(|a, b| {
        let key = |t: &FetchTarget| (t.size.is_none(), Reverse(t.size));
        key(a).cmp(&key(b)).then_with(|| a.path.cmp(&b.path))
    });
    targets
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(items: &[(&str, Option<u64>, &str)]) -> FetchManifest {
        let mut fetch = FetchManifest::new();
        for (path, size, url) in items {
            fetch.push(FetchItem::new(*path, *size, *url));
        }
        fetch
    }

    #[test]
    fn test_group_and_order() {
        let fetch = manifest(&[
            ("data/small", Some(1), "http://a/small"),
            ("data/unknown", None, "http://a/unknown"),
            ("data/big", Some(100), "http://a/big"),
            ("data/small", Some(1), "http://mirror/small"),
            ("data/also-small", Some(1), "http://a/also-small"),
        ]);
        let targets = plan(&fetch, None, false);
        let paths: Vec<_> = targets.iter().map(|t| t.path.as_str()).collect();
        assert_eq!(paths, vec!["data/big", "data/also-small", "data/small", "data/unknown"]);
        assert_eq!(targets[2].sources, vec!["http://a/small", "http://mirror/small"]);
    }

    #[test]
    fn test_resume_skips_succeeded() {
        let fetch = manifest(&[("data/a", Some(1), "http://a/a"), ("data/b", Some(1), "http://a/b")]);
        let mut ledger = FetchManifest::ledger();
        ledger.push(FetchItem::new("data/a", Some(1), "http://a/a").with_status(FetchStatus::Succeeded));
        ledger.push(FetchItem::new("data/b", Some(1), "http://a/b").with_status(FetchStatus::FetchFailed));

        let resumed = plan(&fetch, Some(&ledger), true);
        assert_eq!(resumed.len(), 1);
        assert_eq!(resumed[0].path, "data/b");
        assert_eq!(plan(&fetch, Some(&ledger), false).len(), 2);
    }
}
