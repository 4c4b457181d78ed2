//! Turning a materialized bag into a holey one.

use bagit_core::{Bag, BagFile, FetchItem, FetchManifest, FileKind, PAYLOAD_PREFIX, TagFile, classify};
use url::Url;

use crate::error::{PipelineError, Result};
use crate::result::VerifyResult;

/// What happens to plain tag files when a bag is made holey.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TagMode {
    /// Tags stay in the bag and are not advertised.
    #[default]
    Keep,
    /// Tags are advertised in the fetch manifest and removed from the bag.
    Move,
    /// Tags stay in the bag and are also advertised.
    CopyAndAdvertise,
}

impl TagMode {
    fn advertises(self) -> bool { self != TagMode::Keep }

    fn keeps(self) -> bool { self != TagMode::Move }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Start,
    Tags,
    Payload,
    End,
}

/// Replaces payload files with fetch manifest entries pointing below a base
/// URL.
#[derive(Debug, Clone)]
pub struct HolePuncher {
    base_url:                  Url,
    include_payload_directory: bool,
    tag_mode:                  TagMode,
    resume:                    Option<VerifyResult>,
}

impl HolePuncher {
    /// Fails when `base_url` does not parse or cannot carry a path.
    pub fn new(base_url: &str) -> Result<Self> {
        let invalid = |reason: String| PipelineError::BaseUrl {
            url: base_url.to_string(),
            reason,
        };
        let url = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
        if url.cannot_be_a_base() {
            return Err(invalid("URL cannot have a path".to_string()));
        }
        Ok(Self {
            base_url:                  url,
            include_payload_directory: true,
            tag_mode:                  TagMode::Keep,
            resume:                    None,
        })
    }

    /// Keep the `data/` segment in payload URLs. Always on when tags are
    /// advertised, so tag and payload URLs cannot collide.
    #[must_use]
    pub fn include_payload_directory(mut self, include: bool) -> Self {
        self.include_payload_directory = include;
        self
    }

    #[must_use]
    pub fn tag_mode(mut self, mode: TagMode) -> Self {
        self.tag_mode = mode;
        self
    }

    /// Only punch files that `result` reports missing or invalid; everything
    /// else stays in the bag.
    #[must_use]
    pub fn resume(mut self, result: VerifyResult) -> Self {
        self.resume = Some(result);
        self
    }

    /// URL of the bag-relative `path`.
    pub fn url_for(&self, path: &str) -> String {
        let relative = match path.strip_prefix(PAYLOAD_PREFIX) {
            Some(rest) if !self.payload_directory_in_url() => rest,
            _ => path,
        };
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(relative.split('/'));
        }
        url.into()
    }

    fn payload_directory_in_url(&self) -> bool { self.include_payload_directory || self.tag_mode.advertises() }

    fn skipped(&self, path: &str) -> bool {
        self.resume.as_ref().is_some_and(|r| !r.is_missing_or_invalid(path))
    }

    fn item(&self, file: &BagFile) -> FetchItem {
        let size = file.exists().then(|| file.size());
        FetchItem::new(file.path(), size, self.url_for(file.path()))
    }

    /// A new bag holding the fetch manifest, the retained tags and any payload
    /// skipped while resuming.
    pub fn make_holey(&self, bag: &Bag) -> Result<Bag> {
        tracing::info!(base = %self.base_url, mode = ?self.tag_mode, "making bag holey");
        let mut holey = Bag::new(bag.version());
        let mut fetch = FetchManifest::new();
        let mut phase = Phase::Start;

        while phase != Phase::End {
            phase = match phase {
                Phase::Start => Phase::Tags,
                Phase::Tags => {
                    for tag in bag.tags() {
                        self.visit_tag(tag, &mut holey, &mut fetch);
                    }
                    Phase::Payload
                }
                Phase::Payload => {
                    for file in bag.payload() {
                        if self.skipped(file.path()) {
                            holey.put(file.clone())?;
                        } else {
                            fetch.push(self.item(file));
                        }
                    }
                    Phase::End
                }
                Phase::End => Phase::End,
            };
        }

        tracing::debug!(entries = fetch.len(), "built fetch manifest");
        holey.put_fetch(fetch);
        Ok(holey)
    }

    fn visit_tag(&self, tag: &TagFile, holey: &mut Bag, fetch: &mut FetchManifest) {
        match classify(tag.path()) {
            // The new fetch manifest replaces both.
            FileKind::FetchManifest | FileKind::FetchProgress => {}
            FileKind::Plain => {
                let file = tag.to_bag_file();
                if self.tag_mode.advertises() && !self.skipped(file.path()) {
                    fetch.push(self.item(&file));
                    if self.tag_mode.keeps() {
                        holey.put_tag(tag.clone());
                    }
                } else {
                    holey.put_tag(tag.clone());
                }
            }
            _ => holey.put_tag(tag.clone()),
        }
    }
}
