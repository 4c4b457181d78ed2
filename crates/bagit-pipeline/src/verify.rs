//! Completeness and fixity checks.
//!
//! Every verifier reports through a [`VerifyResult`]; integrity problems are
//! never errors. How far a verifier gets after the first problem is decided by
//! the [`FailMode`] passed to [`Verifier::verify`].

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::mem;
use std::str::FromStr;

use bagit_core::{Algorithm, Bag, BagFile, DATA_DIR, DECLARATION, FETCH, ManifestKind, TagFile, is_payload};
use rayon::prelude::*;

use crate::pool;
use crate::result::{Category, Message, VerifyResult};

/// When to stop after a problem has been found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FailMode {
    /// Stop at the first problem.
    FailFast,
    /// Finish the current step, then stop.
    FailStep,
    /// Finish the current stage, then stop.
    FailStage,
    /// Run everything.
    #[default]
    FailSlow,
}

impl FailMode {
    pub fn as_str(self) -> &'static str {
        match self {
            FailMode::FailFast => "FAIL_FAST",
            FailMode::FailStep => "FAIL_STEP",
            FailMode::FailStage => "FAIL_STAGE",
            FailMode::FailSlow => "FAIL_SLOW",
        }
    }
}

impl fmt::Display for FailMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for FailMode {
    type Err = String;

    /// Accepts `FAIL_FAST` as well as `fail-fast` and `fast`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        match normalized.strip_prefix("fail_").unwrap_or(&normalized) {
            "fast" => Ok(FailMode::FailFast),
            "step" => Ok(FailMode::FailStep),
            "stage" => Ok(FailMode::FailStage),
            "slow" => Ok(FailMode::FailSlow),
            _ => Err(format!("unknown fail mode {s:?}")),
        }
    }
}

pub trait Verifier: Send + Sync {
    fn verify(&self, bag: &Bag, mode: FailMode) -> VerifyResult;
}

/// Returned by a check that must not continue.
struct Halt;

type Flow = Result<(), Halt>;

/// Collects messages and decides, per [`FailMode`], when checking ends.
struct Recorder {
    mode:         FailMode,
    result:       VerifyResult,
    step_failed:  bool,
    stage_failed: bool,
}

impl Recorder {
    fn new(mode: FailMode) -> Self {
        Self {
            mode,
            result: VerifyResult::ok(),
            step_failed: false,
            stage_failed: false,
        }
    }

    fn fail(&mut self, message: Message) -> Flow {
        // A later stage may find the same missing file again.
        let repeated = message.subject.is_some()
            && self
                .result
                .messages
                .iter()
                .any(|m| m.category == message.category && m.subject == message.subject);
        if !repeated {
            tracing::debug!(category = %message.category, "{}", message.text);
            self.result.push(message);
        }
        self.step_failed = true;
        self.stage_failed = true;
        if self.mode == FailMode::FailFast { Err(Halt) } else { Ok(()) }
    }

    fn end_step(&mut self) -> Flow {
        let failed = mem::take(&mut self.step_failed);
        if failed && self.mode == FailMode::FailStep { Err(Halt) } else { Ok(()) }
    }

    fn end_stage(&mut self) -> Flow {
        self.step_failed = false;
        let failed = mem::take(&mut self.stage_failed);
        if failed && matches!(self.mode, FailMode::FailStep | FailMode::FailStage) {
            Err(Halt)
        } else {
            Ok(())
        }
    }
}

fn run(mode: FailMode, check: impl FnOnce(&mut Recorder) -> Flow) -> VerifyResult {
    let mut recorder = Recorder::new(mode);
    // A halt only ends checking early; what was found is in the recorder.
    let _ = check(&mut recorder);
    recorder.result
}

/// A relative `/`-separated path without empty, `.` or `..` segments.
pub fn is_contained(path: &str) -> bool {
    !path.is_empty() && path.split('/').all(|s| !s.is_empty() && s != "." && s != "..")
}

fn missing_category(kind: ManifestKind) -> Category {
    match kind {
        ManifestKind::Payload => Category::PayloadManifestContainsMissingFile,
        ManifestKind::Tag => Category::TagManifestContainsMissingFile,
    }
}

fn invalid_category(kind: ManifestKind) -> Category {
    match kind {
        ManifestKind::Payload => Category::PayloadManifestContainsInvalidFile,
        ManifestKind::Tag => Category::TagManifestContainsInvalidFile,
    }
}

/// Byte view of `path`, if the bag has it.
pub(crate) fn bag_file(bag: &Bag, path: &str) -> Option<BagFile> {
    if is_payload(path) {
        bag.payload_file(path).cloned()
    } else {
        bag.tag(path).map(TagFile::to_bag_file)
    }
}

pub(crate) fn file_exists(bag: &Bag, path: &str) -> bool {
    if is_payload(path) {
        bag.payload_file(path).is_some_and(BagFile::exists)
    } else {
        bag.tag(path).is_some_and(TagFile::exists)
    }
}

fn top_level_dirs(bag: &Bag) -> Vec<String> {
    let Some(root) = bag.root() else { return Vec::new() };
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(root = %root.display(), error = %e, "cannot list bag directory");
            return Vec::new();
        }
    };
    let mut dirs: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .collect();
    dirs.sort();
    dirs
}

/// Structural completeness: manifests, declaration and file presence.
#[derive(Debug, Clone, Default)]
pub struct CompleteVerifier {
    missing_declaration_tolerant:    bool,
    additional_directories_tolerant: bool,
    ignore_directories:              Vec<String>,
}

impl CompleteVerifier {
    pub fn new() -> Self { Self::default() }

    #[must_use]
    pub fn missing_declaration_tolerant(mut self, tolerant: bool) -> Self {
        self.missing_declaration_tolerant = tolerant;
        self
    }

    #[must_use]
    pub fn additional_directories_tolerant(mut self, tolerant: bool) -> Self {
        self.additional_directories_tolerant = tolerant;
        self
    }

    /// Top-level directory names that never count as extra directories.
    #[must_use]
    pub fn ignore_directories(mut self, dirs: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.ignore_directories = dirs.into_iter().map(Into::into).collect();
        self
    }

    fn check(&self, bag: &Bag, rec: &mut Recorder) -> Flow {
        if bag.payload_manifests().next().is_none() {
            rec.fail(Message::new(Category::NoPayloadManifest, "Bag does not have any payload manifests."))?;
        }
        rec.end_step()?;

        if !self.missing_declaration_tolerant {
            match bag.declaration() {
                None => rec.fail(Message::about(
                    Category::NoBagitTxt,
                    DECLARATION,
                    format!("Bag does not have {DECLARATION}."),
                ))?,
                Some(d) if d.version != bag.version() => rec.fail(Message::about(
                    Category::WrongVersion,
                    DECLARATION,
                    format!("Version is {}, expected {}.", d.version, bag.version()),
                ))?,
                Some(_) => {}
            }
        }
        rec.end_step()?;

        for file in bag.payload() {
            if !is_contained(file.path()) {
                rec.fail(Message::about(
                    Category::PayloadNotInPayloadDirectory,
                    file.path(),
                    format!("Payload file {} is not in the payload directory.", file.path()),
                ))?;
            }
        }
        for manifest in bag.payload_manifests() {
            for path in manifest.paths().filter(|p| !is_payload(p)) {
                rec.fail(Message::about(
                    Category::TagInPayloadManifest,
                    path,
                    format!("Payload manifest {} contains tag file {path}.", manifest.path()),
                ))?;
            }
        }
        rec.end_step()?;

        let listed: HashSet<&str> = bag.payload_manifests().flat_map(|m| m.paths()).collect();
        for file in bag.payload() {
            if !listed.contains(file.path()) {
                rec.fail(Message::about(
                    Category::PayloadFileNotInPayloadManifest,
                    file.path(),
                    format!("Payload file {} not found in any payload manifest.", file.path()),
                ))?;
            }
        }
        rec.end_step()?;

        for manifest in bag.manifests() {
            for path in manifest.paths().filter(|p| !file_exists(bag, p)) {
                rec.fail(Message::about(
                    missing_category(manifest.kind()),
                    path,
                    format!("File {path} in manifest {} missing from bag.", manifest.path()),
                ))?;
            }
        }
        rec.end_step()?;

        if !self.additional_directories_tolerant {
            for dir in top_level_dirs(bag) {
                if dir != DATA_DIR && !self.ignore_directories.contains(&dir) {
                    rec.fail(Message::about(
                        Category::DirectoryNotAllowedInBagDir,
                        dir.as_str(),
                        format!("Directory {dir} not allowed in bag directory."),
                    ))?;
                }
            }
        }
        rec.end_step()?;

        rec.end_stage()
    }
}

impl Verifier for CompleteVerifier {
    fn verify(&self, bag: &Bag, mode: FailMode) -> VerifyResult { run(mode, |rec| self.check(bag, rec)) }
}

/// Recomputes every manifest entry: tag manifests first, then payload
/// manifests. Entries of one manifest are checked in parallel.
#[derive(Debug, Clone)]
pub struct ManifestVerifier {
    threads: usize,
    kinds:   Vec<ManifestKind>,
}

impl Default for ManifestVerifier {
    fn default() -> Self {
        Self {
            threads: pool::default_threads(),
            kinds:   vec![ManifestKind::Tag, ManifestKind::Payload],
        }
    }
}

impl ManifestVerifier {
    pub fn new() -> Self { Self::default() }

    #[must_use]
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    /// Check only manifests of `kind`.
    #[must_use]
    pub fn only(mut self, kind: ManifestKind) -> Self {
        self.kinds = vec![kind];
        self
    }

    fn check(&self, bag: &Bag, rec: &mut Recorder) -> Flow {
        pool::install(self.threads, "bagit-fixity", || {
            for &kind in &self.kinds {
                for manifest in bag.manifests_of(kind) {
                    tracing::debug!(manifest = %manifest.path(), entries = manifest.len(), "checking fixity");
                    let entries: Vec<(&str, &str)> = manifest.iter().collect();
                    let algorithm = manifest.algorithm();
                    let problems: Vec<Option<Message>> = entries
                        .par_iter()
                        .map(|(path, hex)| check_entry(bag, kind, algorithm, path, hex))
                        .collect();
                    for message in problems.into_iter().flatten() {
                        rec.fail(message)?;
                    }
                    rec.end_step()?;
                }
            }
            rec.end_stage()
        })
    }
}

fn check_entry(bag: &Bag, kind: ManifestKind, algorithm: Algorithm, path: &str, expected: &str) -> Option<Message> {
    let missing = |why: String| Some(Message::about(missing_category(kind), path, why));
    let Some(file) = bag_file(bag, path).filter(BagFile::exists) else {
        return missing(format!("File {path} missing from bag."));
    };
    match file.matches(algorithm, expected) {
        Ok(true) => None,
        Ok(false) => Some(Message::about(
            invalid_category(kind),
            path,
            format!("Fixity failure for {path}: expected {algorithm} {expected}."),
        )),
        Err(e) => missing(format!("File {path} could not be read: {e}.")),
    }
}

impl Verifier for ManifestVerifier {
    fn verify(&self, bag: &Bag, mode: FailMode) -> VerifyResult { run(mode, |rec| self.check(bag, rec)) }
}

/// Completeness, then fixity.
#[derive(Debug, Clone, Default)]
pub struct ValidVerifier {
    complete:  CompleteVerifier,
    manifests: ManifestVerifier,
}

impl ValidVerifier {
    pub fn new() -> Self { Self::default() }

    #[must_use]
    pub fn complete(mut self, complete: CompleteVerifier) -> Self {
        self.complete = complete;
        self
    }

    #[must_use]
    pub fn threads(mut self, threads: usize) -> Self {
        self.manifests = self.manifests.threads(threads);
        self
    }
}

impl Verifier for ValidVerifier {
    fn verify(&self, bag: &Bag, mode: FailMode) -> VerifyResult {
        run(mode, |rec| {
            self.complete.check(bag, rec)?;
            self.manifests.check(bag, rec)
        })
    }
}

/// Pre-flight check of a bag whose payload is still to be fetched.
#[derive(Debug, Clone, Default)]
pub struct HoleyBagVerifier {
    tolerate_present_targets: bool,
}

impl HoleyBagVerifier {
    pub fn new() -> Self { Self::default() }

    /// Accept fetch targets that are already present, as after an interrupted
    /// fetch that is being resumed.
    #[must_use]
    pub fn tolerate_present_targets(mut self, tolerate: bool) -> Self {
        self.tolerate_present_targets = tolerate;
        self
    }

    fn check(&self, bag: &Bag, rec: &mut Recorder) -> Flow {
        match bag.declaration() {
            None => rec.fail(Message::about(
                Category::NoBagitTxt,
                DECLARATION,
                format!("Bag does not have {DECLARATION}."),
            ))?,
            Some(d) if d.version != bag.version() => rec.fail(Message::about(
                Category::WrongVersion,
                DECLARATION,
                format!("Version is {}, expected {}.", d.version, bag.version()),
            ))?,
            Some(_) => {}
        }
        rec.end_step()?;

        if bag.payload_manifests().next().is_none() {
            rec.fail(Message::new(Category::NoPayloadManifest, "Bag does not have any payload manifests."))?;
        }
        rec.end_step()?;

        let Some(fetch) = bag.fetch_manifest() else {
            rec.fail(Message::about(
                Category::MissingFetchTxt,
                FETCH,
                format!("Bag does not have {FETCH}."),
            ))?;
            return rec.end_stage();
        };
        rec.end_step()?;

        for item in fetch.items() {
            if !is_contained(&item.path) {
                rec.fail(Message::about(
                    Category::FetchPathOutsideBag,
                    item.path.as_str(),
                    format!("Fetch target {} is not a path inside the bag.", item.path),
                ))?;
            } else if !self.tolerate_present_targets && file_exists(bag, &item.path) {
                rec.fail(Message::about(
                    Category::FetchTargetAlreadyPresent,
                    item.path.as_str(),
                    format!("Fetch target {} is already present in the bag.", item.path),
                ))?;
            }
        }
        rec.end_step()?;

        rec.end_stage()
    }
}

impl Verifier for HoleyBagVerifier {
    fn verify(&self, bag: &Bag, mode: FailMode) -> VerifyResult { run(mode, |rec| self.check(bag, rec)) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bagit_core::{Declaration, FetchItem, FetchManifest, Manifest, Version};

    const HELLO_MD5: &str = "5d41402abc4b2a76b9719d911017c592";
    const ABC_MD5: &str = "900150983cd24fb0d6963f7d28e17f72";

    fn bag() -> Bag {
        let mut bag = Bag::new(Version::V0_97);
        bag.put_declaration(Declaration::new(Version::V0_97));
        bag.put(BagFile::from_bytes("data/a.txt", b"hello")).unwrap();
        bag.put(BagFile::from_bytes("data/b.txt", b"abc")).unwrap();
        let mut manifest = Manifest::empty(ManifestKind::Payload, Algorithm::Md5);
        manifest.insert("data/a.txt", HELLO_MD5);
        manifest.insert("data/b.txt", ABC_MD5);
        bag.put_manifest(manifest);
        bag
    }

    fn categories(result: &VerifyResult) -> Vec<Category> { result.messages.iter().map(|m| m.category).collect() }

    #[test]
    fn test_valid_bag() {
        let result = ValidVerifier::new().threads(2).verify(&bag(), FailMode::FailSlow);
        assert!(result.success, "{result}");
    }

    #[test]
    fn test_missing_manifest_listed_file() {
        let mut bag = bag();
        bag.manifest_mut(ManifestKind::Payload, Algorithm::Md5)
            .unwrap()
            .insert("data/missing.txt", ABC_MD5);

        let result = CompleteVerifier::new().verify(&bag, FailMode::FailSlow);
        assert!(!result.success);
        assert_eq!(categories(&result), vec![Category::PayloadManifestContainsMissingFile]);
        assert_eq!(result.missing_files().collect::<Vec<_>>(), vec!["data/missing.txt"]);
    }

    #[test]
    fn test_fixity_mismatch() {
        let mut bag = bag();
        bag.manifest_mut(ManifestKind::Payload, Algorithm::Md5)
            .unwrap()
            .insert("data/a.txt", "d41d8cd98f00b204e9800998ecf8427e");

        let result = ValidVerifier::new().verify(&bag, FailMode::FailSlow);
        assert_eq!(categories(&result), vec![Category::PayloadManifestContainsInvalidFile]);
        assert_eq!(result.invalid_files().collect::<Vec<_>>(), vec!["data/a.txt"]);
    }

    #[test]
    fn test_unlisted_payload_and_missing_declaration() {
        let mut bag = bag();
        bag.remove("bagit.txt");
        bag.put(BagFile::from_bytes("data/extra.txt", b"x")).unwrap();

        let result = CompleteVerifier::new().verify(&bag, FailMode::FailSlow);
        assert_eq!(
            categories(&result),
            vec![Category::NoBagitTxt, Category::PayloadFileNotInPayloadManifest]
        );

        let tolerant = CompleteVerifier::new().missing_declaration_tolerant(true).verify(&bag, FailMode::FailSlow);
        assert_eq!(categories(&tolerant), vec![Category::PayloadFileNotInPayloadManifest]);
    }

    #[test]
    fn test_fail_modes() {
        let mut bag = bag();
        bag.remove("bagit.txt");
        bag.put(BagFile::from_bytes("data/x.txt", b"x")).unwrap();
        bag.put(BagFile::from_bytes("data/y.txt", b"y")).unwrap();
        bag.manifest_mut(ManifestKind::Payload, Algorithm::Md5)
            .unwrap()
            .insert("data/a.txt", ABC_MD5);

        let verifier = ValidVerifier::new();
        assert_eq!(verifier.verify(&bag, FailMode::FailFast).messages.len(), 1);
        // Declaration step fails alone.
        assert_eq!(verifier.verify(&bag, FailMode::FailStep).messages.len(), 1);
        // Whole completeness stage, no fixity.
        assert_eq!(
            categories(&verifier.verify(&bag, FailMode::FailStage)),
            vec![
                Category::NoBagitTxt,
                Category::PayloadFileNotInPayloadManifest,
                Category::PayloadFileNotInPayloadManifest
            ]
        );
        let slow = verifier.verify(&bag, FailMode::FailSlow);
        assert_eq!(slow.messages.len(), 4);
        assert!(slow.has(Category::PayloadManifestContainsInvalidFile));
    }

    #[test]
    fn test_tag_manifest_checks_typed_tags() {
        let mut bag = bag();
        let declaration = bag.get("bagit.txt").unwrap().digest(Algorithm::Sha1).unwrap();
        let mut tags = Manifest::empty(ManifestKind::Tag, Algorithm::Sha1);
        tags.insert("bagit.txt", declaration);
        tags.insert("bag-info.txt", "0000");
        bag.put_manifest(tags);

        let result = ValidVerifier::new().verify(&bag, FailMode::FailSlow);
        assert_eq!(categories(&result), vec![Category::TagManifestContainsMissingFile]);
        assert_eq!(result.messages[0].subject.as_deref(), Some("bag-info.txt"));
    }

    #[test]
    fn test_extra_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("data")).unwrap();
        std::fs::create_dir_all(dir.path().join("extra")).unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        let mut bag = bag();
        bag.set_root(Some(dir.path().to_path_buf()));

        let result = CompleteVerifier::new().verify(&bag, FailMode::FailSlow);
        assert_eq!(result.messages.len(), 2);
        assert!(result.messages.iter().all(|m| m.category == Category::DirectoryNotAllowedInBagDir));

        let ignoring = CompleteVerifier::new().ignore_directories([".git"]).verify(&bag, FailMode::FailSlow);
        assert_eq!(ignoring.messages.len(), 1);
        assert!(
            CompleteVerifier::new()
                .additional_directories_tolerant(true)
                .verify(&bag, FailMode::FailSlow)
                .success
        );
    }

    #[test]
    fn test_holey_preflight() {
        let mut bag = bag();
        assert_eq!(
            categories(&HoleyBagVerifier::new().verify(&bag, FailMode::FailSlow)),
            vec![Category::MissingFetchTxt]
        );

        let mut fetch = FetchManifest::new();
        fetch.push(FetchItem::new("data/a.txt", Some(5), "http://h/a.txt"));
        fetch.push(FetchItem::new("data/../../etc/passwd", None, "http://h/p"));
        fetch.push(FetchItem::new("data/c.txt", None, "http://h/c.txt"));
        bag.put_fetch(fetch);

        let result = HoleyBagVerifier::new().verify(&bag, FailMode::FailSlow);
        assert_eq!(
            categories(&result),
            vec![Category::FetchTargetAlreadyPresent, Category::FetchPathOutsideBag]
        );
        let resuming = HoleyBagVerifier::new().tolerate_present_targets(true).verify(&bag, FailMode::FailSlow);
        assert_eq!(categories(&resuming), vec![Category::FetchPathOutsideBag]);
    }

    #[test]
    fn test_fail_mode_parse() {
        assert_eq!("FAIL_STAGE".parse::<FailMode>().unwrap(), FailMode::FailStage);
        assert_eq!("fail-fast".parse::<FailMode>().unwrap(), FailMode::FailFast);
        assert_eq!("slow".parse::<FailMode>().unwrap(), FailMode::FailSlow);
        assert!("sometimes".parse::<FailMode>().is_err());
    }
}
