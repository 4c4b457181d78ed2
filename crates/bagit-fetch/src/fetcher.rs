//! Filling a holey bag.
//!
//! [`BagFetcher::fetch`] runs in three phases:
//!
//! 1. pre-flight: the bag must pass [`HoleyBagVerifier`] and every URL must
//!    have a registered transport;
//! 2. transfer: targets from [`plan`] are shared by a scoped set of workers
//!    through an atomic cursor, each worker owning one transport per scheme;
//! 3. reconciliation: fetched files join the bag and the
//!    `fetch-progress.txt` ledger records what happened to every attempt.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use bagit_core::{Bag, BagFile, FETCH, FETCH_PROGRESS, FetchItem, FetchManifest, FetchStatus, load, remove_tag, write_tag};
use bagit_fixity::VerificationError;
use bagit_pipeline::{
    CancelToken, Category, FailMode, HoleyBagVerifier, Message, ProgressFn, Progress, ValidVerifier, Verifier,
    VerifyResult, default_threads, report,
};

use crate::destination::{DestinationFactory, FileSystemDestinations};
use crate::error::{FetchError, Result};
use crate::shutdown::ShutdownHandle;
use crate::strategy::{FailStrategy, FailureAction, Threshold};
use crate::target::{FetchTarget, plan};
use crate::transport::{FetchContext, Transport, TransportRegistry, TransportSettings, parse_url};

/// The filled bag and what happened while filling it.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub bag:    Bag,
    pub result: VerifyResult,
}

/// Fetches the targets of a holey bag's `fetch.txt`.
#[derive(Clone)]
#[must_use]
pub struct BagFetcher {
    registry: TransportRegistry,
    strategy: Arc<dyn FailStrategy>,
    threads:  usize,
    resume:   bool,
    verify:   bool,
    shutdown: ShutdownHandle,
    progress: Option<ProgressFn>,
}

impl std::fmt::Debug for BagFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BagFetcher")
            .field("registry", &self.registry)
            .field("threads", &self.threads)
            .field("resume", &self.resume)
            .field("verify", &self.verify)
            .field("progress", &self.progress.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for BagFetcher {
    fn default() -> Self { Self::new(TransportRegistry::with_defaults(&TransportSettings::default())) }
}

/// What one worker did with one target.
#[derive(Debug)]
struct TargetReport {
    path:      String,
    attempts:  Vec<(String, FetchStatus)>,
    status:    FetchStatus,
    message:   Option<Message>,
    cancelled: bool,
}

impl TargetReport {
    fn new(target: &FetchTarget) -> Self {
        Self {
            path:      target.path.clone(),
            attempts:  Vec::new(),
            status:    FetchStatus::NotFetched,
            message:   None,
            cancelled: false,
        }
    }

    fn give_up(&mut self) {
        let category = match self.status {
            FetchStatus::VerifyFailed => Category::FetchVerifyFailed,
            _ => Category::FetchFailed,
        };
        self.message = Some(Message::about(
            category,
            self.path.as_str(),
            format!("An error occurred while fetching target: {}", self.path),
        ));
    }
}

/// State shared by the workers of one transfer.
struct Shared<'a> {
    bag:          &'a Bag,
    /// Child of the fetcher's token; a `Stop` cancels only this run.
    cancel:       CancelToken,
    targets:      &'a [FetchTarget],
    destinations: &'a dyn DestinationFactory,
    cursor:       AtomicUsize,
    done:         AtomicUsize,
    fetched:      Mutex<Vec<BagFile>>,
    reports:      Mutex<Vec<TargetReport>>,
}

impl Shared<'_> {
    fn next(&self) -> Option<&FetchTarget> { self.targets.get(self.cursor.fetch_add(1, Ordering::SeqCst)) }
}

impl BagFetcher {
    pub fn new(registry: TransportRegistry) -> Self {
        Self {
            registry,
            strategy: Arc::new(Threshold::default()),
            threads: default_threads(),
            resume: false,
            verify: false,
            shutdown: ShutdownHandle::new(CancelToken::new()),
            progress: None,
        }
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    /// Skip targets the ledger already marks `SUCCEEDED`.
    pub fn resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    /// Check files already present before fetching and record the findings
    /// in the ledger.
    pub fn verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// The strategy is shared by every call made through this fetcher, so
    /// counting strategies keep counting across calls.
    pub fn fail_strategy(self, strategy: impl FailStrategy + 'static) -> Self {
        self.shared_fail_strategy(Arc::new(strategy))
    }

    pub fn shared_fail_strategy(mut self, strategy: Arc<dyn FailStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn on_progress(mut self, progress: impl Fn(&Progress) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(progress));
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        let grace = self.shutdown.grace_period();
        self.shutdown = ShutdownHandle::new(cancel).grace(grace);
        self
    }

    /// How long [`ShutdownHandle::shutdown`] waits for workers.
    pub fn grace(mut self, grace: Duration) -> Self {
        self.shutdown = self.shutdown.grace(grace);
        self
    }

    /// A handle that cancels this fetcher's transfers from another thread.
    pub fn shutdown_handle(&self) -> ShutdownHandle { self.shutdown.clone() }

    pub fn cancel_token(&self) -> &CancelToken { self.shutdown.cancel_token() }

    pub fn cancel(&self) { self.cancel_token().cancel(); }

    pub fn is_cancelled(&self) -> bool { self.cancel_token().is_cancelled() }

    pub fn registry(&self) -> &TransportRegistry { &self.registry }

    pub fn is_resuming(&self) -> bool { self.resume }

    pub(crate) fn progress(&self) -> &Option<ProgressFn> { &self.progress }

    /// Fetch every target of `bag` into `destinations` and return the
    /// resulting bag. On full success the bag has no ledger and the result is
    /// a fresh validation; otherwise the bag carries the updated ledger.
    pub fn fetch(&self, bag: &Bag, destinations: &dyn DestinationFactory) -> Result<FetchOutcome> {
        let mut outcome = self.run(bag, destinations, None)?;
        if outcome.result.success {
            outcome.result = ValidVerifier::new().threads(self.threads).verify(&outcome.bag, FailMode::FailSlow);
        }
        Ok(outcome)
    }

    /// Fetch into the bag directory at `root`, keeping `fetch-progress.txt`
    /// on disk current, and return the validation of the filled bag.
    pub fn fetch_into(&self, bag: &Bag, root: impl AsRef<Path>) -> Result<VerifyResult> {
        let root = root.as_ref();
        let destinations = FileSystemDestinations::new(root);
        let outcome = self.run(bag, &destinations, Some(root))?;
        if !outcome.result.success {
            if outcome.bag.fetch_progress().is_some() {
                write_tag(&outcome.bag, root, FETCH_PROGRESS)?;
            }
            return Ok(outcome.result);
        }
        remove_tag(root, FETCH_PROGRESS)?;
        let filled = load(root)?;
        tracing::info!(root = %root.display(), "verifying filled bag");
        Ok(ValidVerifier::new().threads(self.threads).verify(&filled, FailMode::FailSlow))
    }

    fn run(&self, bag: &Bag, destinations: &dyn DestinationFactory, root: Option<&Path>) -> Result<FetchOutcome> {
        let preflight = HoleyBagVerifier::new()
            .tolerate_present_targets(self.resume || self.verify)
            .verify(bag, FailMode::FailSlow);
        if !preflight.success {
            return Err(FetchError::InvalidBag(preflight));
        }
        let Some(fetch) = bag.fetch_manifest() else {
            return Err(FetchError::InvalidBag(VerifyResult::fail(Message::about(
                Category::MissingFetchTxt,
                FETCH,
                format!("Bag does not have {FETCH}."),
            ))));
        };
        self.check_schemes(fetch)?;

        let mut ledger = self.ledger(bag, fetch);
        if self.verify {
            self.annotate(bag, &mut ledger);
            if let Some(root) = root {
                let mut annotated = bag.clone();
                annotated.put_fetch_progress(ledger.clone());
                write_tag(&annotated, root, FETCH_PROGRESS)?;
            }
        }

        let targets = plan(fetch, Some(&ledger), self.resume);
        tracing::info!(targets = targets.len(), entries = fetch.len(), resume = self.resume, "starting transfer");
        let shared = Shared {
            bag,
            cancel: self.cancel_token().child(),
            targets: &targets,
            destinations,
            cursor: AtomicUsize::new(0),
            done: AtomicUsize::new(0),
            fetched: Mutex::new(Vec::with_capacity(targets.len())),
            reports: Mutex::new(Vec::with_capacity(targets.len())),
        };
        self.transfer(&shared)?;

        let cancelled = shared.cancel.is_cancelled();
        let fetched = shared.fetched.into_inner().unwrap_or_else(|e| e.into_inner());
        let reports = shared.reports.into_inner().unwrap_or_else(|e| e.into_inner());
        self.reconcile(bag, ledger, fetched, reports, cancelled)
    }

    fn check_schemes(&self, fetch: &FetchManifest) -> Result<()> {
        for item in fetch.items() {
            let url = parse_url(&item.url)?;
            if !self.registry.supports(url.scheme()) {
                return Err(FetchError::UnknownScheme {
                    scheme: url.scheme().to_string(),
                    url:    item.url.clone(),
                });
            }
        }
        Ok(())
    }

    /// The existing ledger, with every fetch entry it does not know yet added
    /// as `NOT_FETCHED`.
    fn ledger(&self, bag: &Bag, fetch: &FetchManifest) -> FetchManifest {
        let mut ledger = bag.fetch_progress().cloned().unwrap_or_else(FetchManifest::ledger);
        for item in fetch.items() {
            if ledger.find(&item.path, &item.url).is_none() {
                ledger.push(item.clone().with_status(FetchStatus::NotFetched));
            }
        }
        ledger
    }

    fn annotate(&self, bag: &Bag, ledger: &mut FetchManifest) {
        tracing::info!("verifying files already present");
        let result = ValidVerifier::new().threads(self.threads).verify(bag, FailMode::FailSlow);
        let entries: Vec<FetchItem> = ledger.items().to_vec();
        for item in entries {
            let present = bag.get(&item.path).is_some_and(|f| f.exists());
            let status = if result.invalid_files().any(|p| p == item.path) {
                FetchStatus::VerifyFailed
            } else if !present || result.missing_files().any(|p| p == item.path) {
                FetchStatus::NotFetched
            } else {
                FetchStatus::Succeeded
            };
            tracing::debug!(path = %item.path, %status, "annotated");
            ledger.set_status(&item.path, &item.url, status);
        }
    }

    fn transfer(&self, shared: &Shared<'_>) -> Result<()> {
        let workers = self.threads.min(shared.targets.len());
        if workers <= 1 {
            tracing::debug!("fetching on the calling thread");
            self.work(shared);
            return Ok(());
        }
        thread::scope(|scope| {
            for i in 0..workers {
                thread::Builder::new()
                    .name(format!("bagit-fetch-{i}"))
                    .spawn_scoped(scope, || self.work(shared))
                    .map_err(FetchError::io(format!("bagit-fetch-{i}")))?;
            }
            Ok(())
        })
    }

    fn work(&self, shared: &Shared<'_>) {
        let _guard = self.shutdown.enter();
        let mut transports: HashMap<String, Box<dyn Transport>> = HashMap::new();
        let total = shared.targets.len() as u64;
        while !shared.cancel.is_cancelled() {
            let Some(target) = shared.next() else { break };
            let outcome = self.fetch_target(target, shared, &mut transports);
            let done = shared.done.fetch_add(1, Ordering::SeqCst) as u64 + 1;
            report_done(&self.progress, &outcome, done, total);
            shared.reports.lock().unwrap_or_else(|e| e.into_inner()).push(outcome);
        }
        for (scheme, mut transport) in transports {
            tracing::trace!(scheme = %scheme, "closing transport");
            transport.close();
        }
    }

    fn fetch_target(
        &self,
        target: &FetchTarget,
        shared: &Shared<'_>,
        transports: &mut HashMap<String, Box<dyn Transport>>,
    ) -> TargetReport {
        let mut report = TargetReport::new(target);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let err = match self.try_sources(target, shared, transports, &mut report) {
                Ok(file) => {
                    report.status = FetchStatus::Succeeded;
                    shared.fetched.lock().unwrap_or_else(|e| e.into_inner()).push(file);
                    return report;
                }
                Err(FetchError::Cancelled) => {
                    report.cancelled = true;
                    return report;
                }
                Err(err) => err,
            };

            let action = self.strategy.register_failure(&target.path, &err);
            tracing::warn!(path = %target.path, attempt, %action, error = %err, "fetch failed");
            match action {
                FailureAction::RetryCurrent if !shared.cancel.is_cancelled() => continue,
                FailureAction::RetryCurrent => report.cancelled = true,
                FailureAction::ContinueWithNext => report.give_up(),
                FailureAction::Stop => {
                    report.give_up();
                    shared.cancel.cancel();
                }
            }
            return report;
        }
    }

    /// Try each source URL in turn. The error of the last one is returned
    /// when all of them fail.
    fn try_sources(
        &self,
        target: &FetchTarget,
        shared: &Shared<'_>,
        transports: &mut HashMap<String, Box<dyn Transport>>,
        report: &mut TargetReport,
    ) -> Result<BagFile> {
        let mut last = FetchError::Cancelled;
        for url in &target.sources {
            if shared.cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }
            match self.fetch_one(target, url, shared, transports) {
                Ok(file) => {
                    report.attempts.push((url.clone(), FetchStatus::Succeeded));
                    return Ok(file);
                }
                Err(FetchError::Cancelled) => return Err(FetchError::Cancelled),
                Err(err) => {
                    let status = match err {
                        FetchError::Fixity { .. } => FetchStatus::VerifyFailed,
                        _ => FetchStatus::FetchFailed,
                    };
                    report.status = status;
                    report.attempts.push((url.clone(), status));
                    last = err;
                }
            }
        }
        Err(last)
    }

    fn fetch_one(
        &self,
        target: &FetchTarget,
        url: &str,
        shared: &Shared<'_>,
        transports: &mut HashMap<String, Box<dyn Transport>>,
    ) -> Result<BagFile> {
        let url = parse_url(url)?;
        let transport = match transports.entry(url.scheme().to_ascii_lowercase()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let mut transport = self.registry.create(url.scheme())?;
                transport.initialize()?;
                entry.insert(transport)
            }
        };

        let mut destination = shared.destinations.create(&target.path, target.size)?;
        let ctx = FetchContext {
            path:     &target.path,
            cancel:   &shared.cancel,
            progress: &self.progress,
        };
        tracing::debug!(path = %target.path, url = %url, size = ?target.size, "fetching");
        match transport.fetch(&url, target.size, destination.sink(), &ctx) {
            Ok(bytes) => tracing::debug!(path = %target.path, bytes, "received"),
            Err(err) => {
                destination.abandon();
                return Err(err);
            }
        }
        let file = destination.commit()?;

        if let Err(err) = check_fixity(shared.bag, &file) {
            if let Err(e) = shared.destinations.discard(&target.path) {
                tracing::warn!(path = %target.path, error = %e, "could not remove corrupt file");
            }
            return Err(err);
        }
        Ok(file)
    }

    fn reconcile(
        &self,
        bag: &Bag,
        mut ledger: FetchManifest,
        fetched: Vec<BagFile>,
        mut reports: Vec<TargetReport>,
        cancelled: bool,
    ) -> Result<FetchOutcome> {
        let mut filled = bag.clone();
        for file in fetched {
            filled.put(file)?;
        }

        reports.sort_by(|a, b| a.path.cmp(&b.path));
        let mut result = VerifyResult::ok();
        for report in &reports {
            for (url, status) in &report.attempts {
                ledger.set_status(&report.path, url, *status);
            }
            if let Some(message) = &report.message {
                result.push(message.clone());
            }
        }
        let cancelled = cancelled || reports.iter().any(|r| r.cancelled);
        if cancelled {
            result.push(Message::new(Category::TransferCancelled, "Transfer cancelled."));
        }

        if result.success {
            tracing::info!(fetched = reports.len(), "transfer complete");
            filled.remove(FETCH_PROGRESS);
            return Ok(FetchOutcome { bag: filled, result });
        }

        tracing::warn!(failed = result.messages.len(), cancelled, "transfer incomplete");
        filled.put_fetch_progress(ledger);
        Ok(FetchOutcome { bag: filled, result })
    }
}

fn report_done(progress: &Option<ProgressFn>, target: &TargetReport, done: u64, total: u64) {
    let activity = match target.status {
        FetchStatus::Succeeded => "fetched",
        _ => "failed to fetch",
    };
    report(progress, activity, &target.path, done, Some(total));
}

/// Any recorded checksum that matches accepts the file. A file no manifest
/// lists cannot be checked and is accepted as is. Otherwise the mismatch
/// against the first checksum is reported.
fn check_fixity(bag: &Bag, file: &BagFile) -> Result<()> {
    let checksums = bag.checksums(file.path());
    if checksums.is_empty() {
        tracing::debug!(path = file.path(), "no checksum to verify against");
        return Ok(());
    }
    let fixity = |source: VerificationError| FetchError::Fixity {
        path: file.path().to_string(),
        source,
    };
    let mut mismatch = None;
    for (algorithm, expected) in &checksums {
        let reader = file.open().map_err(|e| fixity(e.into()))?;
        match bagit_fixity::verify(reader, *algorithm, expected) {
            Ok(()) => return Ok(()),
            Err(err @ VerificationError::Mismatch { .. }) => {
                mismatch.get_or_insert(err);
            }
            Err(err) => return Err(fixity(err)),
        }
    }
    match mismatch {
        Some(err) => Err(fixity(err)),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destination::MemoryDestinations;
    use crate::strategy::{AlwaysContinue, FailFast};
    use bagit_core::{Algorithm, Manifest, ManifestKind, Version};
    use std::io::Write;
    use std::sync::atomic::AtomicUsize;
    use url::Url;

    const HELLO_MD5: &str = "5d41402abc4b2a76b9719d911017c592";
    const ABC_MD5: &str = "900150983cd24fb0d6963f7d28e17f72";

    /// Serves fixed bodies for `mem://host/<name>`; names not in the table fail.
    struct Served {
        bodies: HashMap<String, Vec<u8>>,
        calls:  Arc<AtomicUsize>,
    }

    impl Transport for Served {
        fn fetch(&mut self, url: &Url, _: Option<u64>, sink: &mut dyn Write, ctx: &FetchContext<'_>) -> Result<u64> {
            ctx.check_cancelled()?;
            self.calls.fetch_add(1, Ordering::SeqCst);
            let name = url.path().trim_start_matches('/');
            let body = self.bodies.get(name).ok_or_else(|| FetchError::transport(url.as_str(), "not found"))?;
            sink.write_all(body).map_err(FetchError::io(ctx.path))?;
            Ok(body.len() as u64)
        }
    }

    fn registry(bodies: &[(&str, &[u8])], calls: &Arc<AtomicUsize>) -> TransportRegistry {
        let bodies: HashMap<String, Vec<u8>> = bodies.iter().map(|(k, v)| (k.to_string(), v.to_vec())).collect();
        let calls = calls.clone();
        let mut registry = TransportRegistry::new();
        registry.register_fn("mem", move |_| {
            Ok(Box::new(Served {
                bodies: bodies.clone(),
                calls:  calls.clone(),
            }))
        });
        registry
    }

    fn holey(entries: &[(&str, &str, &str)]) -> Bag {
        let mut bag = Bag::new(Version::V0_97);
        bag.put(BagFile::from_bytes("bagit.txt", b"BagIt-Version: 0.97\nTag-File-Character-Encoding: UTF-8\n"))
            .unwrap();
        let mut manifest = Manifest::empty(ManifestKind::Payload, Algorithm::Md5);
        let mut fetch = FetchManifest::new();
        for (path, md5, url) in entries {
            manifest.insert(*path, *md5);
            fetch.push(FetchItem::new(*path, None, *url));
        }
        bag.put_manifest(manifest);
        bag.put_fetch(fetch);
        bag
    }

    #[test]
    fn test_fetch_fills_the_bag() {
        let calls = Arc::new(AtomicUsize::new(0));
        let bag = holey(&[
            ("data/a.txt", HELLO_MD5, "mem://host/a"),
            ("data/b.txt", ABC_MD5, "mem://host/b"),
        ]);
        let fetcher = BagFetcher::new(registry(&[("a", b"hello"), ("b", b"abc")], &calls)).threads(2);
        let outcome = fetcher.fetch(&bag, &MemoryDestinations).unwrap();
        assert!(outcome.result.success, "{}", outcome.result);
        assert_eq!(outcome.bag.payload_len(), 2);
        assert!(outcome.bag.fetch_progress().is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_second_source_is_tried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut bag = holey(&[("data/a.txt", HELLO_MD5, "mem://host/gone")]);
        let mut fetch = bag.fetch_manifest().unwrap().clone();
        fetch.push(FetchItem::new("data/a.txt", None, "mem://host/a"));
        bag.put_fetch(fetch);

        let fetcher = BagFetcher::new(registry(&[("a", b"hello")], &calls)).threads(1).fail_strategy(FailFast);
        let outcome = fetcher.fetch(&bag, &MemoryDestinations).unwrap();
        assert!(outcome.result.success, "{}", outcome.result);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_corrupt_transfer_is_verify_failed() {
        let calls = Arc::new(AtomicUsize::new(0));
        let bag = holey(&[
            ("data/a.txt", HELLO_MD5, "mem://host/a"),
            ("data/b.txt", ABC_MD5, "mem://host/wrong"),
        ]);
        let fetcher = BagFetcher::new(registry(&[("a", b"hello"), ("wrong", b"xyz")], &calls))
            .threads(1)
            .fail_strategy(AlwaysContinue);
        let outcome = fetcher.fetch(&bag, &MemoryDestinations).unwrap();

        assert!(!outcome.result.success);
        assert_eq!(outcome.result.messages.len(), 1);
        let message = &outcome.result.messages[0];
        assert_eq!(message.category, Category::FetchVerifyFailed);
        assert_eq!(message.text, "An error occurred while fetching target: data/b.txt");

        let ledger = outcome.bag.fetch_progress().unwrap();
        assert_eq!(
            ledger.find("data/a.txt", "mem://host/a").unwrap().status,
            Some(FetchStatus::Succeeded)
        );
        assert_eq!(
            ledger.find("data/b.txt", "mem://host/wrong").unwrap().status,
            Some(FetchStatus::VerifyFailed)
        );
        assert!(outcome.bag.payload_file("data/a.txt").is_some());
    }

    #[test]
    fn test_any_matching_manifest_accepts_the_file() {
        let mut bag = holey(&[("data/a.txt", ABC_MD5, "mem://host/a")]);
        let mut sha1 = Manifest::empty(ManifestKind::Payload, Algorithm::Sha1);
        sha1.insert("data/a.txt", "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d");
        bag.put_manifest(sha1);
        let file = BagFile::from_bytes("data/a.txt", b"hello");
        check_fixity(&bag, &file).unwrap();

        let corrupt = BagFile::from_bytes("data/a.txt", b"HELLO");
        let err = check_fixity(&bag, &corrupt).unwrap_err();
        assert!(matches!(
            err,
            FetchError::Fixity { source: VerificationError::Mismatch { .. }, .. }
        ));
    }

    #[test]
    fn test_fail_fast_cancels() {
        let calls = Arc::new(AtomicUsize::new(0));
        let bag = holey(&[
            ("data/a.txt", HELLO_MD5, "mem://host/missing"),
            ("data/b.txt", ABC_MD5, "mem://host/b"),
        ]);
        let fetcher = BagFetcher::new(registry(&[("b", b"abc")], &calls)).threads(1).fail_strategy(FailFast);
        let outcome = fetcher.fetch(&bag, &MemoryDestinations).unwrap();
        assert!(outcome.result.has(Category::FetchFailed));
        assert!(outcome.result.has(Category::TransferCancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stop_does_not_cancel_later_runs() {
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = BagFetcher::new(registry(&[("b", b"abc")], &calls)).threads(1).fail_strategy(FailFast);
        let failing = holey(&[("data/a.txt", HELLO_MD5, "mem://host/missing")]);
        let outcome = fetcher.fetch(&failing, &MemoryDestinations).unwrap();
        assert!(outcome.result.has(Category::TransferCancelled));
        assert!(!fetcher.is_cancelled());

        let bag = holey(&[("data/b.txt", ABC_MD5, "mem://host/b")]);
        let outcome = fetcher.fetch(&bag, &MemoryDestinations).unwrap();
        assert!(outcome.result.success, "{}", outcome.result);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_threshold_retries_per_file() {
        let calls = Arc::new(AtomicUsize::new(0));
        let bag = holey(&[("data/a.txt", HELLO_MD5, "mem://host/missing")]);
        let fetcher = BagFetcher::new(registry(&[], &calls)).threads(1).fail_strategy(Threshold::new(3, 200));
        let outcome = fetcher.fetch(&bag, &MemoryDestinations).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(outcome.result.has(Category::FetchFailed));
        assert!(!outcome.result.has(Category::TransferCancelled));
    }

    #[test]
    fn test_unknown_scheme_is_rejected_up_front() {
        let calls = Arc::new(AtomicUsize::new(0));
        let bag = holey(&[("data/a.txt", HELLO_MD5, "gopher://host/a")]);
        let err = BagFetcher::new(registry(&[], &calls)).fetch(&bag, &MemoryDestinations).unwrap_err();
        assert!(matches!(err, FetchError::UnknownScheme { ref scheme, .. } if scheme == "gopher"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_bag_without_fetch_manifest_is_invalid() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut bag = holey(&[("data/a.txt", HELLO_MD5, "mem://host/a")]);
        bag.remove(FETCH);
        let err = BagFetcher::new(registry(&[], &calls)).fetch(&bag, &MemoryDestinations).unwrap_err();
        match err {
            FetchError::InvalidBag(result) => assert!(result.has(Category::MissingFetchTxt)),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_cancelled_before_start() {
        let calls = Arc::new(AtomicUsize::new(0));
        let bag = holey(&[("data/a.txt", HELLO_MD5, "mem://host/a")]);
        let fetcher = BagFetcher::new(registry(&[("a", b"hello")], &calls));
        fetcher.cancel();
        let outcome = fetcher.fetch(&bag, &MemoryDestinations).unwrap();
        assert_eq!(outcome.result.messages.len(), 1);
        assert_eq!(outcome.result.messages[0].text, "Transfer cancelled.");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(outcome.bag.fetch_progress().is_some());
    }
}
