//! Pluggable per-scheme transports.
//!
//! A [`TransportRegistry`] maps URL schemes to [`TransportFactory`] values.
//! The fetcher asks the registry for one [`Transport`] per scheme and per
//! worker, initializes it lazily on first use and closes it when the worker
//! exits.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{Read, Write};
use std::sync::Arc;
use std::time::Duration;

use bagit_pipeline::{CancelToken, ProgressFn, report};
use url::Url;

use crate::error::{FetchError, Result};

mod file;
#[cfg(feature = "http")]
mod http;
mod rsync;

pub use self::file::FileTransport;
#[cfg(feature = "http")]
pub use self::http::HttpTransport;
pub use self::rsync::RsyncTransport;

const CHUNK: usize = 64 * 1024;

/// Per-transfer context handed to [`Transport::fetch`].
pub struct FetchContext<'a> {
    /// Bag-relative path being fetched.
    pub path:     &'a str,
    pub cancel:   &'a CancelToken,
    pub progress: &'a Option<ProgressFn>,
}

impl FetchContext<'_> {
    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() { Err(FetchError::Cancelled) } else { Ok(()) }
    }
}

/// Moves the bytes behind a URL into a sink.
pub trait Transport: Send {
    fn initialize(&mut self) -> Result<()> { Ok(()) }

    /// Copies the resource at `url` into `sink` and returns the number of
    /// bytes written. `size` is the expected length, when known.
    fn fetch(&mut self, url: &Url, size: Option<u64>, sink: &mut dyn Write, ctx: &FetchContext<'_>) -> Result<u64>;

    /// Called when the worker that owns the transport exits. Cancellation
    /// reaches a running transfer through [`FetchContext::cancel`].
    fn close(&mut self) {}
}

pub trait TransportFactory: Send + Sync {
    fn create(&self, scheme: &str) -> Result<Box<dyn Transport>>;
}

impl<F> TransportFactory for F
where
    F: Fn(&str) -> Result<Box<dyn Transport>> + Send + Sync,
{
    fn create(&self, scheme: &str) -> Result<Box<dyn Transport>> { self(scheme) }
}

/// Settings shared by the built-in transports.
#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub timeout:    Duration,
    pub user_agent: String,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            timeout:    Duration::from_secs(60),
            user_agent: concat!("bagit/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Scheme to factory map. Schemes are compared lower-case.
#[derive(Clone, Default)]
pub struct TransportRegistry {
    factories: BTreeMap<String, Arc<dyn TransportFactory>>,
}

impl fmt::Debug for TransportRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportRegistry").field("schemes", &self.factories.keys().collect::<Vec<_>>()).finish()
    }
}

impl TransportRegistry {
    /// A registry with no transports.
    pub fn new() -> Self { Self::default() }

    /// `file`, `rsync` and, with the `http` feature, `http` and `https`.
    pub fn with_defaults(settings: &TransportSettings) -> Self {
        let mut registry = Self::new();
        registry.register_fn("file", |_| Ok(Box::new(FileTransport)));
        registry.register_fn("rsync", |_| Ok(Box::new(RsyncTransport::new())));
        #[cfg(feature = "http")]
        for scheme in ["http", "https"] {
            let settings = settings.clone();
            registry.register_fn(scheme, move |_| Ok(Box::new(HttpTransport::new(settings.clone()))));
        }
        #[cfg(not(feature = "http"))]
        let _ = settings;
        registry
    }

    pub fn register(&mut self, scheme: &str, factory: impl TransportFactory + 'static) -> &mut Self {
        self.register_shared(scheme, Arc::new(factory))
    }

    pub fn register_fn(
        &mut self,
        scheme: &str,
        factory: impl Fn(&str) -> Result<Box<dyn Transport>> + Send + Sync + 'static,
    ) -> &mut Self {
        self.register_shared(scheme, Arc::new(factory))
    }

    pub fn register_shared(&mut self, scheme: &str, factory: Arc<dyn TransportFactory>) -> &mut Self {
        self.factories.insert(scheme.to_ascii_lowercase(), factory);
        self
    }

    pub fn supports(&self, scheme: &str) -> bool { self.factories.contains_key(&scheme.to_ascii_lowercase()) }

    pub fn schemes(&self) -> impl Iterator<Item = &str> { self.factories.keys().map(String::as_str) }

    pub fn create(&self, scheme: &str) -> Result<Box<dyn Transport>> {
        match self.factories.get(&scheme.to_ascii_lowercase()) {
            Some(factory) => factory.create(scheme),
            None => Err(FetchError::UnknownScheme {
                scheme: scheme.to_string(),
                url:    String::new(),
            }),
        }
    }
}

pub(crate) fn parse_url(url: &str) -> Result<Url> {
    Url::parse(url).map_err(|e| FetchError::InvalidUrl {
        url:    url.to_string(),
        reason: e.to_string(),
    })
}

/// Copy `reader` into `sink`, checking for cancellation between chunks and
/// reporting the running byte count.
pub fn copy_with_cancel(reader: &mut dyn Read, sink: &mut dyn Write, url: &Url, ctx: &FetchContext<'_>) -> Result<u64> {
    let mut buf = vec![0u8; CHUNK];
    let mut total = 0u64;
    loop {
        ctx.check_cancelled()?;
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(FetchError::transport(url.as_str(), e)),
        };
        sink.write_all(&buf[..n]).map_err(FetchError::io(ctx.path))?;
        total += n as u64;
        report(ctx.progress, "transferring", ctx.path, total, None);
    }
    sink.flush().map_err(FetchError::io(ctx.path))?;
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry() {
        let registry = TransportRegistry::with_defaults(&TransportSettings::default());
        assert!(registry.supports("file"));
        assert!(registry.supports("FILE"));
        assert!(registry.supports("rsync"));
        #[cfg(feature = "http")]
        assert!(registry.supports("https"));
        assert!(!registry.supports("ftp"));
        assert!(matches!(registry.create("ftp"), Err(FetchError::UnknownScheme { .. })));
    }

    #[test]
    fn test_copy_stops_when_cancelled() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let ctx = FetchContext {
            path:     "data/a",
            cancel:   &cancel,
            progress: &None,
        };
        let url = Url::parse("file:///a").unwrap();
        let mut sink = Vec::new();
        let err = copy_with_cancel(&mut &b"abc"[..], &mut sink, &url, &ctx).unwrap_err();
        assert!(matches!(err, FetchError::Cancelled));
        assert!(sink.is_empty());
    }
}
