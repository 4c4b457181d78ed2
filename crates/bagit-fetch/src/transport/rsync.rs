use std::fs::File;
use std::io::{BufReader, Read, Seek, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use percent_encoding::percent_decode_str;
use url::Url;

use super::{FetchContext, Transport, copy_with_cancel};
use crate::error::{FetchError, Result};

const POLL: Duration = Duration::from_millis(50);

/// Runs the external `rsync` binary into a temporary file, then copies the
/// result into the sink. The child process is killed once the transfer's
/// cancel token fires.
#[derive(Debug, Clone)]
pub struct RsyncTransport {
    binary: PathBuf,
}

impl RsyncTransport {
    /// Uses `$BAGIT_RSYNC` when set, otherwise `rsync` from `PATH`.
    pub fn new() -> Self {
        let binary = std::env::var_os("BAGIT_RSYNC").map_or_else(|| PathBuf::from("rsync"), PathBuf::from);
        Self::with_binary(binary)
    }

    pub fn with_binary(binary: impl Into<PathBuf>) -> Self { Self { binary: binary.into() } }
}

impl Default for RsyncTransport {
    fn default() -> Self { Self::new() }
}

/// The source argument for rsync: the URL with its user and path
/// percent-decoded, since rsync takes file names literally.
fn source_arg(url: &Url) -> String {
    let mut source = format!("{}://", url.scheme());
    if !url.username().is_empty() {
        source.push_str(&percent_decode_str(url.username()).decode_utf8_lossy());
        source.push('@');
    }
    if let Some(host) = url.host_str() {
        source.push_str(host);
    }
    if let Some(port) = url.port() {
        source.push_str(&format!(":{port}"));
    }
    source.push_str(&percent_decode_str(url.path()).decode_utf8_lossy());
    source
}

impl Transport for RsyncTransport {
    fn fetch(&mut self, url: &Url, _size: Option<u64>, sink: &mut dyn Write, ctx: &FetchContext<'_>) -> Result<u64> {
        ctx.check_cancelled()?;
        let failed = |e: std::io::Error| FetchError::transport(url.as_str(), e);
        let temp = tempfile::Builder::new()
            .prefix("bagit-rsync-")
            .suffix(".tmp")
            .tempfile()
            .map_err(failed)?;
        let mut stderr = tempfile::tempfile().map_err(failed)?;

        let source = source_arg(url);
        tracing::debug!(binary = %self.binary.display(), source = %source, "spawning rsync");
        let mut child = Command::new(&self.binary)
            .arg("--quiet")
            .arg("--times")
            .arg(&source)
            .arg(temp.path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(stderr.try_clone().map_err(failed)?))
            .spawn()
            .map_err(failed)?;

        let status = loop {
            if ctx.cancel.is_cancelled() {
                tracing::debug!(source = %source, "killing rsync");
                let _ = child.kill();
                let _ = child.wait();
                return Err(FetchError::Cancelled);
            }
            match child.try_wait().map_err(failed)? {
                Some(status) => break status,
                None => thread::sleep(POLL),
            }
        };
        if !status.success() {
            let mut message = String::new();
            stderr.rewind().map_err(failed)?;
            stderr.read_to_string(&mut message).map_err(failed)?;
            return Err(FetchError::transport(url.as_str(), format!("rsync exited with {status}: {}", message.trim())));
        }

        let file = File::open(temp.path()).map_err(failed)?;
        copy_with_cancel(&mut BufReader::new(file), sink, url, ctx)
    }
}
