use std::fs::File;
use std::io::{BufReader, Write};

use url::Url;

use super::{FetchContext, Transport, copy_with_cancel};
use crate::error::{FetchError, Result};

/// Reads `file://` URLs from the local file system.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileTransport;

impl Transport for FileTransport {
    fn fetch(&mut self, url: &Url, _size: Option<u64>, sink: &mut dyn Write, ctx: &FetchContext<'_>) -> Result<u64> {
        let path = url.to_file_path().map_err(|()| FetchError::InvalidUrl {
            url:    url.to_string(),
            reason: "not a local file path".to_string(),
        })?;
        tracing::debug!(path = %path.display(), "reading local file");
        let file = File::open(&path).map_err(|e| FetchError::transport(url.as_str(), e))?;
        copy_with_cancel(&mut BufReader::new(file), sink, url, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bagit_pipeline::CancelToken;
    use tempfile::tempdir;

    #[test]
    fn test_reads_local_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("with space.txt");
        std::fs::write(&path, "local bytes").unwrap();
        let url = Url::from_file_path(&path).unwrap();
        assert!(url.as_str().ends_with("with%20space.txt"));

        let cancel = CancelToken::new();
        let ctx = FetchContext {
            path:     "data/x",
            cancel:   &cancel,
            progress: &None,
        };
        let mut sink = Vec::new();
        let n = FileTransport.fetch(&url, None, &mut sink, &ctx).unwrap();
        assert_eq!(n, 11);
        assert_eq!(sink, b"local bytes");

        let missing = Url::from_file_path(dir.path().join("nope")).unwrap();
        let err = FileTransport.fetch(&missing, None, &mut Vec::new(), &ctx).unwrap_err();
        assert!(matches!(err, FetchError::Transport { .. }));
    }
}
