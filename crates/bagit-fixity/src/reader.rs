use std::io::{self, Read};

use crate::{Hasher, Result, VerificationError};

/// Streaming reader that hashes data as it passes through.
///
/// [`verify`](crate::verify) drains one into a sink; callers that move the
/// bytes somewhere anyway can wrap their reader and get the digest for free.
pub struct VerifiedReader<R, H> {
    reader: R,
    hasher: H,
    bytes:  u64,
}

impl<R, H> VerifiedReader<R, H> {
    pub fn new(reader: R, hasher: H) -> Self {
        Self {
            reader,
            hasher,
            bytes: 0,
        }
    }

    /// Number of bytes seen so far.
    pub fn bytes_read(&self) -> u64 { self.bytes }
}

impl<R: Read, H: Hasher> Read for VerifiedReader<R, H> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.reader.read(buf)?;
        if n > 0 {
            self.hasher.update(&buf[..n]);
            self.bytes += n as u64;
        }
        Ok(n)
    }
}

impl<R: Read, H: Hasher> VerifiedReader<R, H> {
    /// Finalize against an expected hex digest (case-insensitive).
    /// Returns the actual digest on success.
    pub fn finish(self, expected: &str) -> Result<String> {
        let actual = hex::encode(self.hasher.finalize());
        if actual.eq_ignore_ascii_case(expected.trim()) {
            Ok(actual)
        } else {
            Err(VerificationError::Mismatch {
                expected: expected.to_string(),
                actual,
            })
        }
    }
}
