use std::io::{self, Read};

use crate::{Algorithm, AnyHasher, Hasher, Result, VerifiedReader};

const BUFFER_SIZE: usize = 64 * 1024;

/// Digest a stream, returning lower-case hex. Memory use is one buffer
/// regardless of stream length.
pub fn digest(mut reader: impl Read, algorithm: Algorithm) -> io::Result<String> {
    let mut hasher = AnyHasher::new(algorithm);
    let mut buf = vec![0u8; BUFFER_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize_hex())
}

/// Recompute and compare against `expected`. Never trusts a cached value.
pub fn matches(reader: impl Read, algorithm: Algorithm, expected: &str) -> io::Result<bool> {
    Ok(digest(reader, algorithm)?.eq_ignore_ascii_case(expected.trim()))
}

/// Like [`matches`] but reports a mismatch as an error carrying both digests.
pub fn verify(reader: impl Read, algorithm: Algorithm, expected: &str) -> Result<()> {
    let mut verified = VerifiedReader::new(reader, AnyHasher::new(algorithm));
    io::copy(&mut verified, &mut io::sink())?;
    verified.finish(expected).map(drop)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VerificationError;
    use proptest::prelude::*;
    use std::io::Cursor;

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"))
        }
    }

    #[test]
    fn test_digest_md5() {
        assert_eq!(
            digest(Cursor::new(b"hello"), Algorithm::Md5).unwrap(),
            "5d41402abc4b2a76b9719d911017c592"
        );
    }

    #[test]
    fn test_digest_larger_than_buffer() {
        let data = vec![7u8; BUFFER_SIZE * 3 + 17];
        let mut hasher = AnyHasher::new(Algorithm::Sha1);
        hasher.update(&data);
        assert_eq!(digest(Cursor::new(&data), Algorithm::Sha1).unwrap(), hasher.finalize_hex());
    }

    #[test]
    fn test_matches_is_case_insensitive() {
        assert!(matches(Cursor::new(b""), Algorithm::Md5, "D41D8CD98F00B204E9800998ECF8427E").unwrap());
        assert!(!matches(Cursor::new(b"x"), Algorithm::Md5, "d41d8cd98f00b204e9800998ecf8427e").unwrap());
    }

    #[test]
    fn test_unreadable_stream_is_io_error() {
        let err = matches(FailingReader, Algorithm::Md5, "00").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);

        assert!(matches!(
            verify(FailingReader, Algorithm::Sha256, "00"),
            Err(VerificationError::Io(_))
        ));
    }

    #[test]
    fn test_verify_mismatch() {
        assert!(matches!(
            verify(Cursor::new(b"abc"), Algorithm::Md5, "d41d8cd98f00b204e9800998ecf8427e"),
            Err(VerificationError::Mismatch { .. })
        ));
        verify(Cursor::new(b"abc"), Algorithm::Md5, "900150983cd24fb0d6963f7d28e17f72").unwrap();
    }

    proptest! {
        #[test]
        fn prop_digest_matches_itself(data in proptest::collection::vec(any::<u8>(), 0..4096)) {
            for alg in Algorithm::ALL {
                let hex = digest(Cursor::new(&data), alg).unwrap();
                prop_assert_eq!(hex.len(), alg.hex_len());
                prop_assert!(matches(Cursor::new(&data), alg, &hex).unwrap());
            }
        }
    }
}
