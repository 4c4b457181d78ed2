use digest::Digest;

use crate::Algorithm;

/// Incremental hasher. Minimal on purpose so that callers can plug in their
/// own implementations.
pub trait Hasher: Send {
    fn update(&mut self, data: &[u8]);
    fn finalize(self) -> Vec<u8>;
}

/// Adapts any [`digest::Digest`] implementation to [`Hasher`].
pub struct DigestHasher<D: Digest + Send>(D);

impl<D: Digest + Send> DigestHasher<D> {
    pub fn new() -> Self { Self(D::new()) }
}

impl<D: Digest + Send> Default for DigestHasher<D> {
    fn default() -> Self { Self::new() }
}

impl<D: Digest + Send> Hasher for DigestHasher<D> {
    fn update(&mut self, data: &[u8]) { Digest::update(&mut self.0, data); }
    fn finalize(self) -> Vec<u8> { Digest::finalize(self.0).to_vec() }
}

/// Hasher selected at runtime from an [`Algorithm`].
pub enum AnyHasher {
    Md5(DigestHasher<md5::Md5>),
    Sha1(DigestHasher<sha1::Sha1>),
    Sha256(DigestHasher<sha2::Sha256>),
    Sha512(DigestHasher<sha2::Sha512>),
}

impl AnyHasher {
    pub fn new(algorithm: Algorithm) -> Self {
        match algorithm {
            Algorithm::Md5 => AnyHasher::Md5(DigestHasher::new()),
            Algorithm::Sha1 => AnyHasher::Sha1(DigestHasher::new()),
            Algorithm::Sha256 => AnyHasher::Sha256(DigestHasher::new()),
            Algorithm::Sha512 => AnyHasher::Sha512(DigestHasher::new()),
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        match self {
            AnyHasher::Md5(_) => Algorithm::Md5,
            AnyHasher::Sha1(_) => Algorithm::Sha1,
            AnyHasher::Sha256(_) => Algorithm::Sha256,
            AnyHasher::Sha512(_) => Algorithm::Sha512,
        }
    }

    /// Finalize and encode as lower-case hex.
    pub fn finalize_hex(self) -> String { hex::encode(self.finalize()) }
}

impl Hasher for AnyHasher {
    fn update(&mut self, data: &[u8]) {
        match self {
            AnyHasher::Md5(h) => h.update(data),
            AnyHasher::Sha1(h) => h.update(data),
            AnyHasher::Sha256(h) => h.update(data),
            AnyHasher::Sha512(h) => h.update(data),
        }
    }

    fn finalize(self) -> Vec<u8> {
        match self {
            AnyHasher::Md5(h) => h.finalize(),
            AnyHasher::Sha1(h) => h.finalize(),
            AnyHasher::Sha256(h) => h.finalize(),
            AnyHasher::Sha512(h) => h.finalize(),
        }
    }
}
