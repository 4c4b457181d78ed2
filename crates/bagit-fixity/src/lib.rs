//! Fixity primitives for BagIt manifests.
//!
//! Computes and checks MD5, SHA-1, SHA-256 and SHA-512 digests over byte
//! streams without buffering the stream.
//!
//! # Key Features
//!
//! - **Streaming**: [`digest`] and [`matches`] use one fixed buffer
//! - **Never cached**: every comparison recomputes the digest
//! - **Extensible**: the minimal [`Hasher`] trait allows custom implementations
//!
//! # Example
//!
//! ```
//! use bagit_fixity::{Algorithm, VerifiedReader};
//!
//! let data = b"hello world";
//! let mut reader = VerifiedReader::new(&data[..], Algorithm::Md5.hasher());
//! let mut buffer = Vec::new();
//! std::io::copy(&mut reader, &mut buffer).unwrap();
//!
//! reader.finish("5eb63bbbe01eeed093cb22bb8f5acdc3").unwrap();
//! ```

pub use self::algorithm::Algorithm;
pub use self::error::{Result, VerificationError};
pub use self::fixity::{digest, matches, verify};
pub use self::hasher::{AnyHasher, DigestHasher, Hasher};
pub use self::reader::VerifiedReader;

mod algorithm;
mod error;
mod fixity;
mod hasher;
mod reader;
