//! Pipelines over a [`Bag`](bagit_core::Bag): verification, completion and
//! hole punching.
//!
//! # Verifiers
//!
//! A [`Verifier`] inspects a bag and reports a [`VerifyResult`]. Problems are
//! messages in the result, never errors. How soon a verifier stops is set by
//! the [`FailMode`] it is run with.
//!
//! - [`CompleteVerifier`]: declaration, manifests and file presence
//! - [`ManifestVerifier`]: recomputes every manifest checksum
//! - [`ValidVerifier`]: both of the above
//! - [`HoleyBagVerifier`]: pre-flight check before fetching
//!
//! # Completers
//!
//! A [`Completer`] returns an updated copy of a bag with fresh manifests and
//! bag-info, or `None` when cancelled through its [`CancelToken`].
//!
//! # Example
//!
//! ```
//! use bagit_core::{Bag, BagFile, Version};
//! use bagit_pipeline::{Completer, DefaultCompleter, FailMode, ValidVerifier, Verifier};
//!
//! let mut bag = Bag::new(Version::V0_97);
//! bag.put(BagFile::from_bytes("data/hello.txt", b"hello")).unwrap();
//!
//! let complete = DefaultCompleter::new().complete(&bag).unwrap().unwrap();
//! assert!(ValidVerifier::new().verify(&complete, FailMode::FailFast).success);
//! ```

pub use self::cancel::CancelToken;
pub use self::complete::{Completer, DefaultCompleter, Limits, Scope, TagManifestCompleter, UpdateCompleter};
pub use self::error::{PipelineError, Result};
pub use self::pool::default_threads;
pub use self::progress::{Progress, ProgressFn, report};
pub use self::puncher::{HolePuncher, TagMode};
pub use self::result::{Category, Message, VerifyResult};
pub use self::verify::{
    CompleteVerifier, FailMode, HoleyBagVerifier, ManifestVerifier, ValidVerifier, Verifier, is_contained,
};

mod cancel;
mod complete;
mod error;
mod pool;
mod progress;
mod puncher;
mod result;
mod verify;
