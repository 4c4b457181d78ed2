//! Filling holey BagIt bags.
//!
//! A holey bag lists the files it is missing in `fetch.txt`. [`BagFetcher`]
//! retrieves them concurrently through per-scheme [`Transport`]s, checks each
//! one against the payload manifests as soon as it arrives and records the
//! state of every entry in the `fetch-progress.txt` ledger, so an
//! interrupted transfer can be resumed.
//!
//! Failures are handed to a [`FailStrategy`], which decides whether to retry
//! the target, move on or stop the whole transfer.
//!
//! # Example
//!
//! ```no_run
//! use bagit_fetch::{BagFetcher, Threshold, TransportRegistry, TransportSettings};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let bag = bagit_core::load("holey-bag")?;
//! let fetcher = BagFetcher::new(TransportRegistry::with_defaults(&TransportSettings::default()))
//!     .threads(4)
//!     .resume(true)
//!     .fail_strategy(Threshold::default());
//! let result = fetcher.fetch_into(&bag, "holey-bag")?;
//! println!("{result}");
//! # Ok(())
//! # }
//! ```

pub use self::destination::{Destination, DestinationFactory, FileSystemDestinations, MemoryDestinations};
pub use self::error::{FetchError, Result};
pub use self::fetcher::{BagFetcher, FetchOutcome};
pub use self::shutdown::ShutdownHandle;
pub use self::strategy::{AlwaysContinue, AlwaysRetry, FailFast, FailStrategy, FailureAction, Threshold};
pub use self::target::{FetchTarget, plan};
#[cfg(feature = "http")]
pub use self::transport::HttpTransport;
pub use self::transport::{
    FetchContext, FileTransport, RsyncTransport, Transport, TransportFactory, TransportRegistry, TransportSettings,
    copy_with_cancel,
};

mod destination;
mod error;
mod fetcher;
mod remote;
mod shutdown;
mod strategy;
mod target;
mod transport;
