//! Atomic file placement for bag writers and fetch destinations.
//!
//! Every write goes to a hidden sibling first and is renamed into place, so a
//! crash or an abandoned transfer never leaves a truncated file under its
//! final name.

mod error;
mod primitives;
mod staging;

pub use error::{Error, Result};
pub use primitives::{atomic_write, remove_file_if_exists};
pub use staging::StagedFile;
