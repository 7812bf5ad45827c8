pub mod dedupe;
pub mod error;

pub use dedupe::{DedupeStats, Deduplicator};
pub use error::{DedupeError, Result};
