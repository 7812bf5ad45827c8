pub mod error;
pub mod fetcher;

pub use error::{FetchError, Result};
pub use fetcher::{FetchKind, FetchOutcome, Fetcher};
