/// Fetch-stage error taxonomy. All variants here are fatal for the current
/// pipeline run (spec.md §7: TransientFetchError is "not retried within a
/// run" — the next scheduled cycle retries, not this one).
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("transient fetch error for {url}: {source}")]
    Transient {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("upstream returned {status} for {url}")]
    BadStatus { url: String, status: u16 },

    #[error("io error writing fetch artifacts: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive extraction failed: {0}")]
    Extract(String),

    #[error("git clone failed for {url}: {source}")]
    GitClone {
        url: String,
        #[source]
        source: git2::Error,
    },

    #[error("no prior fetch found for package manager {0} and FETCH=false")]
    NoPriorFetch(String),
}

pub type Result<T> = std::result::Result<T, FetchError>;
