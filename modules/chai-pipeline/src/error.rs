#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] chai_fetch::FetchError),

    #[error("parse failed: {0}")]
    Adapter(#[from] chai_adapters::AdapterError),

    #[error("store operation failed: {0}")]
    Store(#[from] chai_store::StoreError),

    #[error("run cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, PipelineError>;
