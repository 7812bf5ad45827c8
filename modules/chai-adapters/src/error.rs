#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("io error reading snapshot directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv parse error: {0}")]
    Csv(#[from] csv::Error),

    #[error("json parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected file not found in snapshot: {0}")]
    MissingFile(String),
}

pub type Result<T> = std::result::Result<T, AdapterError>;
