#[derive(Debug, thiserror::Error)]
pub enum DedupeError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, DedupeError>;
