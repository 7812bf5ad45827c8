#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("unknown url type: {0}")]
    UnknownUrlType(String),

    #[error("unknown dependency type: {0}")]
    UnknownDependencyType(String),

    #[error("unknown package manager: {0}")]
    UnknownPackageManager(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
