use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Not found")]
    NotFound,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid token")]
    InvalidToken,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Log the error at a level matching its cause. Caller-facing errors stay
    /// at debug; storage and internal faults are reported as errors.
    pub fn log(&self) {
        match self {
            AppError::Database(e) => tracing::error!("Database error: {:?}", e),
            AppError::Internal(e) => tracing::error!("Internal error: {:?}", e),
            AppError::Serialization(e) => tracing::error!("Serialization error: {}", e),
            AppError::NotFound | AppError::Validation(_) | AppError::InvalidToken => {
                tracing::debug!("Request rejected: {}", self)
            }
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
