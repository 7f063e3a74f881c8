use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Pagination stopped before any row was fetched.
    #[error("Upstream query failed: {0}")]
    Upstream(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// A record is missing a field or carries a value that cannot be used.
    #[error("Data shape error: {0}")]
    DataShape(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;
