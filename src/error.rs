#[derive(Debug)]
pub enum AppError {
    /// Malformed submission, rejected before anything is persisted.
    Validation(String),
    NotFound(String),
    /// Lease or request-level deadline exceeded. Handler-reported failures
    /// are not represented here: they live in `handlers::HandlerError` and
    /// drive the job retry path instead of surfacing as app errors.
    Timeout(String),
    Database(sqlx::Error),
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::Validation(msg) => write!(f, "Validation Error: {msg}"),
            AppError::NotFound(msg) => write!(f, "Not Found: {msg}"),
            AppError::Timeout(msg) => write!(f, "Timeout: {msg}"),
            AppError::Database(err) => write!(f, "Database Error: {err}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err)
    }
}
