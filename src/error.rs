use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("handle '{0}' not found or invalid")]
    HandleNotFound(String),
    #[error("problem {0} already solved")]
    AlreadySolved(String),
    #[error("invalid problem id: {0}")]
    InvalidProblemId(String),
    #[error("problem {0} has not been solved")]
    NotSolved(String),
    #[error("invalid input in {path}: {message}")]
    InvalidInput { path: PathBuf, message: String },
    #[error("store error: {0}")]
    Store(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether the caller can fix the request and retry, as opposed to a system fault.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Error::HandleNotFound(_)
                | Error::AlreadySolved(_)
                | Error::InvalidProblemId(_)
                | Error::NotSolved(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
