use sheetwire_core::EngineError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("Invalid params for {method}: {reason}")]
    BadParams { method: String, reason: String },

    #[error("Unknown method: {0}")]
    UnknownMethod(String),
}

impl Error {
    pub fn bad_params(method: &str, reason: impl Into<String>) -> Self {
        Self::BadParams {
            method: method.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<Error> for EngineError {
    fn from(err: Error) -> Self {
        EngineError::new(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
