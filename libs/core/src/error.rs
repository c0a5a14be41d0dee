use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid call id: {0}")]
    InvalidCallId(String),
}

pub type Result<T> = std::result::Result<T, Error>;
