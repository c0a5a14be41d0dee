use std::time::Duration;

use sheetwire_core::RemoteFailure;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(String),

    #[error("No response within {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("{0}")]
    Remote(#[from] RemoteFailure),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Config error: {0}")]
    Config(String),

    #[error("{0}")]
    Custom(String),
}

/// Terminal rejection kinds of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectKind {
    Timeout,
    Network,
    Remote,
    Decode,
    Closed,
    Other,
}

impl Error {
    pub fn kind(&self) -> RejectKind {
        match self {
            Self::Timeout(_) => RejectKind::Timeout,
            Self::Network(_) | Self::Io(_) => RejectKind::Network,
            Self::Remote(_) => RejectKind::Remote,
            Self::Decode(_) => RejectKind::Decode,
            Self::ConnectionClosed => RejectKind::Closed,
            Self::Codec(_) | Self::Config(_) | Self::Custom(_) => RejectKind::Other,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
