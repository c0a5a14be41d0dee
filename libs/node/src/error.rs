use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error(transparent)]
    Fabric(#[from] sheetwire_fabric::Error),

    #[error(transparent)]
    Databank(#[from] sheetwire_databank::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
