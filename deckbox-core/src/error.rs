//! Error types for deckbox-core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Binary format error: {0}")]
    BinRw(String),

    #[error("String decode error: {0}")]
    StringDecode(String),

    #[error("Page overflow: {0}")]
    PageOverflow(String),

    #[error("Unassigned reference: {0}")]
    InvalidReference(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Analysis file error: {0}")]
    Analysis(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<binrw::Error> for Error {
    fn from(e: binrw::Error) -> Self {
        Error::BinRw(e.to_string())
    }
}
