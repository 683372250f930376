//! Error types shared by every framestore crate.
//!
//! All fallible core operations return `Result<T>` which is aliased to
//! `Result<T, Error>`, so callers can propagate with `?`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid picture type code: {0}")]
    InvalidPictureType(u8),

    #[error("Invalid index entry: {0}")]
    InvalidEntry(String),

    #[error("Invalid timecode: {0}")]
    InvalidTimecode(String),
}

pub type Result<T> = std::result::Result<T, Error>;
