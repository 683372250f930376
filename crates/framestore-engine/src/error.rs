//! Engine error types.
//!
//! Errors raised inside a pipeline thread do not propagate out of that
//! thread. The thread stops its pipeline cleanly and parks the error in a
//! sticky status slot the facade can poll (see `engine::Engine::status`).
//! The one exception is `CaptureStalled`, which additionally fires the
//! engine's emergency handler because a dead capture stream means the whole
//! process has lost its data source.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] framestore_core::Error),

    #[error("Capture stream stalled, no data for {seconds} seconds")]
    CaptureStalled { seconds: u64 },

    #[error("Write failed on '{file}'")]
    WriteFailed { file: PathBuf },

    #[error("Read failed on '{file}'")]
    ReadFailed { file: PathBuf },

    #[error("Segment file not found: '{file}'")]
    NotFound { file: PathBuf },

    #[error("Index file '{file}' has a corrupt tail of {trailing} bytes")]
    IndexCorrupt { file: PathBuf, trailing: u64 },

    #[error("Index file is closed after a write failure")]
    IndexClosed,

    #[error("Maximum number of segment files ({0}) exceeded")]
    TooManyFiles(u8),

    #[error("No editing marks found in '{file}'")]
    NoMarks { file: PathBuf },

    #[error("Editing mark at frame {frame} is not on an intra frame")]
    MarkNotOnIntraFrame { frame: i32 },

    #[error("Running low on disk space ({free_mb} MB free)")]
    DiskLow { free_mb: u64 },

    #[error("Invalid mode: {0}")]
    InvalidMode(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
