pub mod entry;
pub mod error;
pub mod frame;
pub mod picture;
pub mod timecode;

pub use entry::IndexEntry;
pub use error::{Error, Result};
pub use frame::Frame;
pub use picture::PictureType;
