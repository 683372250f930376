//! MPEG picture classification.
//!
//! Every remuxed frame carries one of these tags. `I` pictures are
//! self-contained random-access points; trick-mode playback steps only
//! between them. `None` (code 0) marks data that completed without picture
//! information and never reaches the index.

/// Picture type of a single encoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PictureType {
    /// No picture information for this packet.
    None = 0,
    /// Intra frame, a random-access point.
    I = 1,
    /// Forward-predicted frame.
    P = 2,
    /// Bidirectionally predicted frame.
    B = 3,
}

impl PictureType {
    /// On-disk code of this picture type.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Whether this frame can start a segment file or a trick-mode step.
    pub fn is_intra(self) -> bool {
        self == PictureType::I
    }
}

impl TryFrom<u8> for PictureType {
    type Error = crate::Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(PictureType::None),
            1 => Ok(PictureType::I),
            2 => Ok(PictureType::P),
            3 => Ok(PictureType::B),
            _ => Err(crate::Error::InvalidPictureType(value)),
        }
    }
}
