//! Decoder frame payloads.

use bytes::Bytes;

/// A single demultiplexed frame on its way to the decoder.
///
/// `index` is the logical frame number the payload was read from, or -1 when
/// the stream is being replayed without an index. Uses `Bytes` so the payload
/// can move through the frame ring without copying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame payload, one aligned picture's worth of program stream bytes.
    pub data: Bytes,

    /// Logical frame number, -1 when unknown.
    pub index: i32,
}

impl Frame {
    pub fn new(data: Bytes, index: i32) -> Self {
        Self { data, index }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
