//! Interfaces to the hardware collaborators the engine drives.
//!
//! The engine never talks to a driver directly; it is handed trait objects
//! for the capture side (a transport-stream byte source), the decoder side
//! (an MPEG decoder with trick-play controls) and the remultiplexer that
//! turns transport-stream input into tagged program-stream frames. Tests
//! supply in-memory fakes for all three.

use framestore_core::PictureType;
use std::io;

/// Result of one capture read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureRead {
    /// `n` bytes were placed at the start of the buffer.
    Data(usize),
    /// Nothing available right now, try again.
    Again,
    /// The driver dropped data; recoverable, keep reading.
    Overflow,
}

/// Operating mode of the capture device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    /// Full stream delivered to the reader, decoder fed from memory.
    Record,
    /// Decoder fed from memory, capture idle.
    Replay,
    /// Live viewing, decoder fed directly from the demultiplexer.
    Normal,
}

/// Where the decoder takes its data from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderSource {
    /// Straight from the broadcast demultiplexer.
    Demux,
    /// From buffers written through [`DecoderDevice::write`].
    Memory,
}

/// A byte source yielding MPEG transport stream data.
pub trait CaptureDevice: Send {
    /// Read into `buf`. `Again` and `Overflow` are recoverable; a real error
    /// ends the pipeline that was reading.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<CaptureRead>;

    /// Switch the driver between live, record and replay plumbing.
    fn set_mode(&mut self, mode: CaptureMode) -> io::Result<()>;

    /// Reconfigure the demultiplexed audio pids for live viewing.
    fn set_audio_pids(&mut self, primary: u16, secondary: u16) -> io::Result<()> {
        let _ = (primary, secondary);
        Ok(())
    }
}

/// An MPEG decoder with trick-play controls.
pub trait DecoderDevice: Send {
    fn play(&mut self) -> io::Result<()>;
    fn freeze(&mut self) -> io::Result<()>;
    /// Continue after a freeze.
    fn resume(&mut self) -> io::Result<()>;
    fn slow_motion(&mut self, factor: u32) -> io::Result<()>;
    fn clear_buffer(&mut self) -> io::Result<()>;
    fn still_picture(&mut self, payload: &[u8]) -> io::Result<()>;
    fn select_source(&mut self, source: DecoderSource) -> io::Result<()>;
    fn set_av_sync(&mut self, on: bool) -> io::Result<()>;
    fn set_mute(&mut self, on: bool) -> io::Result<()>;

    /// Write program stream bytes toward the decoder. May accept fewer bytes
    /// than offered; `WouldBlock` means yield and retry.
    fn write(&mut self, data: &[u8]) -> io::Result<usize>;
}

/// A frame completed by the remultiplexer, borrowed from its internal buffer
/// until the next call to [`Remux::process`].
#[derive(Debug)]
pub struct RemuxedFrame<'a> {
    /// Program stream bytes of the completed frame.
    pub data: &'a [u8],
    /// Picture type of the frame, `None` when the packet carried no picture.
    pub picture_type: PictureType,
}

/// Turns transport stream input into program stream frames tagged with their
/// picture type.
pub trait Remux: Send {
    /// Consume as much of `input` as possible. Returns the number of bytes
    /// consumed and, when a frame completed, its remuxed payload.
    fn process(&mut self, input: &[u8]) -> (usize, Option<RemuxedFrame<'_>>);
}
