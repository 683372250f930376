//! Shared test doubles: a scripted capture device, a recording decoder and
//! a pass-through remultiplexer over a synthetic program stream.
//!
//! The synthetic stream is a sequence of ordinary program stream packets
//! (`00 00 01 <id> <len> <payload>`). For video packets the first payload
//! byte carries the picture type code, which is what the fake remux reports.

#![allow(dead_code)]

use framestore_engine::device::{
    CaptureDevice, CaptureMode, CaptureRead, DecoderDevice, DecoderSource, Remux, RemuxedFrame,
};
use framestore_engine::{EngineConfig, RemuxFactory};
use framestore_core::PictureType;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Engine configuration suitable for tests: no disk probe, no tail guard,
/// tame watchdog.
pub fn test_config() -> EngineConfig {
    EngineConfig {
        min_free_disk: 0,
        tail_guard: 0,
        watchdog_secs: 3600,
        ..Default::default()
    }
}

/// Poll `cond` until it holds or the timeout passes.
pub fn wait_until(mut cond: impl FnMut() -> bool, timeout: Duration) -> bool {
    let end = Instant::now() + timeout;
    while Instant::now() < end {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}

// --- synthetic program stream ----------------------------------------------

/// One program stream packet.
pub fn ps_packet(stream_id: u8, payload: &[u8]) -> Vec<u8> {
    let mut packet = vec![0x00, 0x00, 0x01, stream_id];
    packet.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    packet.extend_from_slice(payload);
    packet
}

/// One video frame of `total_len` bytes whose payload starts with the
/// picture type code and continues with a recognizable fill pattern.
pub fn video_frame(picture: PictureType, total_len: usize, seed: u8) -> Vec<u8> {
    assert!(total_len > 6, "packet header alone takes 6 bytes");
    let payload_len = total_len - 6;
    let mut payload = vec![picture.code()];
    payload.extend((1..payload_len).map(|i| seed.wrapping_add(i as u8)));
    ps_packet(0xE0, &payload)
}

/// A stream of `gops` groups of pictures, `gop_len` frames each (one intra
/// frame followed by predicted frames), every frame `frame_len` bytes.
pub fn gop_stream(gops: usize, gop_len: usize, frame_len: usize) -> Vec<u8> {
    let mut stream = Vec::new();
    for g in 0..gops {
        for f in 0..gop_len {
            let picture = if f == 0 {
                PictureType::I
            } else if f % 3 == 0 {
                PictureType::B
            } else {
                PictureType::P
            };
            stream.extend(video_frame(picture, frame_len, (g * gop_len + f) as u8));
        }
    }
    stream
}

/// Write a ready-made recording (single segment plus index) into `dir` and
/// return the segment bytes.
pub fn write_recording(
    dir: &std::path::Path,
    gops: usize,
    gop_len: usize,
    frame_len: usize,
) -> Vec<u8> {
    use framestore_engine::IndexFile;
    std::fs::create_dir_all(dir).unwrap();
    let stream = gop_stream(gops, gop_len, frame_len);
    std::fs::write(dir.join("001.vdr"), &stream).unwrap();
    let mut index = IndexFile::create(dir, 0).unwrap();
    for f in 0..gops * gop_len {
        let picture = PictureType::try_from(stream[f * frame_len + 6]).unwrap();
        index.write(picture, 1, (f * frame_len) as i32).unwrap();
    }
    stream
}

// --- capture device double ---------------------------------------------------

#[derive(Default)]
struct CaptureInner {
    data: Vec<u8>,
    pos: usize,
    mode: Option<CaptureMode>,
    audio_pids: Option<(u16, u16)>,
}

/// Capture device yielding a prepared byte stream, then `Again` forever.
#[derive(Clone, Default)]
pub struct ScriptedCapture {
    inner: Arc<Mutex<CaptureInner>>,
}

impl ScriptedCapture {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CaptureInner {
                data,
                ..Default::default()
            })),
        }
    }

    pub fn exhausted(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.pos >= inner.data.len()
    }

    pub fn mode(&self) -> Option<CaptureMode> {
        self.inner.lock().unwrap().mode
    }

    pub fn audio_pids(&self) -> Option<(u16, u16)> {
        self.inner.lock().unwrap().audio_pids
    }
}

impl CaptureDevice for ScriptedCapture {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<CaptureRead> {
        let mut inner = self.inner.lock().unwrap();
        if inner.pos >= inner.data.len() {
            return Ok(CaptureRead::Again);
        }
        let n = buf.len().min(4096).min(inner.data.len() - inner.pos);
        let pos = inner.pos;
        buf[..n].copy_from_slice(&inner.data[pos..pos + n]);
        inner.pos += n;
        Ok(CaptureRead::Data(n))
    }

    fn set_mode(&mut self, mode: CaptureMode) -> io::Result<()> {
        self.inner.lock().unwrap().mode = Some(mode);
        Ok(())
    }

    fn set_audio_pids(&mut self, primary: u16, secondary: u16) -> io::Result<()> {
        self.inner.lock().unwrap().audio_pids = Some((primary, secondary));
        Ok(())
    }
}

// --- decoder device double ---------------------------------------------------

/// Decoder commands as the log records them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecoderCommand {
    Play,
    Freeze,
    Resume,
    SlowMotion(u32),
    ClearBuffer,
    StillPicture(Vec<u8>),
    SelectSource(&'static str),
    AvSync(bool),
    Mute(bool),
}

#[derive(Default)]
struct DecoderInner {
    written: Vec<u8>,
    commands: Vec<DecoderCommand>,
}

/// Decoder that accepts everything and records what it was told.
#[derive(Clone, Default)]
pub struct RecordingDecoder {
    inner: Arc<Mutex<DecoderInner>>,
}

impl RecordingDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn written(&self) -> Vec<u8> {
        self.inner.lock().unwrap().written.clone()
    }

    pub fn written_len(&self) -> usize {
        self.inner.lock().unwrap().written.len()
    }

    pub fn commands(&self) -> Vec<DecoderCommand> {
        self.inner.lock().unwrap().commands.clone()
    }

    pub fn commands_since(&self, n: usize) -> Vec<DecoderCommand> {
        self.inner.lock().unwrap().commands[n..].to_vec()
    }

    pub fn command_count(&self) -> usize {
        self.inner.lock().unwrap().commands.len()
    }

    fn log(&self, command: DecoderCommand) {
        self.inner.lock().unwrap().commands.push(command);
    }
}

impl DecoderDevice for RecordingDecoder {
    fn play(&mut self) -> io::Result<()> {
        self.log(DecoderCommand::Play);
        Ok(())
    }

    fn freeze(&mut self) -> io::Result<()> {
        self.log(DecoderCommand::Freeze);
        Ok(())
    }

    fn resume(&mut self) -> io::Result<()> {
        self.log(DecoderCommand::Resume);
        Ok(())
    }

    fn slow_motion(&mut self, factor: u32) -> io::Result<()> {
        self.log(DecoderCommand::SlowMotion(factor));
        Ok(())
    }

    fn clear_buffer(&mut self) -> io::Result<()> {
        self.log(DecoderCommand::ClearBuffer);
        Ok(())
    }

    fn still_picture(&mut self, payload: &[u8]) -> io::Result<()> {
        self.log(DecoderCommand::StillPicture(payload.to_vec()));
        Ok(())
    }

    fn select_source(&mut self, source: DecoderSource) -> io::Result<()> {
        self.log(DecoderCommand::SelectSource(match source {
            DecoderSource::Demux => "demux",
            DecoderSource::Memory => "memory",
        }));
        Ok(())
    }

    fn set_av_sync(&mut self, on: bool) -> io::Result<()> {
        self.log(DecoderCommand::AvSync(on));
        Ok(())
    }

    fn set_mute(&mut self, on: bool) -> io::Result<()> {
        self.log(DecoderCommand::Mute(on));
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.inner.lock().unwrap().written.extend_from_slice(data);
        Ok(data.len())
    }
}

// --- remux double ------------------------------------------------------------

/// Pass-through remultiplexer: consumes one whole packet at a time, emits it
/// verbatim and reports the picture type encoded in video payloads.
#[derive(Default)]
pub struct PassthroughRemux {
    out: Vec<u8>,
}

impl Remux for PassthroughRemux {
    fn process(&mut self, input: &[u8]) -> (usize, Option<RemuxedFrame<'_>>) {
        if input.len() < 6 {
            return (0, None);
        }
        if input[0] != 0x00 || input[1] != 0x00 || input[2] != 0x01 {
            // skip to the next start code
            let skip = input
                .iter()
                .position(|&b| b == 0x00)
                .map(|p| p.max(1))
                .unwrap_or(input.len());
            return (skip, None);
        }
        let stream_id = input[3];
        let total = usize::from(input[4]) * 256 + usize::from(input[5]) + 6;
        if input.len() < total {
            return (0, None);
        }
        self.out.clear();
        self.out.extend_from_slice(&input[..total]);
        let picture = if (0xE0..=0xEF).contains(&stream_id) && total > 6 {
            PictureType::try_from(input[6]).unwrap_or(PictureType::None)
        } else {
            PictureType::None
        };
        (
            total,
            Some(RemuxedFrame {
                data: &self.out,
                picture_type: picture,
            }),
        )
    }
}

pub fn passthrough_factory() -> RemuxFactory {
    Box::new(|| Box::new(PassthroughRemux::default()) as Box<dyn Remux>)
}
