//! Audio packet policy for replayed program streams.
//!
//! The decoder receives the replayed stream as written, except for audio:
//! exactly one MPEG audio track passes through, the other is zeroed in
//! place (zeroed packets keep the stream layout intact, deleting them would
//! disturb the decoder), and AC-3 private-stream packets never reach the
//! decoder at all. Their payload can instead be piped to an external audio
//! command. During fast forward and rewind every audio packet is zeroed.
//!
//! A program stream packet is `00 00 01 <id> <len_hi> <len_lo> ...` with a
//! total length of `len + 6`. Unknown stream ids are treated as a resync
//! point: the scanner advances one byte instead of trusting the length
//! field.

use std::io::Write;
use std::process::{Child, Command, Stdio};
use tracing::{error, warn};

/// Default MPEG audio stream id, the primary track.
pub const AUDIO_STREAM_1: u8 = 0xC0;
/// Alternate MPEG audio stream id.
pub const AUDIO_STREAM_2: u8 = 0xC1;

const PRIVATE_STREAM_AC3: u8 = 0xBD;

/// Apply the audio policy to one frame, in place.
///
/// `except` is the audio stream id allowed through, or 0 to suppress all
/// audio (trick modes). Returns whether an alternate-track packet (0xC1)
/// was seen, which tells the caller that track toggling is available.
pub fn strip_audio_packets(data: &mut [u8], except: u8, mut dolby: Option<&mut AudioPipe>) -> bool {
    let mut saw_alternate = false;
    let mut i = 0;
    while i + 6 < data.len() {
        if data[i] == 0x00 && data[i + 1] == 0x00 && data[i + 2] == 0x01 {
            let id = data[i + 3];
            let len = usize::from(data[i + 4]) * 256 + usize::from(data[i + 5]) + 6;
            let end = (i + len).min(data.len());
            match id {
                PRIVATE_STREAM_AC3 => {
                    if except != 0 && i + 8 < data.len() {
                        if let Some(pipe) = dolby.as_deref_mut() {
                            // payload starts past the PES header
                            let payload = i + usize::from(data[i + 8]) + 9;
                            if payload < end {
                                pipe.write(&data[payload..end]);
                            }
                        }
                    }
                    // always zeroed toward the decoder
                    data[i..end].fill(0);
                }
                AUDIO_STREAM_1 | AUDIO_STREAM_2 => {
                    if id == AUDIO_STREAM_2 {
                        saw_alternate = true;
                    }
                    if except == 0 || id != except {
                        data[i..end].fill(0);
                    }
                }
                0xE0..=0xEF => {} // video passes through
                _ => {
                    // unknown id, do not trust the length field
                    i += 1;
                    continue;
                }
            }
            i += len;
        } else {
            i += 1;
        }
    }
    saw_alternate
}

/// Pipe to an external audio command consuming AC-3 payloads on stdin.
pub struct AudioPipe {
    child: Child,
    broken: bool,
}

impl AudioPipe {
    /// Spawn `command` through the shell.
    pub fn spawn(command: &str) -> Option<AudioPipe> {
        match Command::new("/bin/sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::piped())
            .spawn()
        {
            Ok(child) => Some(AudioPipe {
                child,
                broken: false,
            }),
            Err(e) => {
                error!(command, error = %e, "can't open pipe to audio command");
                None
            }
        }
    }

    /// Forward one payload; a broken pipe is logged once and then ignored.
    pub fn write(&mut self, payload: &[u8]) {
        if self.broken {
            return;
        }
        if let Some(stdin) = self.child.stdin.as_mut() {
            if let Err(e) = stdin.write_all(payload) {
                warn!(error = %e, "audio command pipe broken, audio muted");
                self.broken = true;
            }
        }
    }
}

impl Drop for AudioPipe {
    fn drop(&mut self) {
        self.child.stdin.take();
        let _ = self.child.wait();
    }
}
