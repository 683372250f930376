//! The replay pipeline.
//!
//! Two threads cooperate through a bounded frame ring:
//!
//! ```text
//! {NNN.vdr, index.vdr} ──input thread──▶ frame ring ──output thread──▶ decoder
//! ```
//!
//! The input thread is steered by the index: normal play reads consecutive
//! frames, fast forward and rewind hop between intra frames, still mode
//! reads nothing. Without an index the recording is replayed as opaque
//! bytes and trick modes are unavailable. The output thread applies the
//! audio packet policy and feeds the decoder.
//!
//! ## Mode transitions
//!
//! Playback state is a single [`PlayState`] value with explicit transition
//! methods. Whenever a transition must discard what is buffered between the
//! reader and the decoder, it is sandwiched in a flush: both threads are
//! gated quiescent, `read_index` rewinds to `write_index`, the ring and the
//! decoder buffer are cleared, and the gate is lowered. The buffer is only
//! purged when the playback direction truly changes, which keeps audio
//! glitches to a minimum.

use crate::audio::{strip_audio_packets, AudioPipe, AUDIO_STREAM_1, AUDIO_STREAM_2};
use crate::config::EngineConfig;
use crate::device::{DecoderDevice, DecoderSource};
use crate::fileset::{segment_path, FileSet, FileSetMode};
use crate::index::IndexFile;
use crate::pipeline::{
    join_deadline, new_status, set_sticky, sticky, Status, STOP_DEADLINE,
};
use crate::ring::{Endpoint, FrameRing};
use crate::{Error, Result};
use bytes::Bytes;
use framestore_core::timecode::{frame_to_hmsf, seconds_to_frames};
use framestore_core::Frame;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// How often an intra frame is repeated in slow reverse, to roughly match
/// the effective frame rate of forward slow motion.
const SLOW_REWIND_REPEATS: u32 = 24;

/// Decoder slow motion factor used while paused fast forward is active.
const SLOW_MOTION_FACTOR: u32 = 2;

/// Frames to rewind when leaving fast forward, compensating for data that
/// was already buffered ahead of the decoder.
const FF_COMPENSATION: i32 = 150;

/// Deadline for both threads to acknowledge a flush.
const FLUSH_DEADLINE: Duration = Duration::from_secs(2);

/// Playback state of a replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayState {
    Play,
    Pause,
    /// A single frame is frozen on screen and the reader is idle.
    Still,
    FastForward { paused: bool },
    FastRewind { paused: bool },
}

impl PlayState {
    pub fn is_paused(self) -> bool {
        matches!(
            self,
            PlayState::Pause
                | PlayState::Still
                | PlayState::FastForward { paused: true }
                | PlayState::FastRewind { paused: true }
        )
    }

    pub fn is_trick(self) -> bool {
        matches!(
            self,
            PlayState::FastForward { .. } | PlayState::FastRewind { .. }
        )
    }
}

struct ReplayState {
    mode: PlayState,
    /// Next frame the input thread will fetch.
    read_index: i32,
    /// Last frame fully handed to the decoder.
    write_index: i32,
    audio_track: u8,
    can_toggle_audio: bool,
}

struct Shared {
    busy: AtomicBool,
    state: Mutex<ReplayState>,
    ring: FrameRing,
    status: Status,
}

pub struct ReplayPipeline {
    dir: PathBuf,
    shared: Arc<Shared>,
    decoder: Arc<Mutex<dyn DecoderDevice>>,
    index: Option<Arc<Mutex<IndexFile>>>,
    files: Arc<Mutex<FileSet>>,
    can_trick: bool,
    max_frame_size: usize,
    resume_backup_secs: i32,
    input: Option<JoinHandle<()>>,
    output: Option<JoinHandle<()>>,
}

impl ReplayPipeline {
    /// Open the recording read-only, load its index if it has one, switch
    /// the decoder to memory feed and start both threads.
    pub fn start(
        decoder: Arc<Mutex<dyn DecoderDevice>>,
        dir: &Path,
        config: &EngineConfig,
    ) -> Result<Self> {
        info!(dir = %dir.display(), "replay");
        let mut files = FileSet::new(dir, FileSetMode::Read);
        files.open(1, 0)?;
        let index = IndexFile::load(dir, config.tail_guard)?;
        let can_trick = index.is_some();

        let dolby = config
            .audio_command
            .as_deref()
            .and_then(AudioPipe::spawn);

        {
            let mut dec = decoder.lock().unwrap();
            check(dec.select_source(DecoderSource::Memory));
            check(dec.set_av_sync(true));
            check(dec.play());
        }

        let shared = Arc::new(Shared {
            busy: AtomicBool::new(true),
            state: Mutex::new(ReplayState {
                mode: PlayState::Play,
                read_index: -1,
                write_index: -1,
                audio_track: AUDIO_STREAM_1,
                can_toggle_audio: false,
            }),
            ring: FrameRing::new(config.ring_capacity),
            status: new_status(),
        });

        let index = index.map(|i| Arc::new(Mutex::new(i)));
        let files = Arc::new(Mutex::new(files));

        let input = {
            let shared = shared.clone();
            let index = index.clone();
            let files = files.clone();
            let max_frame = config.max_frame_size;
            std::thread::Builder::new()
                .name("replay-input".into())
                .spawn(move || input_loop(shared, index, files, max_frame))
                .map_err(Error::Io)?
        };

        let output = {
            let shared = shared.clone();
            let decoder = decoder.clone();
            std::thread::Builder::new()
                .name("replay-output".into())
                .spawn(move || output_loop(shared, decoder, dolby, can_trick))
                .map_err(Error::Io)?
        };

        Ok(Self {
            dir: dir.to_path_buf(),
            shared,
            decoder,
            index,
            files,
            can_trick,
            max_frame_size: config.max_frame_size,
            resume_backup_secs: config.resume_backup_secs,
            input: Some(input),
            output: Some(output),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Whether both threads are still running.
    pub fn active(&self) -> bool {
        self.shared.busy.load(Ordering::Acquire)
            && !self.input.as_ref().is_some_and(|h| h.is_finished())
            && !self.output.as_ref().is_some_and(|h| h.is_finished())
    }

    /// First error that stopped the pipeline, if any.
    pub fn status(&self) -> Option<Arc<Error>> {
        sticky(&self.shared.status)
    }

    /// Stop both threads, persist the resume position and hand the decoder
    /// back to the live feed.
    pub fn stop(&mut self) {
        self.shared.busy.store(false, Ordering::Release);
        self.shared.ring.gate().thaw();
        self.shared.ring.wake_all();
        if let Some(handle) = self.input.take() {
            join_deadline(handle, "replay-input", STOP_DEADLINE);
        }
        if let Some(handle) = self.output.take() {
            join_deadline(handle, "replay-output", STOP_DEADLINE);
        }
        self.save_resume();
        {
            let mut dec = self.decoder.lock().unwrap();
            check(dec.clear_buffer());
            check(dec.set_mute(false));
            check(dec.select_source(DecoderSource::Demux));
        }
        info!(dir = %self.dir.display(), "replay stopped");
    }

    /// Toggle between paused and playing.
    pub fn pause(&self) {
        let (was_trick, now_paused) = {
            let st = self.shared.state.lock().unwrap();
            (st.mode.is_trick(), !st.mode.is_paused())
        };
        if was_trick {
            self.flush_begin();
        }
        self.shared.state.lock().unwrap().mode = if now_paused {
            PlayState::Pause
        } else {
            PlayState::Play
        };
        {
            let mut dec = self.decoder.lock().unwrap();
            check(if now_paused { dec.freeze() } else { dec.resume() });
            check(dec.set_mute(now_paused));
        }
        if was_trick {
            self.flush_end();
        }
    }

    /// Return to normal playback from any other state.
    pub fn play(&self) {
        let (mode, was_paused) = {
            let st = self.shared.state.lock().unwrap();
            (st.mode, st.mode.is_paused())
        };
        if mode == PlayState::Play {
            return;
        }
        let need_flush =
            !was_paused || matches!(mode, PlayState::FastRewind { .. }) || mode == PlayState::Still;
        if need_flush {
            self.flush_begin();
        }
        {
            let mut dec = self.decoder.lock().unwrap();
            check(if was_paused { dec.resume() } else { dec.play() });
            check(dec.set_av_sync(true));
            check(dec.set_mute(false));
        }
        self.shared.state.lock().unwrap().mode = PlayState::Play;
        if need_flush {
            self.flush_end();
        }
    }

    /// Toggle fast forward; paused fast forward is slow motion.
    pub fn forward(&self) {
        let mode = self.shared.state.lock().unwrap().mode;
        if !(self.can_trick || mode.is_paused()) {
            return;
        }
        let paused = mode.is_paused();
        let need_flush = !paused || matches!(mode, PlayState::FastRewind { .. });
        if need_flush {
            self.flush_begin();
            if matches!(mode, PlayState::FastForward { .. }) {
                // compensate for data already buffered ahead of the decoder
                let mut st = self.shared.state.lock().unwrap();
                st.read_index = (st.read_index - FF_COMPENSATION).max(0);
            }
        }
        let ff_now = !matches!(mode, PlayState::FastForward { .. });
        {
            let mut dec = self.decoder.lock().unwrap();
            if paused {
                check(if ff_now {
                    dec.slow_motion(SLOW_MOTION_FACTOR)
                } else {
                    dec.freeze()
                });
            }
            check(dec.set_av_sync(!ff_now));
            check(dec.set_mute(ff_now || paused));
        }
        self.shared.state.lock().unwrap().mode = match (ff_now, paused) {
            (true, p) => PlayState::FastForward { paused: p },
            (false, true) => PlayState::Pause,
            (false, false) => PlayState::Play,
        };
        if need_flush {
            self.flush_end();
        }
    }

    /// Toggle fast rewind; paused fast rewind is slow reverse.
    pub fn backward(&self) {
        if !self.can_trick {
            return;
        }
        let mode = self.shared.state.lock().unwrap().mode;
        self.flush_begin();
        let fr_now = !matches!(mode, PlayState::FastRewind { .. });
        let paused = mode.is_paused();
        {
            let mut dec = self.decoder.lock().unwrap();
            if paused {
                check(if fr_now { dec.resume() } else { dec.freeze() });
            }
            check(dec.set_av_sync(!fr_now));
            check(dec.set_mute(fr_now || paused));
        }
        self.shared.state.lock().unwrap().mode = match (fr_now, paused) {
            (true, p) => PlayState::FastRewind { paused: p },
            (false, true) => PlayState::Pause,
            (false, false) => PlayState::Play,
        };
        self.flush_end();
    }

    /// Jump to `position`, snapped backward to an intra frame. With `still`
    /// the frame is read synchronously and frozen on screen.
    pub fn goto(&self, position: i32, still: bool) {
        let Some(index) = self.index.clone() else {
            return;
        };
        self.flush_begin();
        if self.shared.state.lock().unwrap().mode.is_paused() {
            check(self.decoder.lock().unwrap().resume());
        }
        let target = (position + 1).max(1); // leaves the backward search room to reach frame 0
        let snapped = index.lock().unwrap().next_i_frame(target, false);
        let mut landed = -1;
        if let Some((frame_no, r)) = snapped {
            landed = frame_no;
            let mut files = self.files.lock().unwrap();
            match files.open(r.file_number, r.offset as u64) {
                Ok(file) if still => {
                    let mut buf = Vec::new();
                    match read_frame(file, &mut buf, r.length, self.max_frame_size) {
                        Ok(n) if n > 0 => self.display_still(&mut buf),
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "can't read still frame"),
                    }
                    self.shared.state.lock().unwrap().mode = PlayState::Still;
                }
                Ok(_) => {
                    let mut st = self.shared.state.lock().unwrap();
                    if st.mode == PlayState::Still {
                        st.mode = PlayState::Pause;
                    }
                }
                Err(e) => warn!(error = %e, "can't position replay file"),
            }
        }
        {
            let mut st = self.shared.state.lock().unwrap();
            st.read_index = landed;
            st.write_index = landed;
        }
        self.flush_end();
    }

    /// Skip forward or backward by whole seconds and resume playing.
    pub fn skip_seconds(&self, seconds: i32) {
        let Some(index) = self.index.clone() else {
            return;
        };
        if seconds == 0 {
            return;
        }
        self.flush_begin();
        let write_index = self.shared.state.lock().unwrap().write_index;
        if write_index >= 0 {
            let mut idx = index.lock().unwrap();
            let mut seconds = seconds;
            if seconds < 0 {
                let max_back = idx.last() / framestore_core::timecode::FRAMES_PER_SECOND;
                seconds = seconds.max(-max_back);
            }
            // not 0: the backward search needs room to land on frame 0
            let target = (write_index + seconds_to_frames(seconds)).max(1);
            let snapped = idx
                .next_i_frame(target, false)
                .map(|(i, _)| i)
                .unwrap_or(0);
            let mut st = self.shared.state.lock().unwrap();
            // the input thread increments before fetching
            st.read_index = snapped - 1;
            st.write_index = snapped - 1;
        }
        self.flush_end();
        self.play();
    }

    /// Preview where a skip of `frames` would land, without moving.
    pub fn skip_frames(&self, frames: i32) -> Option<i32> {
        let index = self.index.clone()?;
        if frames == 0 {
            return None;
        }
        let (current, _) = self.get_index(true)?;
        let target = index
            .lock()
            .unwrap()
            .next_i_frame(current + frames, frames > 0)
            .map(|(i, _)| i);
        Some(target.unwrap_or(current))
    }

    /// Current position and total length in frames. With `snap` the position
    /// moves to the nearer intra frame in either direction.
    pub fn get_index(&self, snap: bool) -> Option<(i32, i32)> {
        let index = self.index.clone()?;
        let (mode, read_index, write_index) = {
            let st = self.shared.state.lock().unwrap();
            (st.mode, st.read_index, st.write_index)
        };
        let mut current = if mode == PlayState::Still {
            read_index
        } else {
            write_index
        };
        if mode != PlayState::Still && snap {
            let mut idx = index.lock().unwrap();
            let back = idx.next_i_frame(current + 1, false).map(|(i, _)| i);
            let fwd = idx.next_i_frame(current, true).map(|(i, _)| i);
            current = match (back, fwd) {
                (Some(b), Some(f)) => {
                    if (current - b).abs() <= (current - f).abs() {
                        b
                    } else {
                        f
                    }
                }
                (Some(b), None) => b,
                (None, Some(f)) => f,
                (None, None) => current,
            };
        }
        let total = index.lock().unwrap().last();
        Some((current, total))
    }

    /// Whether an alternate audio track has been seen in the stream.
    pub fn can_toggle_audio_track(&self) -> bool {
        self.shared.state.lock().unwrap().can_toggle_audio
    }

    /// Switch between the two MPEG audio tracks.
    pub fn toggle_audio_track(&self) {
        if !self.can_toggle_audio_track() {
            return;
        }
        {
            let mut st = self.shared.state.lock().unwrap();
            st.audio_track = if st.audio_track == AUDIO_STREAM_1 {
                AUDIO_STREAM_2
            } else {
                AUDIO_STREAM_1
            };
        }
        self.flush_begin();
        self.flush_end();
    }

    /// Persist the position to resume from on the next replay: a little
    /// before the current one, snapped backward to an intra frame.
    pub fn save_resume(&self) {
        let Some(index) = &self.index else {
            return;
        };
        let write_index = self.shared.state.lock().unwrap().write_index;
        if write_index < 0 {
            return;
        }
        let mut idx = index.lock().unwrap();
        let backed_up = write_index - seconds_to_frames(self.resume_backup_secs);
        let target = if backed_up > 0 {
            // highest intra frame at or before the backed-up position
            idx.next_i_frame(backed_up + 1, false)
                .map(|(i, _)| i)
                .unwrap_or(0)
        } else {
            0
        };
        match idx.resume_set(target) {
            Ok(()) => debug!(index = target, "resume position saved"),
            Err(e) => warn!(error = %e, "can't save resume position"),
        }
    }

    fn display_still(&self, frame: &mut [u8]) {
        if self.can_trick {
            strip_audio_packets(frame, 0, None);
        }
        let mut dec = self.decoder.lock().unwrap();
        check(dec.set_av_sync(false));
        check(dec.set_mute(true));
        check(dec.still_picture(frame));
    }

    /// First half of the flush sandwich: gate both threads, rewind the read
    /// position onto the write position and purge ring and decoder.
    fn flush_begin(&self) {
        let gate = self.shared.ring.gate();
        gate.freeze();
        if !gate.wait_quiescent(FLUSH_DEADLINE) {
            warn!("replay threads did not quiesce in time, flushing anyway");
        }
        {
            let mut st = self.shared.state.lock().unwrap();
            st.read_index = st.write_index;
        }
        self.shared.ring.clear();
        check(self.decoder.lock().unwrap().clear_buffer());
    }

    fn flush_end(&self) {
        self.shared.ring.gate().thaw();
    }
}

impl Drop for ReplayPipeline {
    fn drop(&mut self) {
        if self.input.is_some() || self.output.is_some() {
            self.stop();
        }
    }
}

/// Decoder commands are advisory; a failing one is logged, not fatal.
fn check(result: std::io::Result<()>) {
    if let Err(e) = result {
        warn!(error = %e, "decoder command failed");
    }
}

fn input_loop(
    shared: Arc<Shared>,
    index: Option<Arc<Mutex<IndexFile>>>,
    files: Arc<Mutex<FileSet>>,
    max_frame: usize,
) {
    debug!("replay input thread started");

    // position at the persisted resume point, if any
    if let Some(index) = &index {
        let mut idx = index.lock().unwrap();
        let resume = idx.resume_get();
        if resume >= 0 {
            if let Some(r) = idx.get(resume) {
                if files
                    .lock()
                    .unwrap()
                    .open(r.file_number, r.offset as u64)
                    .is_ok()
                {
                    // the read loop increments before fetching, so the
                    // resumed intra frame itself is the first one delivered
                    shared.state.lock().unwrap().read_index = resume - 1;
                    info!(
                        index = resume,
                        timecode = %frame_to_hmsf(resume, true),
                        "resuming replay"
                    );
                }
            }
        }
    }

    let mut buf = Vec::with_capacity(max_frame);
    'outer: while shared.busy.load(Ordering::Acquire) {
        if shared.ring.paused(Endpoint::Producer) {
            std::thread::sleep(Duration::from_millis(1));
            continue;
        }
        let (mode, read_index) = {
            let st = shared.state.lock().unwrap();
            (st.mode, st.read_index)
        };
        if mode == PlayState::Still {
            std::thread::sleep(Duration::from_millis(3));
            continue;
        }

        let trick_read = matches!(
            mode,
            PlayState::FastForward { paused: false } | PlayState::FastRewind { .. }
        );
        let frame = if trick_read && index.is_some() {
            let forward = matches!(mode, PlayState::FastForward { .. });
            let hit = index
                .as_ref()
                .unwrap()
                .lock()
                .unwrap()
                .next_i_frame(read_index, forward);
            match hit {
                Some((target, r)) => {
                    let mut fs = files.lock().unwrap();
                    let file = match fs.open(r.file_number, r.offset as u64) {
                        Ok(file) => file,
                        Err(e) => {
                            warn!(error = %e, "can't open segment for trick read");
                            break;
                        }
                    };
                    match read_frame(file, &mut buf, r.length, max_frame) {
                        Ok(n) if n > 0 => {
                            shared.state.lock().unwrap().read_index = target;
                            Some(Frame::new(Bytes::copy_from_slice(&buf[..n]), target))
                        }
                        Ok(_) => break,
                        Err(e) => {
                            let file = segment_path(fs.dir(), fs.number());
                            error!(file = %file.display(), error = %e, "trick read failed");
                            set_sticky(&shared.status, Error::ReadFailed { file });
                            break;
                        }
                    }
                }
                None => {
                    // ran out of intra frames, fall back to normal play
                    shared.state.lock().unwrap().mode = PlayState::Play;
                    continue;
                }
            }
        } else if let Some(index) = &index {
            let next = read_index + 1;
            let hit = index.lock().unwrap().get(next);
            match hit {
                Some(r) => {
                    let mut fs = files.lock().unwrap();
                    let file = match fs.open(r.file_number, r.offset as u64) {
                        Ok(file) => file,
                        Err(e) => {
                            // a live recording may simply not have the next
                            // segment yet; anything else ends the replay
                            debug!(error = %e, "end of recording");
                            break;
                        }
                    };
                    match read_frame(file, &mut buf, r.length, max_frame) {
                        Ok(n) if n > 0 => {
                            shared.state.lock().unwrap().read_index = next;
                            Some(Frame::new(Bytes::copy_from_slice(&buf[..n]), next))
                        }
                        Ok(_) => break,
                        Err(e) => {
                            let file = segment_path(fs.dir(), fs.number());
                            error!(file = %file.display(), error = %e, "frame read failed");
                            set_sticky(&shared.status, Error::ReadFailed { file });
                            break;
                        }
                    }
                }
                None => break, // past the end of the index
            }
        } else {
            // no index: replay the raw byte stream file by file
            let mut fs = files.lock().unwrap();
            let Some(file) = fs.file() else { break };
            buf.clear();
            buf.resize(max_frame, 0);
            match file.read(&mut buf) {
                Ok(0) => {
                    match fs.next() {
                        Ok(_) => continue,
                        Err(Error::NotFound { .. }) | Err(Error::TooManyFiles(_)) => break,
                        Err(e) => {
                            error!(error = %e, "can't advance to next segment");
                            set_sticky(&shared.status, e);
                            break;
                        }
                    }
                }
                Ok(n) => Some(Frame::new(Bytes::copy_from_slice(&buf[..n]), -1)),
                Err(e) => {
                    error!(error = %e, "raw read failed");
                    set_sticky(&shared.status, Error::Io(e));
                    break;
                }
            }
        };

        if let Some(frame) = frame {
            while shared.busy.load(Ordering::Acquire)
                && !shared.ring.gate().pending(Endpoint::Producer)
            {
                if shared.ring.put(frame.clone()) {
                    continue 'outer;
                }
                shared.ring.wait_space(Duration::from_millis(3));
            }
            // a flush discards this frame; read_index rewinds with it
        }
    }
    shared.ring.gate().retire(Endpoint::Producer);
    debug!("replay input thread ended");
}

fn output_loop(
    shared: Arc<Shared>,
    decoder: Arc<Mutex<dyn DecoderDevice>>,
    mut dolby: Option<AudioPipe>,
    can_trick: bool,
) {
    debug!("replay output thread started");
    let mut scratch: Vec<u8> = Vec::new();
    'outer: while shared.busy.load(Ordering::Acquire) {
        if shared.ring.paused(Endpoint::Consumer) {
            std::thread::sleep(Duration::from_millis(1));
            continue;
        }
        let Some(guard) = shared.ring.get() else {
            shared.ring.wait_data(Duration::from_millis(3));
            continue;
        };
        let (mode, track) = {
            let st = shared.state.lock().unwrap();
            (st.mode, st.audio_track)
        };
        scratch.clear();
        scratch.extend_from_slice(&guard.data);
        if can_trick {
            let except = if mode.is_trick() { 0 } else { track };
            if strip_audio_packets(&mut scratch, except, dolby.as_mut()) {
                shared.state.lock().unwrap().can_toggle_audio = true;
            }
        }
        let repeats = if matches!(mode, PlayState::FastRewind { paused: true }) {
            SLOW_REWIND_REPEATS
        } else {
            1
        };
        for _ in 0..repeats {
            let mut rest = &scratch[..];
            while !rest.is_empty()
                && shared.busy.load(Ordering::Acquire)
                && !shared.ring.gate().pending(Endpoint::Consumer)
            {
                let written = decoder.lock().unwrap().write(rest);
                match written {
                    Ok(n) => rest = &rest[n..],
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        std::thread::sleep(Duration::from_millis(1));
                    }
                    Err(e) => {
                        error!(error = %e, "decoder write failed");
                        set_sticky(&shared.status, Error::Io(e));
                        shared.busy.store(false, Ordering::Release);
                        break 'outer;
                    }
                }
            }
            shared.state.lock().unwrap().write_index = guard.index;
        }
    }
    shared.ring.gate().retire(Endpoint::Consumer);
    debug!("replay output thread ended");
}

/// Read one frame. A negative length means "to end of file"; a length past
/// the buffer capacity is clamped with an error log.
pub(crate) fn read_frame(
    file: &mut File,
    buf: &mut Vec<u8>,
    length: i32,
    max: usize,
) -> std::io::Result<usize> {
    let want = if length < 0 {
        max
    } else if length as usize > max {
        error!("frame larger than buffer ({} > {})", length, max);
        max
    } else {
        length as usize
    };
    buf.clear();
    buf.resize(want, 0);
    let mut n = 0;
    while n < want {
        match file.read(&mut buf[n..]) {
            Ok(0) => break,
            Ok(r) => n += r,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    buf.truncate(n);
    Ok(n)
}
