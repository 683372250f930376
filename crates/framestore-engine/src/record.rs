//! The recording pipeline.
//!
//! Two threads cooperate through a bounded byte ring:
//!
//! ```text
//! capture device ──input thread──▶ byte ring ──output thread──▶ remux
//!                                                   │
//!                                                   ├─▶ NNN.vdr segments
//!                                                   └─▶ index.vdr entries
//! ```
//!
//! The input thread only moves bytes and watches stream health: if the
//! capture device delivers nothing for the watchdog interval, the stream is
//! declared broken and the engine's emergency handler fires. The output
//! thread drives the remultiplexer, applies the segment rollover policy
//! (new file at an intra frame once the current one is full or disk space
//! runs low) and appends one index entry per picture-bearing frame.
//!
//! Stopping is deliberately not immediate: the output thread keeps writing
//! until the next intra frame so the final group of pictures on disk is
//! complete, which is why the last frame of a recording is never an intra
//! frame.

use crate::config::EngineConfig;
use crate::device::{CaptureDevice, CaptureRead, CaptureMode, Remux};
use crate::fileset::{segment_path, FileSet, FileSetMode};
use crate::index::IndexFile;
use crate::pipeline::{
    join_deadline, new_status, set_sticky, sticky, EmergencyHandler, Status, STOP_DEADLINE,
};
use crate::ring::ByteRing;
use crate::{Error, Result};
use framestore_core::PictureType;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

pub struct RecordPipeline {
    dir: PathBuf,
    busy: Arc<AtomicBool>,
    ring: Arc<ByteRing>,
    capture: Arc<Mutex<dyn CaptureDevice>>,
    status: Status,
    input: Option<JoinHandle<()>>,
    output: Option<JoinHandle<()>>,
}

impl RecordPipeline {
    /// Create the recording directory, open the first segment and the index,
    /// switch the capture device to record mode and start both threads.
    pub fn start(
        capture: Arc<Mutex<dyn CaptureDevice>>,
        remux: Box<dyn Remux>,
        dir: &Path,
        config: &EngineConfig,
        emergency: EmergencyHandler,
    ) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        info!(dir = %dir.display(), "record");

        let mut files = FileSet::new(dir, FileSetMode::Write);
        files.open(1, 0)?;

        let index = match IndexFile::create(dir, config.tail_guard) {
            Ok(index) => Some(index),
            Err(e) => {
                // keep the recording even without an index
                error!(dir = %dir.display(), error = %e, "can't create index, recording without it");
                None
            }
        };

        capture.lock().unwrap().set_mode(CaptureMode::Record)?;

        let busy = Arc::new(AtomicBool::new(true));
        let ring = Arc::new(ByteRing::new(config.ring_capacity));
        let status = new_status();

        let input = {
            let capture = capture.clone();
            let ring = ring.clone();
            let busy = busy.clone();
            let status = status.clone();
            let chunk = config.capture_chunk;
            let watchdog = Duration::from_secs(config.watchdog_secs);
            std::thread::Builder::new()
                .name("record-input".into())
                .spawn(move || input_loop(capture, ring, busy, status, chunk, watchdog, emergency))
                .map_err(Error::Io)?
        };

        let output = {
            let ring = ring.clone();
            let busy = busy.clone();
            let status = status.clone();
            let config = config.clone();
            std::thread::Builder::new()
                .name("record-output".into())
                .spawn(move || output_loop(remux, ring, files, index, busy, status, config))
                .map_err(Error::Io)?
        };

        Ok(Self {
            dir: dir.to_path_buf(),
            busy,
            ring,
            capture,
            status,
            input: Some(input),
            output: Some(output),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Whether both threads are still running normally.
    pub fn active(&self) -> bool {
        self.busy.load(Ordering::Acquire)
            && !self.input.as_ref().is_some_and(|h| h.is_finished())
            && !self.output.as_ref().is_some_and(|h| h.is_finished())
    }

    /// First error that stopped or degraded the pipeline, if any.
    pub fn status(&self) -> Option<Arc<Error>> {
        sticky(&self.status)
    }

    /// Stop both threads and return the capture device to normal mode.
    pub fn stop(&mut self) {
        self.busy.store(false, Ordering::Release);
        self.ring.wake_all();
        if let Some(handle) = self.input.take() {
            join_deadline(handle, "record-input", STOP_DEADLINE);
        }
        if let Some(handle) = self.output.take() {
            join_deadline(handle, "record-output", STOP_DEADLINE);
        }
        if let Err(e) = self.capture.lock().unwrap().set_mode(CaptureMode::Normal) {
            warn!(error = %e, "can't return capture device to normal mode");
        }
        info!(dir = %self.dir.display(), "recording stopped");
    }
}

impl Drop for RecordPipeline {
    fn drop(&mut self) {
        if self.busy.load(Ordering::Acquire) || self.input.is_some() || self.output.is_some() {
            self.stop();
        }
    }
}

fn input_loop(
    capture: Arc<Mutex<dyn CaptureDevice>>,
    ring: Arc<ByteRing>,
    busy: Arc<AtomicBool>,
    status: Status,
    chunk: usize,
    watchdog: Duration,
    emergency: EmergencyHandler,
) {
    debug!("record input thread started");
    let mut buf = vec![0u8; chunk];
    let mut last_data = Instant::now();
    while busy.load(Ordering::Acquire) {
        let read = capture.lock().unwrap().read(&mut buf);
        match read {
            Ok(CaptureRead::Data(n)) if n > 0 => {
                let mut rest = &buf[..n];
                while !rest.is_empty() && busy.load(Ordering::Acquire) {
                    let taken = ring.put(rest);
                    rest = &rest[taken..];
                    if taken == 0 {
                        ring.wait_space(Duration::from_millis(10));
                    }
                }
                last_data = Instant::now();
            }
            Ok(CaptureRead::Data(_)) | Ok(CaptureRead::Again) => {
                std::thread::sleep(Duration::from_millis(1));
            }
            Ok(CaptureRead::Overflow) => {
                warn!("capture device overflow");
            }
            Err(e) => {
                error!(error = %e, "capture read failed");
                set_sticky(&status, Error::Io(e));
                break;
            }
        }
        if last_data.elapsed() >= watchdog {
            error!("video data stream broken");
            set_sticky(
                &status,
                Error::CaptureStalled {
                    seconds: watchdog.as_secs(),
                },
            );
            emergency();
            last_data = Instant::now();
        }
    }
    debug!("record input thread ended");
}

fn output_loop(
    mut remux: Box<dyn Remux>,
    ring: Arc<ByteRing>,
    mut files: FileSet,
    mut index: Option<IndexFile>,
    busy: Arc<AtomicBool>,
    status: Status,
    config: EngineConfig,
) {
    debug!("record output thread started");
    let mut staging = vec![0u8; config.capture_chunk];
    let mut pending = 0usize;
    let mut file_size: u64 = 0;
    let mut disk = DiskWatch::new(
        config.min_free_disk,
        Duration::from_secs(config.disk_check_secs),
    );
    loop {
        let stopping = !busy.load(Ordering::Acquire);
        let got = ring.get(&mut staging[pending..]);
        if got == 0 && pending == 0 {
            if stopping {
                break;
            }
            ring.wait_data(Duration::from_millis(10));
            continue;
        }
        pending += got;

        let (consumed, completed) = remux.process(&staging[..pending]);
        let had_frame = completed.is_some();
        if let Some(frame) = completed {
            let picture = frame.picture_type;
            if stopping && picture.is_intra() {
                // finish the recording right before the next intra frame
                break;
            }
            // only intra frames may open a segment, so only they probe
            let low_disk = if picture.is_intra() {
                disk.low(files.dir())
            } else {
                None
            };
            if picture.is_intra() && (file_size > config.max_file_size || low_disk.is_some()) {
                match files.next() {
                    Ok(_) => file_size = 0,
                    Err(e) => {
                        error!(error = %e, "segment rollover failed");
                        // a rollover forced by disk pressure that then fails
                        // is reported as the disk condition itself
                        match low_disk {
                            Some(free_mb) => set_sticky(&status, Error::DiskLow { free_mb }),
                            None => set_sticky(&status, e),
                        }
                        break;
                    }
                }
            }
            if picture != PictureType::None {
                if let Some(idx) = index.as_mut() {
                    if idx.write(picture, files.number(), file_size as i32).is_err() {
                        // the index closed itself; the recording goes on
                        warn!("continuing recording without index");
                        index = None;
                    }
                }
            }
            let path = segment_path(files.dir(), files.number());
            let Some(file) = files.file() else {
                set_sticky(&status, Error::WriteFailed { file: path });
                break;
            };
            if let Err(e) = std::io::Write::write_all(file, frame.data) {
                error!(file = %path.display(), error = %e, "segment write failed");
                set_sticky(&status, Error::WriteFailed { file: path });
                break;
            }
            file_size += frame.data.len() as u64;
        }

        if consumed > 0 {
            staging.copy_within(consumed..pending, 0);
            pending -= consumed;
        }
        if !had_frame && got == 0 {
            if stopping {
                break;
            }
            ring.wait_data(Duration::from_millis(10));
        }
    }
    busy.store(false, Ordering::Release);
    debug!("record output thread ended");
}

/// Rate-limited free-space probe behind the rollover policy.
struct DiskWatch {
    min_free: u64,
    interval: Duration,
    last_check: Instant,
}

impl DiskWatch {
    fn new(min_free: u64, interval: Duration) -> Self {
        Self {
            min_free,
            interval,
            last_check: Instant::now(),
        }
    }

    /// Free megabytes when the floor is undercut, `None` otherwise.
    fn low(&mut self, dir: &Path) -> Option<u64> {
        if self.min_free == 0 || self.last_check.elapsed() < self.interval {
            return None;
        }
        self.last_check = Instant::now();
        match fs2::available_space(dir) {
            Ok(free) if free < self.min_free => {
                let free_mb = free / (1024 * 1024);
                info!(
                    free_mb,
                    limit_mb = self.min_free / (1024 * 1024),
                    "low disk space"
                );
                Some(free_mb)
            }
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "can't determine free disk space");
                None
            }
        }
    }
}
