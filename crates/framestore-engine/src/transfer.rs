//! The transfer pipeline.
//!
//! Streams one capture device straight into a decoder: structurally a
//! recording whose sink is the decoder instead of segment files. The input
//! thread reads the capture device and remultiplexes; the output thread
//! drains the byte ring into the decoder. Output holds off until the ring
//! has built up one frame's worth of reserve, so the decoder never starves
//! right after startup or a retune.

use crate::config::EngineConfig;
use crate::device::{CaptureDevice, CaptureMode, CaptureRead, DecoderDevice, Remux};
use crate::pipeline::{join_deadline, new_status, set_sticky, sticky, Status, STOP_DEADLINE};
use crate::ring::ByteRing;
use crate::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub struct TransferPipeline {
    busy: Arc<AtomicBool>,
    ring: Arc<ByteRing>,
    reserve_pending: Arc<AtomicBool>,
    capture: Arc<Mutex<dyn CaptureDevice>>,
    decoder: Arc<Mutex<dyn DecoderDevice>>,
    status: Status,
    input: Option<JoinHandle<()>>,
    output: Option<JoinHandle<()>>,
}

impl TransferPipeline {
    pub fn start(
        capture: Arc<Mutex<dyn CaptureDevice>>,
        decoder: Arc<Mutex<dyn DecoderDevice>>,
        remux: Box<dyn Remux>,
        config: &EngineConfig,
    ) -> Result<Self> {
        info!("transfer");
        capture.lock().unwrap().set_mode(CaptureMode::Record)?;

        let busy = Arc::new(AtomicBool::new(true));
        let ring = Arc::new(ByteRing::new(config.ring_capacity));
        let reserve_pending = Arc::new(AtomicBool::new(true));
        let status = new_status();

        let input = {
            let capture = capture.clone();
            let ring = ring.clone();
            let busy = busy.clone();
            let status = status.clone();
            let chunk = config.capture_chunk;
            std::thread::Builder::new()
                .name("transfer-input".into())
                .spawn(move || input_loop(capture, remux, ring, busy, status, chunk))
                .map_err(Error::Io)?
        };

        let output = {
            let decoder = decoder.clone();
            let ring = ring.clone();
            let busy = busy.clone();
            let status = status.clone();
            let reserve_pending = reserve_pending.clone();
            let reserve = config.max_frame_size;
            let chunk = config.capture_chunk;
            std::thread::Builder::new()
                .name("transfer-output".into())
                .spawn(move || {
                    output_loop(decoder, ring, busy, status, reserve_pending, reserve, chunk)
                })
                .map_err(Error::Io)?
        };

        Ok(Self {
            busy,
            ring,
            reserve_pending,
            capture,
            decoder,
            status,
            input: Some(input),
            output: Some(output),
        })
    }

    pub fn active(&self) -> bool {
        self.busy.load(Ordering::Acquire)
            && !self.input.as_ref().is_some_and(|h| h.is_finished())
            && !self.output.as_ref().is_some_and(|h| h.is_finished())
    }

    pub fn status(&self) -> Option<Arc<Error>> {
        sticky(&self.status)
    }

    /// Drop buffered data after a tuning change and rebuild the reserve.
    pub fn retune(&self) {
        self.ring.clear();
        if let Err(e) = self.decoder.lock().unwrap().clear_buffer() {
            warn!(error = %e, "decoder command failed");
        }
        self.reserve_pending.store(true, Ordering::Release);
    }

    pub fn stop(&mut self) {
        self.busy.store(false, Ordering::Release);
        self.ring.wake_all();
        if let Some(handle) = self.input.take() {
            join_deadline(handle, "transfer-input", STOP_DEADLINE);
        }
        if let Some(handle) = self.output.take() {
            join_deadline(handle, "transfer-output", STOP_DEADLINE);
        }
        if let Err(e) = self.capture.lock().unwrap().set_mode(CaptureMode::Normal) {
            warn!(error = %e, "can't return capture device to normal mode");
        }
        info!("transfer stopped");
    }
}

impl Drop for TransferPipeline {
    fn drop(&mut self) {
        if self.input.is_some() || self.output.is_some() {
            self.stop();
        }
    }
}

fn input_loop(
    capture: Arc<Mutex<dyn CaptureDevice>>,
    mut remux: Box<dyn Remux>,
    ring: Arc<ByteRing>,
    busy: Arc<AtomicBool>,
    status: Status,
    chunk: usize,
) {
    debug!("transfer input thread started");
    let mut buf = vec![0u8; chunk];
    let mut pending = 0usize;
    while busy.load(Ordering::Acquire) {
        let read = capture.lock().unwrap().read(&mut buf[pending..]);
        match read {
            Ok(CaptureRead::Data(n)) if n > 0 => {
                pending += n;
                let (consumed, completed) = remux.process(&buf[..pending]);
                if let Some(frame) = completed {
                    let mut rest = frame.data;
                    while !rest.is_empty() && busy.load(Ordering::Acquire) {
                        let taken = ring.put(rest);
                        rest = &rest[taken..];
                        if taken == 0 {
                            ring.wait_space(Duration::from_millis(10));
                        }
                    }
                }
                if consumed > 0 {
                    buf.copy_within(consumed..pending, 0);
                    pending -= consumed;
                }
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
    }
    debug!("transfer input thread ended");
}

fn output_loop(
    decoder: Arc<Mutex<dyn DecoderDevice>>,
    ring: Arc<ByteRing>,
    busy: Arc<AtomicBool>,
    status: Status,
    reserve_pending: Arc<AtomicBool>,
    reserve: usize,
    chunk: usize,
) {
    debug!("transfer output thread started");
    let mut buf = vec![0u8; chunk];
    while busy.load(Ordering::Acquire) {
        if reserve_pending.load(Ordering::Acquire) {
            if ring.available() < reserve {
                // let the buffer collect some reserve first
                std::thread::sleep(Duration::from_millis(100));
                continue;
            }
            reserve_pending.store(false, Ordering::Release);
        }
        let got = ring.get(&mut buf);
        if got == 0 {
            ring.wait_data(Duration::from_millis(10));
            continue;
        }
        let mut rest = &buf[..got];
        while !rest.is_empty() && busy.load(Ordering::Acquire) {
            let written = decoder.lock().unwrap().write(rest);
            match written {
                Ok(n) => rest = &rest[n..],
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(Duration::from_millis(1));
                }
                Err(e) => {
                    error!(error = %e, "decoder write failed");
                    set_sticky(&status, Error::Io(e));
                    busy.store(false, Ordering::Release);
                    break;
                }
            }
        }
    }
    debug!("transfer output thread ended");
}
