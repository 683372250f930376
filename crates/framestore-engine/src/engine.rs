//! The engine facade.
//!
//! Owns the capture and decoder devices and hands them to at most one
//! pipeline at a time: the underlying driver cannot record and replay
//! simultaneously, so recording, replay and transfer are mutually exclusive
//! and starting one stops the others first. Trick-mode operations forward
//! to the live replay pipeline and are no-ops without one. Dead pipelines
//! are reaped on status queries, so a pipeline that stopped itself after an
//! internal error is cleaned up the next time anyone asks.

use crate::config::EngineConfig;
use crate::cutter::Cutter;
use crate::device::{CaptureDevice, DecoderDevice, Remux};
use crate::pipeline::{default_emergency_handler, EmergencyHandler};
use crate::record::RecordPipeline;
use crate::replay::ReplayPipeline;
use crate::transfer::TransferPipeline;
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::error;

/// Builds a fresh remultiplexer for each pipeline that needs one.
pub type RemuxFactory = Box<dyn Fn() -> Box<dyn Remux> + Send + Sync>;

pub struct Engine {
    capture: Arc<Mutex<dyn CaptureDevice>>,
    decoder: Arc<Mutex<dyn DecoderDevice>>,
    remux_factory: RemuxFactory,
    config: EngineConfig,
    emergency: EmergencyHandler,
    audio_pids: (u16, u16),
    record: Option<RecordPipeline>,
    replay: Option<ReplayPipeline>,
    transfer: Option<TransferPipeline>,
    cutter: Option<Cutter>,
}

impl Engine {
    pub fn new(
        capture: impl CaptureDevice + 'static,
        decoder: impl DecoderDevice + 'static,
        remux_factory: RemuxFactory,
        config: EngineConfig,
    ) -> Self {
        Self {
            capture: Arc::new(Mutex::new(capture)),
            decoder: Arc::new(Mutex::new(decoder)),
            remux_factory,
            config,
            emergency: default_emergency_handler(),
            audio_pids: (0, 0),
            record: None,
            replay: None,
            transfer: None,
            cutter: None,
        }
    }

    /// Replace the handler fired when the capture watchdog declares the
    /// stream dead. The default aborts the process.
    pub fn with_emergency_handler(mut self, handler: EmergencyHandler) -> Self {
        self.emergency = handler;
        self
    }

    /// Audio pids of the currently tuned channel, used by the live track
    /// toggle when no replay is running.
    pub fn set_audio_pids(&mut self, primary: u16, secondary: u16) {
        self.audio_pids = (primary, secondary);
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // --- pipeline lifecycle ------------------------------------------------

    /// Whether a recording is running. Reaps a recording that died.
    pub fn recording(&mut self) -> bool {
        if self.record.as_ref().is_some_and(|p| !p.active()) {
            self.stop_record();
        }
        self.record.is_some()
    }

    /// Whether a replay is running. Reaps a replay that ended.
    pub fn replaying(&mut self) -> bool {
        if self.replay.as_ref().is_some_and(|p| !p.active()) {
            self.stop_replay();
        }
        self.replay.is_some()
    }

    /// Whether a transfer is running. Reaps a transfer that died.
    pub fn transferring(&mut self) -> bool {
        if self.transfer.as_ref().is_some_and(|p| !p.active()) {
            self.stop_transfer();
        }
        self.transfer.is_some()
    }

    /// Whether a cutting pass is running. Reaps a finished cutter.
    pub fn cutting(&mut self) -> bool {
        if self.cutter.as_ref().is_some_and(|c| !c.active()) {
            self.stop_cut();
        }
        self.cutter.is_some()
    }

    /// Start recording the capture stream into `dir`.
    pub fn start_record(&mut self, dir: &Path) -> Result<()> {
        if self.recording() {
            error!("start_record called while recording, ignored");
            return Err(Error::InvalidMode("already recording"));
        }
        self.stop_transfer();
        // the driver cannot record and replay at the same time
        self.stop_replay();
        let remux = (self.remux_factory)();
        let pipeline = RecordPipeline::start(
            self.capture.clone(),
            remux,
            dir,
            &self.config,
            self.emergency.clone(),
        )?;
        self.record = Some(pipeline);
        Ok(())
    }

    pub fn stop_record(&mut self) {
        if let Some(mut pipeline) = self.record.take() {
            pipeline.stop();
        }
    }

    /// Start replaying the recording in `dir`.
    pub fn start_replay(&mut self, dir: &Path) -> Result<()> {
        if self.recording() {
            error!("start_replay called while recording, ignored");
            return Err(Error::InvalidMode("recording active"));
        }
        self.stop_transfer();
        self.stop_replay();
        let pipeline = ReplayPipeline::start(self.decoder.clone(), dir, &self.config)?;
        self.replay = Some(pipeline);
        Ok(())
    }

    pub fn stop_replay(&mut self) {
        if let Some(mut pipeline) = self.replay.take() {
            pipeline.stop();
        }
    }

    /// Stream the capture device straight into the decoder.
    pub fn start_transfer(&mut self) -> Result<()> {
        if self.recording() {
            error!("start_transfer called while recording, ignored");
            return Err(Error::InvalidMode("recording active"));
        }
        self.stop_replay();
        self.stop_transfer();
        let pipeline = TransferPipeline::start(
            self.capture.clone(),
            self.decoder.clone(),
            (self.remux_factory)(),
            &self.config,
        )?;
        self.transfer = Some(pipeline);
        Ok(())
    }

    pub fn stop_transfer(&mut self) {
        if let Some(mut pipeline) = self.transfer.take() {
            pipeline.stop();
        }
    }

    /// Start cutting `source` along its editing marks. The edited version
    /// lands in a sibling directory derived from the source name, which is
    /// replaced if it already exists.
    pub fn start_cut(&mut self, source: &Path) -> Result<PathBuf> {
        if self.cutting() {
            return Err(Error::InvalidMode("already cutting"));
        }
        let dest = edited_path(source);
        if dest.exists() {
            std::fs::remove_dir_all(&dest)?;
        }
        self.cutter = Some(Cutter::start(source, &dest, &self.config)?);
        Ok(dest)
    }

    pub fn stop_cut(&mut self) {
        if let Some(mut cutter) = self.cutter.take() {
            cutter.stop();
        }
    }

    /// First sticky error of any pipeline, live or just reaped.
    pub fn status(&self) -> Option<Arc<Error>> {
        self.record
            .as_ref()
            .and_then(|p| p.status())
            .or_else(|| self.replay.as_ref().and_then(|p| p.status()))
            .or_else(|| self.transfer.as_ref().and_then(|p| p.status()))
            .or_else(|| self.cutter.as_ref().and_then(|c| c.status()))
    }

    // --- replay controls ---------------------------------------------------

    pub fn pause(&mut self) {
        if let Some(replay) = &self.replay {
            replay.pause();
        }
    }

    pub fn play(&mut self) {
        if let Some(replay) = &self.replay {
            replay.play();
        }
    }

    pub fn forward(&mut self) {
        if let Some(replay) = &self.replay {
            replay.forward();
        }
    }

    pub fn backward(&mut self) {
        if let Some(replay) = &self.replay {
            replay.backward();
        }
    }

    pub fn goto(&mut self, position: i32, still: bool) {
        if let Some(replay) = &self.replay {
            replay.goto(position, still);
        }
    }

    pub fn skip_seconds(&mut self, seconds: i32) {
        if let Some(replay) = &self.replay {
            replay.skip_seconds(seconds);
        }
    }

    pub fn skip_frames(&mut self, frames: i32) -> Option<i32> {
        self.replay.as_ref()?.skip_frames(frames)
    }

    pub fn get_index(&mut self, snap: bool) -> Option<(i32, i32)> {
        self.replay.as_ref()?.get_index(snap)
    }

    pub fn can_toggle_audio_track(&self) -> bool {
        match &self.replay {
            Some(replay) => replay.can_toggle_audio_track(),
            None => {
                let (a1, a2) = self.audio_pids;
                a1 != 0 && a2 != 0 && a1 != a2
            }
        }
    }

    /// Switch audio tracks: in replay by re-selecting the passed stream id,
    /// live by swapping the demultiplexed pids and retuning the transfer.
    pub fn toggle_audio_track(&mut self) -> bool {
        if let Some(replay) = &self.replay {
            replay.toggle_audio_track();
            return true;
        }
        if !self.can_toggle_audio_track() {
            return false;
        }
        self.audio_pids = (self.audio_pids.1, self.audio_pids.0);
        if let Err(e) = self
            .capture
            .lock()
            .unwrap()
            .set_audio_pids(self.audio_pids.0, self.audio_pids.1)
        {
            error!(error = %e, "can't reconfigure audio pids");
            return false;
        }
        if let Some(transfer) = &self.transfer {
            transfer.retune();
        }
        true
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop_record();
        self.stop_replay();
        self.stop_transfer();
        self.stop_cut();
    }
}

/// Directory of the edited version of a recording: the last path component
/// prefixed with `%`, next to the source.
pub fn edited_path(source: &Path) -> PathBuf {
    let name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    source.with_file_name(format!("%{}", name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edited_path_prefixes_last_component() {
        assert_eq!(
            edited_path(Path::new("/video/Movie")),
            Path::new("/video/%Movie")
        );
        assert_eq!(
            edited_path(Path::new("relative/rec")),
            Path::new("relative/%rec")
        );
    }
}
