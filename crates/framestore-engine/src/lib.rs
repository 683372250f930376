//! Recording, replay and cutting engine for segmented MPEG program streams.
//!
//! The engine ingests a live transport stream from a capture device,
//! remultiplexes it into a program stream, and writes it as numbered
//! segment files with a frame-accurate index. Recordings replay with trick
//! modes (pause, still, slow and fast motion in both directions, skips) and
//! can be edited non-destructively by a mark-driven copy pass.
//!
//! ## Architecture
//!
//! ```text
//! capture ──▶ byte ring ──▶ remux ──▶ {NNN.vdr, index.vdr}   (record)
//! {NNN.vdr, index.vdr} ──▶ frame ring ──▶ decoder            (replay)
//! {NNN.vdr, index.vdr} ──▶ copy pass ──▶ {NNN.vdr, index.vdr} (cut)
//! ```
//!
//! Each pipeline runs two OS threads around a bounded ring; the cutter runs
//! one. The [`engine::Engine`] facade owns the devices, enforces that at
//! most one of recording, replay and transfer is active, and forwards the
//! trick-mode controls.

pub mod audio;
pub mod config;
pub mod cutter;
pub mod device;
pub mod engine;
pub mod error;
pub mod fileset;
pub mod index;
pub mod marks;
mod pipeline;
pub mod record;
pub mod replay;
pub mod ring;
pub mod transfer;

pub use config::EngineConfig;
pub use cutter::Cutter;
pub use device::{CaptureDevice, CaptureMode, CaptureRead, DecoderDevice, DecoderSource, Remux, RemuxedFrame};
pub use engine::{edited_path, Engine, RemuxFactory};
pub use error::{Error, Result};
pub use fileset::{segment_path, FileSet, FileSetMode, MAX_FILES_PER_RECORDING};
pub use index::{IndexFile, IndexRef, ResumeFile, INDEX_FILE_NAME, RESUME_FILE_NAME};
pub use marks::{Marks, MARKS_FILE_NAME};
pub use pipeline::EmergencyHandler;
pub use record::RecordPipeline;
pub use replay::{PlayState, ReplayPipeline};
pub use ring::{ByteRing, FrameRing};
pub use transfer::TransferPipeline;
