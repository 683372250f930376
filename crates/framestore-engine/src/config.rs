//! Engine configuration.
//!
//! Controls segment rollover, ring sizing, trick-mode behavior and the
//! capture watchdog:
//!
//! - **max_file_size**: roll a segment when it grows past this (default 1 GiB;
//!   the actual file may exceed it by one group of pictures, because rollover
//!   waits for the next intra frame)
//! - **min_free_disk**: force a premature rollover below this much free space
//!   (default 512 MiB, 0 disables the probe)
//! - **tail_guard**: how many entries a forward intra-frame search stays away
//!   from the live end of a growing index
//! - **audio_command**: optional external command that receives AC-3 payloads
//!   on its stdin during replay
//!
//! ## Usage
//!
//! ```ignore
//! use framestore_engine::EngineConfig;
//!
//! // Test config: tiny segments, no disk probe, no tail guard
//! let config = EngineConfig {
//!     max_file_size: 1024,
//!     min_free_disk: 0,
//!     tail_guard: 0,
//!     ..Default::default()
//! };
//! ```

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Soft maximum size of one segment file in bytes (default: 1 GiB).
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Free-space floor in bytes below which a rollover is forced
    /// (default: 512 MiB; 0 disables the free-space probe).
    #[serde(default = "default_min_free_disk")]
    pub min_free_disk: u64,

    /// Seconds between free-space probes (default: 100).
    #[serde(default = "default_disk_check_secs")]
    pub disk_check_secs: u64,

    /// Capacity of the byte ring between capture and writer (default: 1 MiB).
    #[serde(default = "default_ring_capacity")]
    pub ring_capacity: usize,

    /// Maximum size of a single frame in bytes (default: 192 KiB).
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,

    /// Size of one capture read in bytes (default: 180 KiB).
    #[serde(default = "default_capture_chunk")]
    pub capture_chunk: usize,

    /// Entries a forward intra-frame search keeps between itself and the
    /// live end of a growing index (default: 100).
    #[serde(default = "default_tail_guard")]
    pub tail_guard: i32,

    /// Seconds to back up when saving the resume position (default: 10).
    #[serde(default = "default_resume_backup_secs")]
    pub resume_backup_secs: i32,

    /// Seconds without capture data before the stream counts as broken
    /// (default: 30).
    #[serde(default = "default_watchdog_secs")]
    pub watchdog_secs: u64,

    /// External command fed AC-3 audio payloads on stdin during replay.
    #[serde(default)]
    pub audio_command: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            min_free_disk: default_min_free_disk(),
            disk_check_secs: default_disk_check_secs(),
            ring_capacity: default_ring_capacity(),
            max_frame_size: default_max_frame_size(),
            capture_chunk: default_capture_chunk(),
            tail_guard: default_tail_guard(),
            resume_backup_secs: default_resume_backup_secs(),
            watchdog_secs: default_watchdog_secs(),
            audio_command: None,
        }
    }
}

fn default_max_file_size() -> u64 {
    1024 * 1024 * 1024 // 1 GiB
}

fn default_min_free_disk() -> u64 {
    512 * 1024 * 1024 // 512 MiB
}

fn default_disk_check_secs() -> u64 {
    100
}

fn default_ring_capacity() -> usize {
    1024 * 1024 // 1 MiB
}

fn default_max_frame_size() -> usize {
    192 * 1024
}

fn default_capture_chunk() -> usize {
    180 * 1024
}

fn default_tail_guard() -> i32 {
    100
}

fn default_resume_backup_secs() -> i32 {
    10
}

fn default_watchdog_secs() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_file_size, 1024 * 1024 * 1024);
        assert_eq!(config.min_free_disk, 512 * 1024 * 1024);
        assert_eq!(config.disk_check_secs, 100);
        assert_eq!(config.ring_capacity, 1024 * 1024);
        assert_eq!(config.tail_guard, 100);
        assert_eq!(config.resume_backup_secs, 10);
        assert_eq!(config.watchdog_secs, 30);
        assert!(config.audio_command.is_none());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"max_file_size": 1024, "tail_guard": 0}"#).unwrap();
        assert_eq!(config.max_file_size, 1024);
        assert_eq!(config.tail_guard, 0);
        // untouched fields fall back to defaults
        assert_eq!(config.watchdog_secs, 30);
        assert_eq!(config.max_frame_size, 192 * 1024);
    }

    #[test]
    fn test_deserialize_audio_command() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"audio_command": "ac3play -"}"#).unwrap();
        assert_eq!(config.audio_command.as_deref(), Some("ac3play -"));
    }
}
