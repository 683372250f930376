//! Facade behavior: mutual exclusion, trick-mode transitions, audio toggle.

mod common;

use common::*;
use framestore_engine::{edited_path, Engine, Error};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(10);
const FRAME_LEN: usize = 32;

fn noop_emergency() -> framestore_engine::EmergencyHandler {
    Arc::new(|| {})
}

fn engine_with(
    capture: ScriptedCapture,
    decoder: RecordingDecoder,
) -> Engine {
    Engine::new(capture, decoder, passthrough_factory(), test_config())
        .with_emergency_handler(noop_emergency())
}

/// A recording long enough that replay is still running while the test pokes
/// at it.
fn long_recording(dir: &Path) -> Vec<u8> {
    write_recording(dir, 400, 10, FRAME_LEN)
}

#[test]
fn test_record_and_replay_are_mutually_exclusive() {
    let tmp = tempfile::TempDir::new().unwrap();
    let rec = tmp.path().join("rec");
    long_recording(&rec);

    let capture = ScriptedCapture::new(gop_stream(100, 12, FRAME_LEN));
    let decoder = RecordingDecoder::new();
    let mut engine = engine_with(capture, decoder);

    engine.start_record(&tmp.path().join("new")).unwrap();
    assert!(engine.recording());

    // the driver cannot replay while recording
    match engine.start_replay(&rec) {
        Err(Error::InvalidMode(_)) => {}
        other => panic!("expected refusal, got {:?}", other),
    }
    assert!(!engine.replaying());

    // a second recording is refused as well
    assert!(matches!(
        engine.start_record(&tmp.path().join("other")),
        Err(Error::InvalidMode(_))
    ));
    engine.stop_record();
}

#[test]
fn test_starting_record_stops_replay() {
    let tmp = tempfile::TempDir::new().unwrap();
    let rec = tmp.path().join("rec");
    long_recording(&rec);

    let capture = ScriptedCapture::new(gop_stream(10, 12, FRAME_LEN));
    let decoder = RecordingDecoder::new();
    let mut engine = engine_with(capture.clone(), decoder);

    engine.start_replay(&rec).unwrap();
    assert!(engine.replaying());

    engine.start_record(&tmp.path().join("new")).unwrap();
    assert!(engine.recording());
    assert!(!engine.replaying());
    engine.stop_record();
}

#[test]
fn test_transfer_yields_to_recording() {
    let tmp = tempfile::TempDir::new().unwrap();
    let capture = ScriptedCapture::new(gop_stream(10, 12, FRAME_LEN));
    let decoder = RecordingDecoder::new();
    let mut engine = engine_with(capture, decoder);

    engine.start_transfer().unwrap();
    assert!(engine.transferring());

    engine.start_record(&tmp.path().join("new")).unwrap();
    assert!(engine.recording());
    assert!(!engine.transferring());
    engine.stop_record();
}

#[test]
fn test_pause_and_resume_keep_buffer() {
    let tmp = tempfile::TempDir::new().unwrap();
    let rec = tmp.path().join("rec");
    long_recording(&rec);
    let decoder = RecordingDecoder::new();
    let mut engine = engine_with(ScriptedCapture::default(), decoder.clone());
    engine.start_replay(&rec).unwrap();
    assert!(wait_until(|| decoder.written_len() > 0, TIMEOUT));

    use common::DecoderCommand::*;
    let before = decoder.command_count();
    engine.pause();
    assert_eq!(decoder.commands_since(before), vec![Freeze, Mute(true)]);

    let before = decoder.command_count();
    engine.pause();
    assert_eq!(decoder.commands_since(before), vec![Resume, Mute(false)]);
    engine.stop_replay();
}

#[test]
fn test_forward_flushes_and_mutes() {
    let tmp = tempfile::TempDir::new().unwrap();
    let rec = tmp.path().join("rec");
    long_recording(&rec);
    let decoder = RecordingDecoder::new();
    let mut engine = engine_with(ScriptedCapture::default(), decoder.clone());
    engine.start_replay(&rec).unwrap();
    assert!(wait_until(|| decoder.written_len() > 0, TIMEOUT));

    use common::DecoderCommand::*;
    let before = decoder.command_count();
    engine.forward();
    assert_eq!(
        decoder.commands_since(before),
        vec![ClearBuffer, AvSync(false), Mute(true)]
    );

    // toggling fast forward off flips straight back to play
    let before = decoder.command_count();
    engine.forward();
    assert_eq!(
        decoder.commands_since(before),
        vec![ClearBuffer, AvSync(true), Mute(false)]
    );
    engine.stop_replay();
}

#[test]
fn test_backward_flushes_and_mutes() {
    let tmp = tempfile::TempDir::new().unwrap();
    let rec = tmp.path().join("rec");
    long_recording(&rec);
    let decoder = RecordingDecoder::new();
    let mut engine = engine_with(ScriptedCapture::default(), decoder.clone());
    engine.start_replay(&rec).unwrap();
    assert!(wait_until(|| decoder.written_len() > 0, TIMEOUT));

    use common::DecoderCommand::*;
    let before = decoder.command_count();
    engine.backward();
    assert_eq!(
        decoder.commands_since(before),
        vec![ClearBuffer, AvSync(false), Mute(true)]
    );
    engine.stop_replay();
}

#[test]
fn test_slow_motion_from_pause() {
    let tmp = tempfile::TempDir::new().unwrap();
    let rec = tmp.path().join("rec");
    long_recording(&rec);
    let decoder = RecordingDecoder::new();
    let mut engine = engine_with(ScriptedCapture::default(), decoder.clone());
    engine.start_replay(&rec).unwrap();
    assert!(wait_until(|| decoder.written_len() > 0, TIMEOUT));

    use common::DecoderCommand::*;
    engine.pause();
    let before = decoder.command_count();
    engine.forward();
    // paused fast forward is slow motion, no flush needed
    assert_eq!(
        decoder.commands_since(before),
        vec![SlowMotion(2), AvSync(false), Mute(true)]
    );
    engine.stop_replay();
}

#[test]
fn test_goto_still_displays_snapped_frame() {
    let tmp = tempfile::TempDir::new().unwrap();
    let rec = tmp.path().join("rec");
    let stream = long_recording(&rec);
    let decoder = RecordingDecoder::new();
    let mut engine = engine_with(ScriptedCapture::default(), decoder.clone());
    engine.start_replay(&rec).unwrap();
    assert!(wait_until(|| decoder.written_len() > 0, TIMEOUT));

    // frame 15 snaps backward to the intra frame at 10
    engine.goto(15, true);
    let frame_10 = stream[10 * FRAME_LEN..11 * FRAME_LEN].to_vec();
    let stills: Vec<_> = decoder
        .commands()
        .into_iter()
        .filter_map(|c| match c {
            DecoderCommand::StillPicture(payload) => Some(payload),
            _ => None,
        })
        .collect();
    assert_eq!(stills, vec![frame_10]);

    // still mode reports the read position
    let (current, total) = engine.get_index(false).unwrap();
    assert_eq!(current, 10);
    assert_eq!(total, 3999);
    engine.stop_replay();
}

#[test]
fn test_skip_frames_previews_snapped_target() {
    let tmp = tempfile::TempDir::new().unwrap();
    let rec = tmp.path().join("rec");
    long_recording(&rec);
    let decoder = RecordingDecoder::new();
    let mut engine = engine_with(ScriptedCapture::default(), decoder.clone());
    engine.start_replay(&rec).unwrap();
    assert!(wait_until(|| decoder.written_len() > 0, TIMEOUT));

    engine.goto(100, true); // park at frame 100, an intra frame
    let target = engine.skip_frames(25).unwrap();
    // 100 + 25 snaps forward to the next intra frame
    assert_eq!(target, 130);
    let back = engine.skip_frames(-25).unwrap();
    assert_eq!(back, 70);
    engine.stop_replay();
}

#[test]
fn test_live_audio_toggle_swaps_pids() {
    let capture = ScriptedCapture::default();
    let decoder = RecordingDecoder::new();
    let mut engine = engine_with(capture.clone(), decoder);

    assert!(!engine.can_toggle_audio_track());
    engine.set_audio_pids(100, 101);
    assert!(engine.can_toggle_audio_track());
    assert!(engine.toggle_audio_track());
    assert_eq!(capture.audio_pids(), Some((101, 100)));
}

#[test]
fn test_start_cut_uses_derived_name() {
    let tmp = tempfile::TempDir::new().unwrap();
    let rec = tmp.path().join("rec");
    write_recording(&rec, 5, 12, FRAME_LEN);
    {
        let mut marks = framestore_engine::Marks::new(&rec);
        marks.add(12);
        marks.add(24);
        marks.save().unwrap();
    }

    let mut engine = engine_with(ScriptedCapture::default(), RecordingDecoder::new());
    let dest = engine.start_cut(&rec).unwrap();
    assert_eq!(dest, edited_path(&rec));
    assert!(wait_until(|| !engine.cutting(), TIMEOUT));
    assert!(engine.status().is_none());
    assert!(dest.join("001.vdr").exists());
    assert!(dest.join("index.vdr").exists());
}
