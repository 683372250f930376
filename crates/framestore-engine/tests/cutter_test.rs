//! Cutting scenarios: mark-driven copy passes over prepared recordings.

mod common;

use common::*;
use framestore_core::PictureType;
use framestore_engine::{Cutter, EngineConfig, Error, IndexFile, Marks};

const FRAME_LEN: usize = 20;

/// Source with intra frames at 0, 12, 24, 36, 48 (five groups of twelve).
fn standard_source(dir: &std::path::Path) -> Vec<u8> {
    write_recording(dir, 5, 12, FRAME_LEN)
}

fn save_marks(dir: &std::path::Path, frames: &[i32]) {
    let mut marks = Marks::new(dir);
    for &frame in frames {
        marks.add(frame);
    }
    marks.save().unwrap();
}

#[test]
fn test_cut_two_sections() {
    let tmp = tempfile::TempDir::new().unwrap();
    let src = tmp.path().join("rec");
    let dst = tmp.path().join("%rec");
    let stream = standard_source(&src);
    save_marks(&src, &[12, 24, 36, 48]);

    let mut cutter = Cutter::start(&src, &dst, &test_config()).unwrap();
    cutter.wait();
    assert!(cutter.status().is_none());

    // 12 + 12 surviving frames
    let mut index = IndexFile::load(&dst, 0).unwrap().unwrap();
    assert_eq!(index.last(), 23);
    assert_eq!(index.get(0).unwrap().picture_type, PictureType::I);
    assert_eq!(index.get(12).unwrap().picture_type, PictureType::I);

    // the seams of the edit are visible in the derived mark list
    let marks = Marks::load(&dst).unwrap();
    assert_eq!(marks.frames(), &[0, 11, 12, 23]);

    // destination bytes are the two source sections, back to back
    let mut expected = stream[12 * FRAME_LEN..24 * FRAME_LEN].to_vec();
    expected.extend_from_slice(&stream[36 * FRAME_LEN..48 * FRAME_LEN]);
    assert_eq!(std::fs::read(dst.join("001.vdr")).unwrap(), expected);
}

#[test]
fn test_cut_whole_recording_reproduces_index() {
    let tmp = tempfile::TempDir::new().unwrap();
    let src = tmp.path().join("rec");
    let dst = tmp.path().join("%rec");
    let stream = standard_source(&src);
    save_marks(&src, &[0, 60]);

    let mut cutter = Cutter::start(&src, &dst, &test_config()).unwrap();
    cutter.wait();
    assert!(cutter.status().is_none());

    // a full-range cut reproduces both segment and index bit for bit
    assert_eq!(std::fs::read(dst.join("001.vdr")).unwrap(), stream);
    assert_eq!(
        std::fs::read(dst.join("index.vdr")).unwrap(),
        std::fs::read(src.join("index.vdr")).unwrap()
    );
}

#[test]
fn test_cut_trailing_cut_in_runs_to_end() {
    let tmp = tempfile::TempDir::new().unwrap();
    let src = tmp.path().join("rec");
    let dst = tmp.path().join("%rec");
    let stream = standard_source(&src);
    save_marks(&src, &[12]);

    let mut cutter = Cutter::start(&src, &dst, &test_config()).unwrap();
    cutter.wait();
    assert!(cutter.status().is_none());

    let mut index = IndexFile::load(&dst, 0).unwrap().unwrap();
    assert_eq!(index.last(), 47);
    assert_eq!(
        std::fs::read(dst.join("001.vdr")).unwrap(),
        stream[12 * FRAME_LEN..]
    );
    let marks = Marks::load(&dst).unwrap();
    assert_eq!(marks.frames(), &[0, 47]);
}

#[test]
fn test_cut_rollover_splits_destination() {
    let tmp = tempfile::TempDir::new().unwrap();
    let src = tmp.path().join("rec");
    let dst = tmp.path().join("%rec");
    standard_source(&src);
    save_marks(&src, &[0, 60]);

    // one group of pictures is 240 bytes, so every intra frame after the
    // first one triggers a destination rollover
    let config = EngineConfig {
        max_file_size: 100,
        ..test_config()
    };
    let mut cutter = Cutter::start(&src, &dst, &config).unwrap();
    cutter.wait();
    assert!(cutter.status().is_none());

    let mut index = IndexFile::load(&dst, 0).unwrap().unwrap();
    assert_eq!(index.last(), 59);
    for number in 1..=5u8 {
        assert_eq!(
            std::fs::metadata(dst.join(format!("{:03}.vdr", number)))
                .unwrap()
                .len(),
            12 * FRAME_LEN as u64,
            "segment {:03}",
            number
        );
    }
    // every destination segment opens with an intra frame at offset 0
    for f in 0..=59 {
        let r = index.get(f).unwrap();
        assert_eq!(r.offset == 0, r.picture_type == PictureType::I);
        assert_eq!(r.file_number as i32, f / 12 + 1);
    }
}

#[test]
fn test_cut_without_marks_is_refused() {
    let tmp = tempfile::TempDir::new().unwrap();
    let src = tmp.path().join("rec");
    let dst = tmp.path().join("%rec");
    standard_source(&src);

    match Cutter::start(&src, &dst, &test_config()) {
        Err(Error::NoMarks { .. }) => {}
        other => panic!("expected NoMarks, got {:?}", other.map(|_| ())),
    }
    assert!(!dst.exists());
}

#[test]
fn test_cut_rejects_mark_off_intra_frame() {
    let tmp = tempfile::TempDir::new().unwrap();
    let src = tmp.path().join("rec");
    let dst = tmp.path().join("%rec");
    standard_source(&src);
    save_marks(&src, &[13, 24]);

    match Cutter::start(&src, &dst, &test_config()) {
        Err(Error::MarkNotOnIntraFrame { frame: 13 }) => {}
        other => panic!("expected mark rejection, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_cut_cancellation_is_cooperative() {
    let tmp = tempfile::TempDir::new().unwrap();
    let src = tmp.path().join("rec");
    let dst = tmp.path().join("%rec");
    write_recording(&src, 500, 12, FRAME_LEN);
    save_marks(&src, &[0, 6000]);

    let mut cutter = Cutter::start(&src, &dst, &test_config()).unwrap();
    cutter.stop();
    assert!(!cutter.active());
    // whatever was copied before the cancel stayed entry-aligned
    if let Some(mut index) = IndexFile::load(&dst, 0).unwrap() {
        let _ = index.last();
    }
}
