//! Numbered segment files of one recording.
//!
//! A recording is a concatenation of segment files `001.vdr` .. `255.vdr` in
//! a single directory. `FileSet` owns at most one open handle at a time and
//! exposes the mechanics of moving between segments; the rollover *policy*
//! (when to move) belongs to the recorder and cutter.

use crate::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, error};

/// Highest segment file number in one recording.
pub const MAX_FILES_PER_RECORDING: u8 = 255;

/// Access mode of a file set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileSetMode {
    Read,
    Write,
}

/// Scoped access to the numbered segment files of a recording directory.
pub struct FileSet {
    dir: PathBuf,
    mode: FileSetMode,
    number: u8,
    file: Option<File>,
}

/// Path of segment file `number` inside `dir`.
pub fn segment_path(dir: &Path, number: u8) -> PathBuf {
    dir.join(format!("{:03}.vdr", number))
}

impl FileSet {
    pub fn new(dir: impl Into<PathBuf>, mode: FileSetMode) -> Self {
        Self {
            dir: dir.into(),
            mode,
            number: 0,
            file: None,
        }
    }

    /// Directory this file set operates in.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of the currently open segment, 0 when none is open.
    pub fn number(&self) -> u8 {
        self.number
    }

    /// Currently open segment file, if any.
    pub fn file(&mut self) -> Option<&mut File> {
        self.file.as_mut()
    }

    /// Open segment `number` and position at `offset`.
    ///
    /// In write mode an existing target advances to the next free number and
    /// the file is created fresh. In read mode the file is opened read-only
    /// and seeked to `offset`. The current segment is closed first when the
    /// number changes.
    pub fn open(&mut self, number: u8, offset: u64) -> Result<&mut File> {
        if self.number != number {
            self.close();
        }
        let mut candidate = number as u32;
        loop {
            if candidate == 0 || candidate > MAX_FILES_PER_RECORDING as u32 {
                error!(
                    dir = %self.dir.display(),
                    "max number of segment files ({}) exceeded",
                    MAX_FILES_PER_RECORDING
                );
                return Err(Error::TooManyFiles(MAX_FILES_PER_RECORDING));
            }
            let path = segment_path(&self.dir, candidate as u8);
            match self.mode {
                FileSetMode::Write => {
                    if self.file.is_some() && self.number == candidate as u8 {
                        return Ok(self.file.as_mut().unwrap());
                    }
                    match OpenOptions::new().write(true).create_new(true).open(&path) {
                        Ok(file) => {
                            debug!(file = %path.display(), "recording to segment");
                            self.number = candidate as u8;
                            self.file = Some(file);
                            return Ok(self.file.as_mut().unwrap());
                        }
                        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                            // occupied, try the next suffix
                            candidate += 1;
                        }
                        Err(e) => {
                            error!(file = %path.display(), error = %e, "can't create segment");
                            return Err(Error::Io(e));
                        }
                    }
                }
                FileSetMode::Read => {
                    if self.file.is_none() {
                        let file = match File::open(&path) {
                            Ok(file) => file,
                            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                                return Err(Error::NotFound { file: path });
                            }
                            Err(e) => {
                                error!(file = %path.display(), error = %e, "can't open segment");
                                return Err(Error::Io(e));
                            }
                        };
                        debug!(file = %path.display(), "playing segment");
                        self.number = candidate as u8;
                        self.file = Some(file);
                    }
                    let file = self.file.as_mut().unwrap();
                    file.seek(SeekFrom::Start(offset))
                        .map_err(|e| {
                            error!(file = %path.display(), error = %e, "can't seek in segment");
                            Error::Io(e)
                        })?;
                    return Ok(self.file.as_mut().unwrap());
                }
            }
        }
    }

    /// Open the successor of the current segment at offset 0.
    pub fn next(&mut self) -> Result<&mut File> {
        if self.number == MAX_FILES_PER_RECORDING {
            return Err(Error::TooManyFiles(MAX_FILES_PER_RECORDING));
        }
        self.open(self.number + 1, 0)
    }

    /// Release the current handle.
    pub fn close(&mut self) {
        self.file = None;
        self.number = 0;
    }
}

impl Drop for FileSet {
    fn drop(&mut self) {
        self.close();
    }
}
