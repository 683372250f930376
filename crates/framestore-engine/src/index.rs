//! The frame-accurate recording index.
//!
//! `index.vdr` is an append-only array of 8-byte entries, one per frame, in
//! recording order; entry N maps frame N to a byte range inside one numbered
//! segment file (see `framestore_core::entry`). The index is what makes
//! trick modes, resumable playback and cutting possible.
//!
//! ## Concurrent catch-up
//!
//! A replay may read the same index a live recording is still appending to.
//! The reader side never locks against the writer; instead [`IndexFile::catch_up`]
//! stats the file and pulls the grown tail into memory. Forward intra-frame
//! searches additionally keep a configurable guard distance from the live
//! end so they never land inside the writer's still-forming group of
//! pictures.
//!
//! ## Crash repair
//!
//! The file size is always a multiple of the entry size. A trailing partial
//! entry is evidence of a crash mid-append; the next open in record mode
//! pads it with zero bytes and logs a warning, so the array stays aligned.
//!
//! ## Frame lengths
//!
//! [`IndexRef::length`] is the distance to the next entry when both share a
//! segment file, and -1 otherwise, meaning "read to end of file". The -1
//! sentinel travels through the reader untouched, which also tolerates minor
//! tail corruption in the last frame of a file.

use crate::{Error, Result};
use framestore_core::{IndexEntry, PictureType};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

pub const INDEX_FILE_NAME: &str = "index.vdr";
pub const RESUME_FILE_NAME: &str = "resume.vdr";

/// Everything needed to read one frame: where it lives and what it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexRef {
    pub file_number: u8,
    pub offset: i32,
    pub picture_type: PictureType,
    /// Frame length in bytes, -1 meaning "read to end of file".
    pub length: i32,
}

/// Disk-backed, append-growable frame index of one recording.
pub struct IndexFile {
    path: PathBuf,
    file: Option<File>,
    record: bool,
    entries: Vec<IndexEntry>,
    last: i32,
    tail_guard: i32,
    resume: ResumeFile,
}

impl IndexFile {
    /// Open the index of `dir` for recording (append mode).
    ///
    /// A misaligned tail left by a crash is zero-padded in place.
    pub fn create(dir: &Path, tail_guard: i32) -> Result<Self> {
        let path = dir.join(INDEX_FILE_NAME);
        let mut last = -1;
        let mut pad = 0u64;
        if let Ok(meta) = std::fs::metadata(&path) {
            let size = meta.len();
            let trailing = size % IndexEntry::SIZE as u64;
            if trailing != 0 {
                pad = IndexEntry::SIZE as u64 - trailing;
                let corrupt = Error::IndexCorrupt {
                    file: path.clone(),
                    trailing,
                };
                warn!(error = %corrupt, size, "padding index file with {} zero bytes", pad);
            }
            last = ((size + pad) / IndexEntry::SIZE as u64) as i32 - 1;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                error!(file = %path.display(), error = %e, "can't open index file");
                Error::Io(e)
            })?;
        if pad != 0 {
            file.write_all(&vec![0u8; pad as usize])?;
        }
        Ok(Self {
            resume: ResumeFile::new(dir),
            path,
            file: Some(file),
            record: true,
            entries: Vec::new(),
            last,
            tail_guard,
        })
    }

    /// Load the index of `dir` for replay. Returns `Ok(None)` when the
    /// recording has no index; replay then degrades to opaque byte mode.
    pub fn load(dir: &Path, tail_guard: i32) -> Result<Option<Self>> {
        let path = dir.join(INDEX_FILE_NAME);
        let mut file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(file = %path.display(), "missing index file");
                return Ok(None);
            }
            Err(e) => {
                error!(file = %path.display(), error = %e, "can't open index file");
                return Err(Error::Io(e));
            }
        };
        let size = file.metadata()?.len();
        if size % IndexEntry::SIZE as u64 != 0 {
            warn!(
                file = %path.display(),
                size,
                "invalid index file size, ignoring partial tail entry"
            );
        }
        let count = (size / IndexEntry::SIZE as u64) as usize;
        let entries = read_entries(&mut file, count, &path)?;
        let last = entries.len() as i32 - 1;
        // the read handle stays open so catch_up can follow a live writer
        Ok(Some(Self {
            resume: ResumeFile::new(dir),
            path,
            file: Some(file),
            record: false,
            entries,
            last,
            tail_guard,
        }))
    }

    /// Whether the index is still usable for lookups or appends.
    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Pull entries a concurrent writer appended since the last call.
    ///
    /// Replay mode only; in record mode nothing is held in memory.
    pub fn catch_up(&mut self) {
        if self.record {
            return;
        }
        let grown_tail = {
            let Some(file) = self.file.as_mut() else {
                return;
            };
            let Ok(meta) = file.metadata() else {
                return;
            };
            let new_last = (meta.len() / IndexEntry::SIZE as u64) as i32 - 1;
            if new_last <= self.last {
                return;
            }
            let start = (self.last + 1) as u64 * IndexEntry::SIZE as u64;
            let grown = (new_last - self.last) as usize;
            file.seek(SeekFrom::Start(start))
                .map_err(Error::Io)
                .and_then(|_| read_entries(file, grown, &self.path))
        };
        match grown_tail {
            Ok(tail) => {
                self.entries.extend(tail);
                self.last = self.entries.len() as i32 - 1;
            }
            Err(_) => {
                // read_entries already logged; a reader that lost its index
                // degrades the same way as one that never had it
                self.file = None;
            }
        }
    }

    /// Append one entry. After a write failure the index closes itself and
    /// every further call fails without touching the file.
    pub fn write(&mut self, picture_type: PictureType, file_number: u8, offset: i32) -> Result<()> {
        if !self.record {
            return Err(Error::InvalidMode("index write in replay mode"));
        }
        let Some(file) = self.file.as_mut() else {
            return Err(Error::IndexClosed);
        };
        let entry = IndexEntry::new(offset, picture_type, file_number);
        if let Err(e) = file.write_all(&entry.encode()) {
            error!(file = %self.path.display(), error = %e, "can't write to index file");
            self.file = None;
            return Err(Error::Io(e));
        }
        self.last += 1;
        Ok(())
    }

    /// Look up frame `index`.
    pub fn get(&mut self, index: i32) -> Option<IndexRef> {
        self.catch_up();
        if index < 0 || index > self.last {
            return None;
        }
        let entry = self.entries[index as usize];
        let length = self.length_at(index, &entry);
        Some(IndexRef {
            file_number: entry.file_number,
            offset: entry.offset,
            picture_type: entry.picture_type,
            length,
        })
    }

    /// Step from `index` to the next intra frame in the given direction.
    ///
    /// Forward searches first catch up with a live writer and then refuse to
    /// come within `tail_guard` entries of the end, to stay clear of the
    /// writer's unfinished group of pictures.
    pub fn next_i_frame(&mut self, index: i32, forward: bool) -> Option<(i32, IndexRef)> {
        if forward {
            self.catch_up();
        }
        let step = if forward { 1 } else { -1 };
        let mut index = index;
        loop {
            index += step;
            if index < 0 || index > self.last - self.tail_guard {
                return None;
            }
            let entry = self.entries[index as usize];
            if entry.picture_type.is_intra() {
                let length = if index < self.last
                    && self.entries[index as usize + 1].file_number == entry.file_number
                {
                    self.entries[index as usize + 1].offset - entry.offset
                } else {
                    // recordings end on a non-intra frame, so this only
                    // happens when a segment ends right after the intra frame
                    error!(
                        file = %self.path.display(),
                        "intra frame at end of file #{}",
                        entry.file_number
                    );
                    -1
                };
                return Some((
                    index,
                    IndexRef {
                        file_number: entry.file_number,
                        offset: entry.offset,
                        picture_type: entry.picture_type,
                        length,
                    },
                ));
            }
        }
    }

    /// First frame at or past the given position in the recording.
    pub fn position_of(&mut self, file_number: u8, offset: i32) -> i32 {
        self.catch_up();
        let mut i = 0;
        while i < self.last {
            let entry = self.entries[i as usize];
            if entry.file_number > file_number
                || (entry.file_number == file_number && entry.offset >= offset)
            {
                break;
            }
            i += 1;
        }
        i
    }

    /// Highest valid frame number, -1 when empty. Catches up first.
    pub fn last(&mut self) -> i32 {
        self.catch_up();
        self.last
    }

    /// Persisted resume position, -1 when absent.
    pub fn resume_get(&self) -> i32 {
        self.resume.read()
    }

    /// Persist the resume position.
    pub fn resume_set(&self, index: i32) -> Result<()> {
        self.resume.save(index)
    }

    fn length_at(&self, index: i32, entry: &IndexEntry) -> i32 {
        if index < self.last {
            let next = self.entries[index as usize + 1];
            if next.file_number == entry.file_number {
                return next.offset - entry.offset;
            }
        }
        -1
    }
}

fn read_entries(file: &mut File, count: usize, path: &Path) -> Result<Vec<IndexEntry>> {
    let mut raw = vec![0u8; count * IndexEntry::SIZE];
    file.read_exact(&mut raw).map_err(|e| {
        error!(file = %path.display(), error = %e, "can't read from index file");
        Error::Io(e)
    })?;
    let mut entries = Vec::with_capacity(count);
    for chunk in raw.chunks_exact(IndexEntry::SIZE) {
        let mut raw_entry = [0u8; IndexEntry::SIZE];
        raw_entry.copy_from_slice(chunk);
        match IndexEntry::decode(&raw_entry) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                warn!(
                    file = %path.display(),
                    entry = entries.len(),
                    error = %e,
                    "undecodable index entry, truncating"
                );
                break;
            }
        }
    }
    Ok(entries)
}

/// The persisted resume position of one recording, a decimal frame number in
/// a sibling text file.
pub struct ResumeFile {
    path: PathBuf,
}

impl ResumeFile {
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(RESUME_FILE_NAME),
        }
    }

    /// Read the stored frame number, -1 when absent or unreadable.
    pub fn read(&self) -> i32 {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => text.trim().parse().unwrap_or(-1),
            Err(_) => -1,
        }
    }

    /// Store `index` as the position to resume from.
    pub fn save(&self, index: i32) -> Result<()> {
        std::fs::write(&self.path, format!("{}\n", index)).map_err(|e| {
            error!(file = %self.path.display(), error = %e, "can't write resume file");
            Error::Io(e)
        })
    }
}
