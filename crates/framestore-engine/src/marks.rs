//! Editing marks of a recording.
//!
//! `marks.vdr` holds one decimal frame number per line, in ascending order.
//! Marks pair up: the first, third, fifth, ... mark opens a surviving
//! section (cut-in) and the following mark closes it (cut-out). A trailing
//! unpaired cut-in means "keep everything to the end of the recording".

use crate::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::warn;

pub const MARKS_FILE_NAME: &str = "marks.vdr";

pub struct Marks {
    path: PathBuf,
    marks: Vec<i32>,
}

impl Marks {
    /// Load the marks of `dir`; a missing file yields an empty list.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(MARKS_FILE_NAME);
        let mut marks = Vec::new();
        match std::fs::read_to_string(&path) {
            Ok(text) => {
                for line in text.lines() {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    match line.parse::<i32>() {
                        Ok(frame) => marks.push(frame),
                        Err(_) => {
                            warn!(file = %path.display(), line, "unparseable editing mark");
                        }
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::Io(e)),
        }
        Ok(Self { path, marks })
    }

    /// An empty mark list bound to `dir`, for building a new one.
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(MARKS_FILE_NAME),
            marks: Vec::new(),
        }
    }

    pub fn count(&self) -> usize {
        self.marks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }

    pub fn frames(&self) -> &[i32] {
        &self.marks
    }

    pub fn add(&mut self, frame: i32) {
        self.marks.push(frame);
    }

    /// The cut sections: `(cut_in, Some(cut_out))` pairs, with a trailing
    /// unpaired cut-in yielding `(cut_in, None)` meaning "to the end".
    pub fn pairs(&self) -> impl Iterator<Item = (i32, Option<i32>)> + '_ {
        self.marks
            .chunks(2)
            .map(|pair| (pair[0], pair.get(1).copied()))
    }

    /// Write the list back to disk.
    pub fn save(&self) -> Result<()> {
        let mut text = String::new();
        for mark in &self.marks {
            text.push_str(&format!("{}\n", mark));
        }
        std::fs::write(&self.path, text).map_err(Error::Io)
    }
}
