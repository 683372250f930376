//! Non-destructive editing: the cutting pass.
//!
//! A single background thread copies the sections of a source recording
//! selected by its editing marks into a fresh destination recording, frame
//! by frame through the source index. The destination gets its own segment
//! files, its own index and a derived mark list describing where the cut
//! seams ended up, so the edit structure stays visible in the result.
//!
//! Every destination segment starts with an intra frame, which holds
//! because every cut-in mark must sit on one; an edit list violating that
//! is rejected up front.

use crate::config::EngineConfig;
use crate::fileset::{FileSet, FileSetMode};
use crate::index::IndexFile;
use crate::marks::Marks;
use crate::pipeline::{join_deadline, new_status, set_sticky, sticky, Status, STOP_DEADLINE};
use crate::replay::read_frame;
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, info};

pub struct Cutter {
    busy: Arc<AtomicBool>,
    status: Status,
    handle: Option<JoinHandle<()>>,
    dest: PathBuf,
}

impl Cutter {
    /// Validate the source edit list and start the copy pass.
    pub fn start(source: &Path, dest: &Path, config: &EngineConfig) -> Result<Self> {
        let marks = Marks::load(source)?;
        if marks.is_empty() {
            error!(dir = %source.display(), "no editing marks found");
            return Err(Error::NoMarks {
                file: source.to_path_buf(),
            });
        }
        let mut from_index = IndexFile::load(source, 0)?.ok_or_else(|| Error::NotFound {
            file: source.join(crate::index::INDEX_FILE_NAME),
        })?;
        for (cut_in, _) in marks.pairs() {
            match from_index.get(cut_in) {
                Some(r) if r.picture_type.is_intra() => {}
                _ => return Err(Error::MarkNotOnIntraFrame { frame: cut_in }),
            }
        }
        std::fs::create_dir_all(dest)?;
        info!(from = %source.display(), to = %dest.display(), "cutting");

        let busy = Arc::new(AtomicBool::new(true));
        let status = new_status();
        let handle = {
            let busy = busy.clone();
            let status = status.clone();
            let source = source.to_path_buf();
            let dest_dir = dest.to_path_buf();
            let config = config.clone();
            std::thread::Builder::new()
                .name("cutter".into())
                .spawn(move || cut_loop(from_index, marks, source, dest_dir, busy, status, config))
                .map_err(Error::Io)?
        };

        Ok(Self {
            busy,
            status,
            handle: Some(handle),
            dest: dest.to_path_buf(),
        })
    }

    pub fn dest(&self) -> &Path {
        &self.dest
    }

    pub fn active(&self) -> bool {
        self.busy.load(Ordering::Acquire)
            && !self.handle.as_ref().is_some_and(|h| h.is_finished())
    }

    pub fn status(&self) -> Option<Arc<Error>> {
        sticky(&self.status)
    }

    /// Cancel cooperatively; the thread gets a grace period to finish its
    /// current frame before being abandoned.
    pub fn stop(&mut self) {
        self.busy.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            join_deadline(handle, "cutter", STOP_DEADLINE);
        }
    }

    /// Block until the copy pass completes. Test and tooling convenience.
    pub fn wait(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Cutter {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop();
        }
    }
}

fn cut_loop(
    mut from_index: IndexFile,
    from_marks: Marks,
    source: PathBuf,
    dest: PathBuf,
    busy: Arc<AtomicBool>,
    status: Status,
    config: EngineConfig,
) {
    debug!("video cutting thread started");
    let result = cut(&mut from_index, &from_marks, &source, &dest, &busy, &config);
    if let Err(e) = result {
        error!(dir = %dest.display(), error = %e, "cutting failed");
        set_sticky(&status, e);
    }
    busy.store(false, Ordering::Release);
    debug!("video cutting thread ended");
}

fn cut(
    from_index: &mut IndexFile,
    from_marks: &Marks,
    source: &Path,
    dest: &Path,
    busy: &AtomicBool,
    config: &EngineConfig,
) -> Result<()> {
    let mut from_files = FileSet::new(source, FileSetMode::Read);
    let mut to_files = FileSet::new(dest, FileSetMode::Write);
    let mut to_index = IndexFile::create(dest, 0)?;
    let mut to_marks = Marks::new(dest);

    to_files.open(1, 0)?;
    let last = from_index.last();
    let mut file_size: u64 = 0;
    let mut buf = Vec::with_capacity(config.max_frame_size);

    // the first surviving frame is always a cut-in
    to_marks.add(0);
    to_marks.save()?;

    let mut pairs = from_marks.pairs().peekable();
    while let Some((cut_in, cut_out)) = pairs.next() {
        let cut_out = cut_out.unwrap_or(last + 1);
        let mut frame = cut_in;
        while frame < cut_out {
            if !busy.load(Ordering::Acquire) {
                info!("cutting cancelled");
                return Ok(());
            }

            // read one frame from the source
            let Some(r) = from_index.get(frame) else {
                return Ok(()); // source ended early
            };
            let file = from_files.open(r.file_number, r.offset as u64)?;
            let n = read_frame(file, &mut buf, r.length, config.max_frame_size)?;
            if n == 0 {
                return Ok(());
            }

            // write it to the destination
            if r.picture_type.is_intra() && file_size > config.max_file_size {
                to_files.next()?;
                file_size = 0;
            }
            to_index.write(r.picture_type, to_files.number(), file_size as i32)?;
            let path = crate::fileset::segment_path(dest, to_files.number());
            let out = to_files
                .file()
                .ok_or_else(|| Error::WriteFailed { file: path.clone() })?;
            if let Err(e) = std::io::Write::write_all(out, &buf[..n]) {
                error!(file = %path.display(), error = %e, "destination write failed");
                return Err(Error::WriteFailed { file: path });
            }
            file_size += n as u64;
            frame += 1;
        }

        // seam bookkeeping: close this section and, if another follows,
        // open the next one right after it
        let written = to_index.last();
        to_marks.add(written);
        if pairs.peek().is_some() {
            to_marks.add(written + 1);
        }
        to_marks.save()?;
    }
    info!(dir = %dest.display(), frames = to_index.last() + 1, "cutting finished");
    Ok(())
}
