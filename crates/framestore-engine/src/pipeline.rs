//! Plumbing shared by the pipeline threads.
//!
//! Every pipeline runs plain OS threads that check a `busy` flag each
//! iteration. Errors inside a thread never unwind across the pipeline
//! boundary; the first one is parked in a sticky status slot the facade can
//! poll, and the thread winds its pipeline down cleanly. Stopping joins with
//! a deadline, after which a stuck thread is abandoned and logged rather
//! than wedging the caller.

use crate::Error;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{error, warn};

/// How long a stopping pipeline waits for its threads before abandoning them.
pub const STOP_DEADLINE: Duration = Duration::from_secs(3);

/// Sticky error slot of one pipeline; the first error wins.
pub type Status = Arc<Mutex<Option<Arc<Error>>>>;

pub fn new_status() -> Status {
    Arc::new(Mutex::new(None))
}

/// Park `error` in the slot unless one is already there.
pub fn set_sticky(status: &Status, error: Error) {
    let mut slot = status.lock().unwrap();
    if slot.is_none() {
        *slot = Some(Arc::new(error));
    }
}

/// Current sticky error, if any.
pub fn sticky(status: &Status) -> Option<Arc<Error>> {
    status.lock().unwrap().clone()
}

/// Called when the capture watchdog declares the stream dead. The default
/// aborts the process; tests install a recording handler instead.
pub type EmergencyHandler = Arc<dyn Fn() + Send + Sync>;

pub fn default_emergency_handler() -> EmergencyHandler {
    Arc::new(|| {
        error!("emergency exit requested");
        std::process::abort();
    })
}

/// Join `handle` within `deadline`; a thread that does not finish in time is
/// abandoned with a warning.
pub fn join_deadline(handle: JoinHandle<()>, name: &str, deadline: Duration) {
    let end = Instant::now() + deadline;
    while !handle.is_finished() {
        if Instant::now() >= end {
            warn!(thread = name, "thread did not stop in time, abandoning it");
            return;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    if handle.join().is_err() {
        error!(thread = name, "thread panicked");
    }
}
