//! Bounded frame queue between the replay reader and the decoder writer.
//!
//! Unlike the byte ring this one holds discrete frames, because the decoder
//! only accepts whole aligned picture payloads. `put` is all-or-nothing; a
//! frame that does not fit right now is refused and the producer retries.
//! `get` hands out a guard that borrows the front frame; the frame leaves
//! the ring only when the guard drops, so a flush during a mode transition
//! can never yank a half-written frame out from under the consumer.

use super::{Endpoint, Gate};
use framestore_core::Frame;
use std::collections::VecDeque;
use std::ops::Deref;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

struct State {
    queue: VecDeque<Arc<Frame>>,
    bytes: usize,
}

pub struct FrameRing {
    state: Mutex<State>,
    readable: Condvar,
    writable: Condvar,
    capacity: usize,
    gate: Gate,
}

impl FrameRing {
    /// `capacity` bounds the total payload bytes queued at once.
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(State {
                queue: VecDeque::new(),
                bytes: 0,
            }),
            readable: Condvar::new(),
            writable: Condvar::new(),
            capacity,
            gate: Gate::new(),
        }
    }

    /// Queued payload bytes.
    pub fn available(&self) -> usize {
        self.state.lock().unwrap().bytes
    }

    /// Queue a frame. Returns false when it does not fit right now. A frame
    /// larger than the whole ring is still accepted into an empty ring so an
    /// oversized frame cannot wedge the pipeline.
    pub fn put(&self, frame: Frame) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.bytes + frame.len() > self.capacity && !state.queue.is_empty() {
            return false;
        }
        state.bytes += frame.len();
        state.queue.push_back(Arc::new(frame));
        self.readable.notify_one();
        true
    }

    /// Borrow the oldest queued frame. The frame stays in the ring until the
    /// guard drops.
    pub fn get(&self) -> Option<FrameGuard<'_>> {
        let state = self.state.lock().unwrap();
        let frame = state.queue.front()?.clone();
        Some(FrameGuard { ring: self, frame })
    }

    /// Sleep until a frame arrives or the timeout passes.
    pub fn wait_data(&self, timeout: Duration) {
        let state = self.state.lock().unwrap();
        if state.queue.is_empty() {
            let _ = self.readable.wait_timeout(state, timeout).unwrap();
        }
    }

    /// Sleep until space frees up or the timeout passes.
    pub fn wait_space(&self, timeout: Duration) {
        let state = self.state.lock().unwrap();
        if state.bytes >= self.capacity {
            let _ = self.writable.wait_timeout(state, timeout).unwrap();
        }
    }

    /// Drop every queued frame. Endpoints must be quiesced via the gate.
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        state.queue.clear();
        state.bytes = 0;
        self.writable.notify_one();
    }

    /// Wake any thread parked in a bounded wait, typically at shutdown.
    pub fn wake_all(&self) {
        let _state = self.state.lock().unwrap();
        self.readable.notify_all();
        self.writable.notify_all();
    }

    pub fn gate(&self) -> &Gate {
        &self.gate
    }

    pub fn paused(&self, endpoint: Endpoint) -> bool {
        self.gate.paused(endpoint)
    }

    fn release(&self, frame: &Arc<Frame>) {
        let mut state = self.state.lock().unwrap();
        // the ring may have been cleared while the guard was alive; only the
        // frame still at the front is ours to remove
        if let Some(front) = state.queue.front() {
            if Arc::ptr_eq(front, frame) {
                state.bytes -= front.len();
                state.queue.pop_front();
                self.writable.notify_one();
            }
        }
    }
}

/// Borrow of the oldest frame in a [`FrameRing`]; removes it on drop.
pub struct FrameGuard<'a> {
    ring: &'a FrameRing,
    frame: Arc<Frame>,
}

impl Deref for FrameGuard<'_> {
    type Target = Frame;

    fn deref(&self) -> &Frame {
        &self.frame
    }
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        self.ring.release(&self.frame);
    }
}
