//! Bounded byte queue between the capture reader and the segment writer.
//!
//! `put` and `get` never block; they move as many bytes as fit and wake the
//! opposite side. Callers that would otherwise spin use the bounded waits,
//! so back-pressure costs a condition variable sleep instead of CPU.

use super::{Endpoint, Gate};
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

pub struct ByteRing {
    buffer: Mutex<VecDeque<u8>>,
    readable: Condvar,
    writable: Condvar,
    capacity: usize,
    gate: Gate,
}

impl ByteRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: Mutex::new(VecDeque::with_capacity(capacity)),
            readable: Condvar::new(),
            writable: Condvar::new(),
            capacity,
            gate: Gate::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes currently queued.
    pub fn available(&self) -> usize {
        self.buffer.lock().unwrap().len()
    }

    /// Append as much of `data` as fits; returns the number of bytes taken.
    pub fn put(&self, data: &[u8]) -> usize {
        let mut buffer = self.buffer.lock().unwrap();
        let free = self.capacity - buffer.len();
        let n = free.min(data.len());
        buffer.extend(&data[..n]);
        if n > 0 {
            self.readable.notify_one();
        }
        n
    }

    /// Move up to `dst.len()` bytes out; returns the number of bytes moved.
    pub fn get(&self, dst: &mut [u8]) -> usize {
        let mut buffer = self.buffer.lock().unwrap();
        let n = buffer.len().min(dst.len());
        for (slot, byte) in dst[..n].iter_mut().zip(buffer.drain(..n)) {
            *slot = byte;
        }
        if n > 0 {
            self.writable.notify_one();
        }
        n
    }

    /// Sleep until data arrives or the timeout passes.
    pub fn wait_data(&self, timeout: Duration) {
        let buffer = self.buffer.lock().unwrap();
        if buffer.is_empty() {
            let _ = self.readable.wait_timeout(buffer, timeout).unwrap();
        }
    }

    /// Sleep until space frees up or the timeout passes.
    pub fn wait_space(&self, timeout: Duration) {
        let buffer = self.buffer.lock().unwrap();
        if buffer.len() == self.capacity {
            let _ = self.writable.wait_timeout(buffer, timeout).unwrap();
        }
    }

    /// Drop all queued bytes. Producer and consumer must be quiesced via the
    /// gate (or not running yet) when this is called.
    pub fn clear(&self) {
        self.buffer.lock().unwrap().clear();
        self.writable.notify_one();
    }

    /// Wake any thread parked in a bounded wait, typically at shutdown.
    pub fn wake_all(&self) {
        let _buffer = self.buffer.lock().unwrap();
        self.readable.notify_all();
        self.writable.notify_all();
    }

    pub fn gate(&self) -> &Gate {
        &self.gate
    }

    /// Convenience for the worker loops.
    pub fn paused(&self, endpoint: Endpoint) -> bool {
        self.gate.paused(endpoint)
    }
}
