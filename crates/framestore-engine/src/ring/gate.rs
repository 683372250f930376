//! Quiescence rendezvous for pipeline flushes.
//!
//! A mode transition may only clear a ring once both endpoints have stopped
//! touching it. The controller raises a block request for both endpoints;
//! each worker observes the request at the top of its loop, acknowledges by
//! going quiescent, and idles until the request is lowered. The controller
//! waits for both acknowledgements (with a deadline, a stuck thread must not
//! wedge the whole engine), performs the flush, then lowers the block.

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// One side of a ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Producer,
    Consumer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Run,
    Requested,
    Quiescent,
}

struct State {
    producer: Phase,
    consumer: Phase,
    producer_retired: bool,
    consumer_retired: bool,
}

impl State {
    fn of(&mut self, endpoint: Endpoint) -> &mut Phase {
        match endpoint {
            Endpoint::Producer => &mut self.producer,
            Endpoint::Consumer => &mut self.consumer,
        }
    }
}

pub struct Gate {
    state: Mutex<State>,
    cond: Condvar,
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}

impl Gate {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                producer: Phase::Run,
                consumer: Phase::Run,
                producer_retired: false,
                consumer_retired: false,
            }),
            cond: Condvar::new(),
        }
    }

    /// Request both endpoints to go quiescent.
    pub fn freeze(&self) {
        let mut state = self.state.lock().unwrap();
        if state.producer == Phase::Run {
            state.producer = Phase::Requested;
        }
        if state.consumer == Phase::Run {
            state.consumer = Phase::Requested;
        }
        self.cond.notify_all();
    }

    /// Wait until both endpoints acknowledged, or the deadline passes.
    /// Returns whether both actually acknowledged.
    pub fn wait_quiescent(&self, deadline: Duration) -> bool {
        let end = Instant::now() + deadline;
        let mut state = self.state.lock().unwrap();
        loop {
            let pending = (state.producer == Phase::Requested && !state.producer_retired)
                || (state.consumer == Phase::Requested && !state.consumer_retired);
            if !pending {
                return true;
            }
            let now = Instant::now();
            if now >= end {
                return false;
            }
            let (guard, _) = self.cond.wait_timeout(state, end - now).unwrap();
            state = guard;
        }
    }

    /// Lower the block and let both endpoints run again.
    pub fn thaw(&self) {
        let mut state = self.state.lock().unwrap();
        state.producer = Phase::Run;
        state.consumer = Phase::Run;
        self.cond.notify_all();
    }

    /// Worker-side check. Acknowledges a pending request and reports whether
    /// the endpoint must stay off the ring this iteration.
    pub fn paused(&self, endpoint: Endpoint) -> bool {
        let mut state = self.state.lock().unwrap();
        let phase = state.of(endpoint);
        match *phase {
            Phase::Run => false,
            Phase::Requested => {
                *phase = Phase::Quiescent;
                self.cond.notify_all();
                true
            }
            Phase::Quiescent => true,
        }
    }

    /// Whether a block is raised for this endpoint, without acknowledging.
    /// Used inside retry loops that must bail out to their loop head.
    pub fn pending(&self, endpoint: Endpoint) -> bool {
        let mut state = self.state.lock().unwrap();
        *state.of(endpoint) != Phase::Run
    }

    /// Mark an endpoint's thread as gone for good. A retired endpoint counts
    /// as permanently quiescent, so later flushes do not wait out the
    /// deadline for a thread that already ended.
    pub fn retire(&self, endpoint: Endpoint) {
        let mut state = self.state.lock().unwrap();
        match endpoint {
            Endpoint::Producer => state.producer_retired = true,
            Endpoint::Consumer => state.consumer_retired = true,
        }
        self.cond.notify_all();
    }
}
