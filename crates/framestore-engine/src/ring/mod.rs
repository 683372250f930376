//! Bounded producer/consumer queues between the pipeline threads.
//!
//! Two variants exist: a byte ring on the record side, where the payload is
//! an undifferentiated stream, and a frame ring on the replay side, where
//! the decoder only accepts whole aligned picture payloads. Both are safe
//! for exactly one producer thread and one consumer thread and share the
//! [`Gate`] rendezvous that lets a mode transition discard in-flight data
//! without tearing state under a running thread.

mod byte;
mod frame;
mod gate;

pub use byte::ByteRing;
pub use frame::{FrameGuard, FrameRing};
pub use gate::{Endpoint, Gate};
