//! Integer pool and rectangle algebra for the gateway core.
//!
//! Leaf crate: no dependency on the wire codec, the surface compositor,
//! or session state. Both [`pool::IntegerPool`] and [`rect::Rect`] are
//! pure, thread-safe data structures used throughout the rest of the
//! workspace to allocate layer/buffer/stream indices and to reason about
//! dirty regions.

mod pool;
mod rect;

pub use pool::IntegerPool;
pub use rect::{Intersection, Rect};
