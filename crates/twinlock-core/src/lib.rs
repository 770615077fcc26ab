//! Unbounded, thread-safe FIFO queue built on the two-lock linked-list design
//!
//! - `queue`: `TwoLockQueue`, a sentinel-headed singly linked list with one lock
//!   for removal at the head and another for insertion at the tail
//! - `alloc`: the `NodeAlloc` seam through which every list node is allocated
//! - `error`: `QueueError` and `PushError`
//!
//! Producers only ever take the tail lock and consumers only ever take the head
//! lock, so pushes and pops scale independently under load.

pub mod alloc;
pub mod error;
pub mod queue;

mod node;
mod sync;

pub use alloc::{Global, NodeAlloc};
pub use error::{PushError, QueueError, Result};
pub use queue::{Drain, TwoLockQueue};
