//! Synchronization primitives used by the queue.
//!
//! Normal builds use `parking_lot`; the `loom` feature swaps in loom's mutex and
//! atomics so the push/pop interleavings can be model checked.

#[cfg(not(feature = "loom"))]
pub(crate) use core::sync::atomic::{AtomicPtr, Ordering};
#[cfg(not(feature = "loom"))]
pub(crate) use parking_lot::{Mutex, MutexGuard};

#[cfg(feature = "loom")]
pub(crate) use self::loom_mutex::{Mutex, MutexGuard};
#[cfg(feature = "loom")]
pub(crate) use loom::sync::atomic::{AtomicPtr, Ordering};

#[cfg(feature = "loom")]
mod loom_mutex {
    pub(crate) type MutexGuard<'a, T> = loom::sync::MutexGuard<'a, T>;

    /// parking_lot-shaped wrapper: `lock` returns the guard directly.
    #[derive(Debug)]
    pub(crate) struct Mutex<T>(loom::sync::Mutex<T>);

    impl<T> Mutex<T> {
        pub(crate) fn new(value: T) -> Self {
            Self(loom::sync::Mutex::new(value))
        }

        pub(crate) fn lock(&self) -> MutexGuard<'_, T> {
            // the queue never panics while holding a guard
            match self.0.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            }
        }
    }
}
