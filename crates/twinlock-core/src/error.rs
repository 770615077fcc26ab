use std::alloc::Layout;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("failed to allocate queue node ({size} bytes, align {align})")]
    Allocation { size: usize, align: usize },

    #[error("timed out after {0:?} waiting for queue lock")]
    LockTimeout(Duration),
}

impl QueueError {
    pub(crate) fn allocation(layout: Layout) -> Self {
        Self::Allocation {
            size: layout.size(),
            align: layout.align(),
        }
    }
}

pub type Result<T> = std::result::Result<T, QueueError>;

/// A rejected push. Ownership of the value goes back to the caller, who decides
/// whether to retry or discard it.
pub struct PushError<T> {
    value: T,
    cause: QueueError,
}

impl<T> PushError<T> {
    pub(crate) fn new(value: T, cause: QueueError) -> Self {
        Self { value, cause }
    }

    pub fn cause(&self) -> &QueueError {
        &self.cause
    }

    pub fn into_inner(self) -> T {
        self.value
    }

    pub fn into_parts(self) -> (T, QueueError) {
        (self.value, self.cause)
    }
}

impl<T> fmt::Debug for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushError")
            .field("cause", &self.cause)
            .finish_non_exhaustive()
    }
}

impl<T> fmt::Display for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "push rejected: {}", self.cause)
    }
}

impl<T> std::error::Error for PushError<T> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.cause)
    }
}
