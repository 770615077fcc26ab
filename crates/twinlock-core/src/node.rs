use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::ptr::{self, NonNull};
use std::alloc::Layout;

use crate::alloc::NodeAlloc;
use crate::error::QueueError;
use crate::sync::{AtomicPtr, Ordering};

/// One link of the queue's list.
///
/// `value` is initialized exactly while the node sits behind the sentinel.
/// The sentinel's value is either never written (the initial sentinel) or
/// already moved out by the pop that promoted it.
pub(crate) struct Node<T> {
    value: UnsafeCell<MaybeUninit<T>>,
    next: AtomicPtr<Node<T>>,
}

impl<T> Node<T> {
    #[inline]
    pub(crate) fn layout() -> Layout {
        Layout::new::<Self>()
    }

    /// Reserves memory for one node without initializing it.
    pub(crate) fn allocate<A: NodeAlloc>(
        alloc: &A,
    ) -> Result<NonNull<MaybeUninit<Self>>, QueueError> {
        alloc
            .allocate(Self::layout())
            .map(NonNull::cast)
            .ok_or_else(|| QueueError::allocation(Self::layout()))
    }

    /// Turns a reserved slot into a detached sentinel with no value.
    ///
    /// # Safety
    /// `slot` must come from `allocate` and must not have been initialized yet.
    pub(crate) unsafe fn sentinel(slot: NonNull<MaybeUninit<Self>>) -> NonNull<Self> {
        Self::write(slot, MaybeUninit::uninit())
    }

    /// Turns a reserved slot into a detached node carrying `value`.
    ///
    /// # Safety
    /// Same as [`Node::sentinel`].
    pub(crate) unsafe fn with_value(slot: NonNull<MaybeUninit<Self>>, value: T) -> NonNull<Self> {
        Self::write(slot, MaybeUninit::new(value))
    }

    unsafe fn write(slot: NonNull<MaybeUninit<Self>>, value: MaybeUninit<T>) -> NonNull<Self> {
        slot.as_ptr().write(MaybeUninit::new(Node {
            value: UnsafeCell::new(value),
            next: AtomicPtr::new(ptr::null_mut()),
        }));
        slot.cast()
    }

    /// The successor link. Acquire pairs with the release in `set_next`, so a
    /// non-null result also makes the successor's value visible.
    #[inline]
    pub(crate) fn next(&self) -> Option<NonNull<Self>> {
        NonNull::new(self.next.load(Ordering::Acquire))
    }

    /// Only the tail-lock holder calls this, and only on the current tail.
    #[inline]
    pub(crate) fn set_next(&self, node: NonNull<Self>) {
        self.next.store(node.as_ptr(), Ordering::Release);
    }

    /// Moves the value out, leaving the slot logically uninitialized.
    ///
    /// # Safety
    /// The value must be initialized and the caller must have exclusive access
    /// to it: the head-lock holder for a linked node, or the owner of a node
    /// that was never linked.
    #[inline]
    pub(crate) unsafe fn take_value(&self) -> T {
        (*self.value.get()).assume_init_read()
    }

    /// Returns the node's memory to `alloc` without touching its value.
    ///
    /// # Safety
    /// `node` must come from `allocate` on `alloc`, must be unreachable from
    /// the queue, and its value must be uninitialized or already moved out.
    pub(crate) unsafe fn release<A: NodeAlloc>(alloc: &A, node: NonNull<Self>) {
        ptr::drop_in_place(node.as_ptr());
        alloc.deallocate(node.cast(), Self::layout());
    }
}
