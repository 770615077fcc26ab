use std::alloc::Layout;
use std::ptr::NonNull;

/// Source of memory for queue nodes.
///
/// Allocation failure is reported as `None` instead of aborting, which lets
/// the queue surface it as `QueueError::Allocation`.
///
/// # Safety
///
/// `allocate` must return either `None` or a pointer to a fresh block that is
/// valid for reads and writes of `layout.size()` bytes and aligned to
/// `layout.align()`. That block must stay valid until it is passed back to
/// `deallocate` with the same layout.
pub unsafe trait NodeAlloc {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>>;

    /// # Safety
    ///
    /// `ptr` must have come from `allocate` on this allocator with the same
    /// `layout`, and must not be used afterwards.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);
}

/// The process-wide allocator (`std::alloc`).
#[derive(Debug, Default, Clone, Copy)]
pub struct Global;

unsafe impl NodeAlloc for Global {
    #[inline]
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        if layout.size() == 0 {
            return None;
        }
        // SAFETY: layout has a non-zero size
        NonNull::new(unsafe { std::alloc::alloc(layout) })
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        std::alloc::dealloc(ptr.as_ptr(), layout)
    }
}

unsafe impl<A: NodeAlloc + ?Sized> NodeAlloc for &A {
    #[inline]
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        (**self).allocate(layout)
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        (**self).deallocate(ptr, layout)
    }
}
