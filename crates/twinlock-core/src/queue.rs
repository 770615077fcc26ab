use core::fmt;
use core::marker::PhantomData;
use core::ptr::NonNull;
#[cfg(not(feature = "loom"))]
use std::time::Duration;

use crossbeam_utils::CachePadded;
use tracing::{debug, trace, warn};

use crate::alloc::{Global, NodeAlloc};
use crate::error::{PushError, QueueError};
use crate::node::Node;
use crate::sync::{Mutex, MutexGuard};

/// Unbounded MPMC FIFO queue with separate head and tail locks.
///
/// The list always holds one extra sentinel node in front of the live values:
///
/// ```text
///  head                       tail
///   |                          |
///   v                          v
/// [sentinel] -> [v1] -> [v2] -> [v3] -> null
/// ```
///
/// - `head` lock: guards the `head` pointer. Its holder reads the sentinel's
///   `next` and moves values out of the node after the sentinel.
/// - `tail` lock: guards the `tail` pointer. Its holder writes the last node's
///   `next`.
///
/// The two critical sections never take each other's lock. The one field both
/// sides can touch at once is `next` on a node that is both sentinel and tail
/// (empty queue), and that field is atomic.
///
/// Pop returns the value of the node *after* the sentinel, promotes that node
/// to sentinel, and frees the old sentinel. The freed node therefore always
/// has a non-null `next`, so it is never the node a concurrent push is
/// linking onto.
pub struct TwoLockQueue<T, A: NodeAlloc = Global> {
    head: CachePadded<Mutex<NonNull<Node<T>>>>,
    tail: CachePadded<Mutex<NonNull<Node<T>>>>,
    alloc: A,
    _owns: PhantomData<T>,
}

// Values cross threads by moving through the queue, and `alloc` is used from
// every thread that pushes or pops.
unsafe impl<T: Send, A: NodeAlloc + Send> Send for TwoLockQueue<T, A> {}
unsafe impl<T: Send, A: NodeAlloc + Sync> Sync for TwoLockQueue<T, A> {}

impl<T> TwoLockQueue<T> {
    /// Creates an empty queue backed by the global allocator.
    ///
    /// # Examples
    /// ```
    /// use twinlock_core::TwoLockQueue;
    ///
    /// let queue = TwoLockQueue::new().unwrap();
    /// queue.push("job").unwrap();
    /// assert_eq!(queue.pop(), Some("job"));
    /// assert_eq!(queue.pop(), None);
    /// ```
    pub fn new() -> Result<Self, QueueError> {
        Self::new_in(Global)
    }
}

impl<T, A: NodeAlloc> TwoLockQueue<T, A> {
    /// Creates an empty queue whose nodes come from `alloc`.
    ///
    /// Fails with `QueueError::Allocation` if the sentinel cannot be
    /// allocated; nothing is retained in that case.
    pub fn new_in(alloc: A) -> Result<Self, QueueError> {
        let slot = Node::<T>::allocate(&alloc).inspect_err(|e| {
            warn!(error = %e, "queue sentinel allocation failed");
        })?;
        // SAFETY: freshly allocated slot
        let sentinel = unsafe { Node::sentinel(slot) };

        let layout = Node::<T>::layout();
        debug!(
            node_size = layout.size(),
            node_align = layout.align(),
            "two-lock queue constructed"
        );

        Ok(Self {
            head: CachePadded::new(Mutex::new(sentinel)),
            tail: CachePadded::new(Mutex::new(sentinel)),
            alloc,
            _owns: PhantomData,
        })
    }

    pub fn allocator(&self) -> &A {
        &self.alloc
    }

    /// Appends `value` at the tail.
    ///
    /// The node is allocated before the tail lock is taken. If allocation
    /// fails the queue is left untouched and `value` comes back inside the
    /// `PushError`.
    pub fn push(&self, value: T) -> Result<(), PushError<T>> {
        let node = self.create_node(value)?;
        self.link(self.tail.lock(), node);
        Ok(())
    }

    /// Removes the oldest value, or returns `None` when the queue is empty.
    ///
    /// Never blocks on producers: only the head lock is taken.
    pub fn pop(&self) -> Option<T> {
        self.unlink(self.head.lock())
    }

    /// Like [`push`](Self::push), but gives up if the tail lock cannot be
    /// taken within `timeout`. The value is handed back on timeout.
    #[cfg(not(feature = "loom"))]
    pub fn push_timeout(&self, value: T, timeout: Duration) -> Result<(), PushError<T>> {
        let node = self.create_node(value)?;
        match self.tail.try_lock_for(timeout) {
            Some(tail) => {
                self.link(tail, node);
                Ok(())
            }
            None => {
                // SAFETY: node was never linked, so we still own it and its value
                let value = unsafe {
                    let value = node.as_ref().take_value();
                    Node::release(&self.alloc, node);
                    value
                };
                Err(PushError::new(value, QueueError::LockTimeout(timeout)))
            }
        }
    }

    /// Like [`pop`](Self::pop), but gives up if the head lock cannot be taken
    /// within `timeout`.
    #[cfg(not(feature = "loom"))]
    pub fn pop_timeout(&self, timeout: Duration) -> Result<Option<T>, QueueError> {
        self.head
            .try_lock_for(timeout)
            .map(|head| self.unlink(head))
            .ok_or(QueueError::LockTimeout(timeout))
    }

    /// Whether the sentinel had no successor at the time of the call.
    ///
    /// Takes only the head lock. Concurrent pushes may make the answer stale
    /// immediately.
    pub fn is_empty(&self) -> bool {
        let head = self.head.lock();
        // SAFETY: the sentinel stays allocated while the head lock is held
        unsafe { (*head).as_ref() }.next().is_none()
    }

    /// Pops values until the queue is observed empty.
    ///
    /// Values pushed concurrently while draining may or may not be yielded.
    pub fn drain(&self) -> Drain<'_, T, A> {
        Drain { queue: self }
    }

    fn create_node(&self, value: T) -> Result<NonNull<Node<T>>, PushError<T>> {
        match Node::allocate(&self.alloc) {
            // SAFETY: freshly allocated slot
            Ok(slot) => Ok(unsafe { Node::with_value(slot, value) }),
            Err(e) => {
                warn!(error = %e, "queue node allocation failed");
                Err(PushError::new(value, e))
            }
        }
    }

    fn link(&self, mut tail: MutexGuard<'_, NonNull<Node<T>>>, node: NonNull<Node<T>>) {
        // SAFETY: the tail node cannot be freed while we hold the tail lock; pop
        // only frees nodes whose `next` is already set, and only we set it.
        unsafe { (*tail).as_ref() }.set_next(node);
        *tail = node;
    }

    fn unlink(&self, mut head: MutexGuard<'_, NonNull<Node<T>>>) -> Option<T> {
        let sentinel = *head;
        // SAFETY: the sentinel stays allocated while the head lock is held
        let next = unsafe { sentinel.as_ref() }.next()?;

        // SAFETY: `next` is linked behind the sentinel, so its value is
        // initialized, and the head lock gives us exclusive access to it. It
        // becomes the new sentinel with its value moved out.
        let value = unsafe { next.as_ref().take_value() };
        *head = next;
        drop(head);

        // SAFETY: the old sentinel is unreachable now that head moved past it,
        // and its value was moved out when it was promoted (or never written).
        unsafe { Node::release(&self.alloc, sentinel) };
        Some(value)
    }
}

impl<T, A: NodeAlloc> Drop for TwoLockQueue<T, A> {
    fn drop(&mut self) {
        let sentinel = *self.head.lock();
        // SAFETY: `&mut self` means no other thread holds either lock or a node
        // pointer; every node behind the sentinel carries an initialized value.
        let mut dropped = 0usize;
        unsafe {
            let mut cursor = sentinel.as_ref().next();
            Node::release(&self.alloc, sentinel);
            while let Some(node) = cursor {
                cursor = node.as_ref().next();
                drop(node.as_ref().take_value());
                Node::release(&self.alloc, node);
                dropped += 1;
            }
        }
        trace!(dropped, "two-lock queue torn down");
    }
}

impl<T, A: NodeAlloc + fmt::Debug> fmt::Debug for TwoLockQueue<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TwoLockQueue")
            .field("alloc", &self.alloc)
            .finish_non_exhaustive()
    }
}

/// Iterator returned by [`TwoLockQueue::drain`].
pub struct Drain<'a, T, A: NodeAlloc = Global> {
    queue: &'a TwoLockQueue<T, A>,
}

impl<T, A: NodeAlloc> Iterator for Drain<'_, T, A> {
    type Item = T;

    #[inline]
    fn next(&mut self) -> Option<T> {
        self.queue.pop()
    }
}

impl<T, A: NodeAlloc> fmt::Debug for Drain<'_, T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Drain").finish_non_exhaustive()
    }
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::thread;

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn empty_queue_pops_none() {
        let q = TwoLockQueue::<u32>::new().unwrap();
        assert!(q.is_empty());
        assert_eq!(q.pop(), None);
        assert_eq!(q.pop(), None);
        assert!(q.is_empty());
    }

    #[test]
    fn sentinel_shifts_forward_on_pop() {
        let q = TwoLockQueue::new().unwrap();
        let first = *q.head.lock();
        q.push(7).unwrap();
        let linked = unsafe { first.as_ref() }.next().unwrap();
        assert_eq!(*q.tail.lock(), linked);

        assert_eq!(q.pop(), Some(7));
        // the node that carried 7 is now the sentinel and also the tail
        assert_eq!(*q.head.lock(), linked);
        assert_eq!(*q.tail.lock(), linked);
        assert!(q.is_empty());
    }

    #[test]
    fn pop_proceeds_while_tail_lock_is_held() {
        let q = TwoLockQueue::new().unwrap();
        q.push(1).unwrap();
        q.push(2).unwrap();

        let _tail = q.tail.lock();
        let (tx, rx) = mpsc::channel();
        thread::scope(|s| {
            let queue = &q;
            s.spawn(move || {
                let popped = (queue.pop(), queue.pop(), queue.pop());
                tx.send(popped).unwrap();
            });
            let popped = rx.recv_timeout(WAIT).expect("pop waited on the tail lock");
            assert_eq!(popped, (Some(1), Some(2), None));
        });
    }

    #[test]
    fn push_proceeds_while_head_lock_is_held() {
        let q = TwoLockQueue::new().unwrap();
        q.push(1).unwrap();
        q.push(2).unwrap();

        {
            let _head = q.head.lock();
            let (tx, rx) = mpsc::channel();
            thread::scope(|s| {
                let queue = &q;
                s.spawn(move || {
                    queue.push(3).unwrap();
                    queue.push(4).unwrap();
                    tx.send(()).unwrap();
                });
                rx.recv_timeout(WAIT).expect("push waited on the head lock");
            });
        }

        assert_eq!(q.drain().collect::<Vec<_>>(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn timed_ops_give_up_on_held_lock() {
        let q = TwoLockQueue::new().unwrap();
        q.push(String::from("a")).unwrap();

        let tail = q.tail.lock();
        let err = q
            .push_timeout(String::from("b"), Duration::from_millis(10))
            .unwrap_err();
        assert_eq!(
            err.cause(),
            &QueueError::LockTimeout(Duration::from_millis(10))
        );
        assert_eq!(err.into_inner(), "b");
        // the head side is unaffected
        assert_eq!(q.pop_timeout(WAIT).unwrap().as_deref(), Some("a"));
        drop(tail);

        let head = q.head.lock();
        assert!(matches!(
            q.pop_timeout(Duration::from_millis(10)),
            Err(QueueError::LockTimeout(_))
        ));
        q.push_timeout(String::from("c"), WAIT).unwrap();
        drop(head);

        assert_eq!(q.pop().as_deref(), Some("c"));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn drop_releases_remaining_values() {
        let marker = Arc::new(());
        {
            let q = TwoLockQueue::new().unwrap();
            for _ in 0..5 {
                q.push(Arc::clone(&marker)).unwrap();
            }
            drop(q.pop());
            assert_eq!(Arc::strong_count(&marker), 5);
        }
        assert_eq!(Arc::strong_count(&marker), 1);
    }

    #[test]
    fn concurrent_producers_and_consumers() {
        let q = Arc::new(TwoLockQueue::new().unwrap());
        let producers: Vec<_> = (0..2u64)
            .map(|p| {
                let q = Arc::clone(&q);
                thread::spawn(move || {
                    for i in 0..10_000 {
                        q.push(p * 10_000 + i).unwrap();
                    }
                })
            })
            .collect();

        let mut seen = 0usize;
        let mut sum = 0u64;
        while seen < 20_000 {
            if let Some(v) = q.pop() {
                seen += 1;
                sum += v;
            } else {
                thread::yield_now();
            }
        }
        for p in producers {
            p.join().unwrap();
        }
        assert_eq!(sum, (0..20_000u64).sum());
        assert!(q.is_empty());
    }
}
