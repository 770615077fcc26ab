//! Model-checked interleavings. Run with `cargo test -p twinlock-core --features loom --test loom`.
#![cfg(feature = "loom")]

use std::alloc::Layout;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

use loom::sync::Arc;
use loom::thread;
use twinlock_core::{Global, NodeAlloc, TwoLockQueue};

#[derive(Debug, Default)]
struct Counts {
    allocated: AtomicUsize,
    released: AtomicUsize,
}

/// Shared counting allocator, cloned into every queue a model builds.
#[derive(Debug, Clone, Default)]
struct CountingAlloc(std::sync::Arc<Counts>);

impl CountingAlloc {
    fn assert_balanced(&self) {
        let allocated = self.0.allocated.load(Ordering::SeqCst);
        assert!(allocated > 0);
        assert_eq!(allocated, self.0.released.load(Ordering::SeqCst));
    }
}

unsafe impl NodeAlloc for CountingAlloc {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        let ptr = Global.allocate(layout)?;
        self.0.allocated.fetch_add(1, Ordering::SeqCst);
        Some(ptr)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        self.0.released.fetch_add(1, Ordering::SeqCst);
        Global.deallocate(ptr, layout)
    }
}

#[test]
fn push_races_pop_on_empty_queue() {
    loom::model(|| {
        let alloc = CountingAlloc::default();
        let q = Arc::new(TwoLockQueue::new_in(alloc.clone()).unwrap());

        let producer = {
            let q = Arc::clone(&q);
            thread::spawn(move || q.push(1).unwrap())
        };
        let consumer = {
            let q = Arc::clone(&q);
            thread::spawn(move || q.pop())
        };

        producer.join().unwrap();
        let raced = consumer.join().unwrap();
        let rest = q.pop();

        // exactly one side observed the value
        assert_eq!(raced.into_iter().chain(rest).collect::<Vec<_>>(), vec![1]);
        assert_eq!(q.pop(), None);

        drop(q);
        alloc.assert_balanced();
    });
}

#[test]
fn push_races_pop_on_single_element() {
    loom::model(|| {
        let alloc = CountingAlloc::default();
        let q = Arc::new(TwoLockQueue::new_in(alloc.clone()).unwrap());
        q.push(1).unwrap();

        let producer = {
            let q = Arc::clone(&q);
            thread::spawn(move || q.push(2).unwrap())
        };
        let consumer = {
            let q = Arc::clone(&q);
            thread::spawn(move || q.pop())
        };

        producer.join().unwrap();
        assert_eq!(consumer.join().unwrap(), Some(1));
        // sentinel plus the node holding 2; the node that held 1 became the
        // sentinel and the first sentinel was freed
        assert_eq!(
            alloc.0.allocated.load(Ordering::SeqCst) - alloc.0.released.load(Ordering::SeqCst),
            2
        );
        assert_eq!(q.pop(), Some(2));
        assert_eq!(q.pop(), None);

        drop(q);
        alloc.assert_balanced();
    });
}

#[test]
fn two_consumers_split_two_values() {
    loom::model(|| {
        let alloc = CountingAlloc::default();
        let q = Arc::new(TwoLockQueue::new_in(alloc.clone()).unwrap());
        q.push(1).unwrap();
        q.push(2).unwrap();

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let q = Arc::clone(&q);
                thread::spawn(move || q.pop())
            })
            .collect();

        let mut got: Vec<_> = handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .collect();
        got.sort_unstable();
        assert_eq!(got, vec![1, 2]);
        assert!(q.is_empty());

        drop(q);
        alloc.assert_balanced();
    });
}

#[test]
fn teardown_after_racing_push_frees_every_node() {
    loom::model(|| {
        let alloc = CountingAlloc::default();
        let q = Arc::new(TwoLockQueue::new_in(alloc.clone()).unwrap());

        let handles: Vec<_> = (0..2)
            .map(|i| {
                let q = Arc::clone(&q);
                thread::spawn(move || q.push(i).unwrap())
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        // values still queued are released by Drop
        drop(q);
        assert_eq!(alloc.0.allocated.load(Ordering::SeqCst), 3);
        alloc.assert_balanced();
    });
}
