use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Instant;
use tracing::{debug, info, warn};
use twinlock_core::{Global, NodeAlloc, TwoLockQueue};

use crate::config::StressConfig;
use crate::error::{Result, StressError};

/// Attempts per terminal marker before the run is aborted.
const MARKER_ATTEMPTS: usize = 64;

#[derive(Debug, Clone, Serialize)]
pub struct StressReport {
    pub producers: usize,
    pub consumers: usize,
    pub expected: u64,
    pub pushed: u64,
    pub push_failures: u64,
    pub received: u64,
    /// `None` when verification was disabled.
    pub duplicates: Option<u64>,
    pub missing: Option<u64>,
    pub elapsed_secs: f64,
    pub ops_per_sec: f64,
}

impl StressReport {
    /// Every produced value was received exactly once.
    pub fn is_clean(&self) -> bool {
        self.push_failures == 0
            && self.received == self.expected
            && self.duplicates.unwrap_or(0) == 0
            && self.missing.unwrap_or(0) == 0
    }
}

/// What one consumer saw before its terminal marker.
struct Consumed {
    count: u64,
    values: Vec<i64>,
}

pub fn run(config: &StressConfig) -> Result<StressReport> {
    run_in(config, Global)
}

/// Same as [`run`], with every queue node taken from `alloc`.
pub fn run_in<A: NodeAlloc + Sync>(config: &StressConfig, alloc: A) -> Result<StressReport> {
    config.validate()?;

    let queue = TwoLockQueue::<i64, A>::new_in(alloc)?;
    let push_failures = AtomicU64::new(0);
    let abort = AtomicBool::new(false);

    info!(
        producers = config.producers,
        consumers = config.consumers,
        items_per_producer = config.items_per_producer,
        "starting stress run"
    );
    let started = Instant::now();

    let consumed = thread::scope(|s| -> Result<Vec<Consumed>> {
        let producers: Vec<_> = (0..config.producers)
            .map(|id| {
                let (queue, push_failures) = (&queue, &push_failures);
                s.spawn(move || produce(queue, id, config, push_failures))
            })
            .collect();

        let consumers: Vec<_> = (0..config.consumers)
            .map(|id| {
                let (queue, abort) = (&queue, &abort);
                s.spawn(move || consume(queue, id, config, abort))
            })
            .collect();

        let mut outcome = Ok(());
        for handle in producers {
            if handle.join().is_err() && outcome.is_ok() {
                outcome = Err(StressError::WorkerPanicked("producer"));
            }
        }
        if outcome.is_ok() {
            outcome = deliver_markers(&queue, config);
        }
        if outcome.is_err() {
            // consumers may never see a marker; let them stop at the next empty pop
            abort.store(true, Ordering::Release);
        }

        let mut consumed = Vec::with_capacity(config.consumers);
        for handle in consumers {
            match handle.join() {
                Ok(c) => consumed.push(c),
                Err(_) if outcome.is_ok() => outcome = Err(StressError::WorkerPanicked("consumer")),
                Err(_) => {}
            }
        }
        outcome.map(|()| consumed)
    })?;

    let elapsed = started.elapsed();
    let expected = config.total_items();
    let push_failures = push_failures.into_inner();
    let received: u64 = consumed.iter().map(|c| c.count).sum();

    let (duplicates, missing) = if config.verify {
        let (d, m) = tally(
            expected,
            consumed.iter().flat_map(|c| c.values.iter().copied()),
        );
        (Some(d), Some(m))
    } else {
        (None, None)
    };

    let elapsed_secs = elapsed.as_secs_f64();
    let report = StressReport {
        producers: config.producers,
        consumers: config.consumers,
        expected,
        pushed: expected - push_failures,
        push_failures,
        received,
        duplicates,
        missing,
        elapsed_secs,
        // every received value was pushed once and popped once
        ops_per_sec: if elapsed_secs > 0.0 {
            (received * 2) as f64 / elapsed_secs
        } else {
            0.0
        },
    };
    info!(
        received = report.received,
        elapsed_secs = report.elapsed_secs,
        ops_per_sec = report.ops_per_sec,
        clean = report.is_clean(),
        "stress run finished"
    );
    Ok(report)
}

fn produce<A: NodeAlloc>(
    queue: &TwoLockQueue<i64, A>,
    id: usize,
    config: &StressConfig,
    failures: &AtomicU64,
) {
    let base = id as i64 * config.items_per_producer as i64;
    let mut failed = 0u64;
    for i in 0..config.items_per_producer as i64 {
        if let Err(e) = queue.push(base + i) {
            warn!(producer = id, value = base + i, error = %e, "push failed");
            failed += 1;
        }
    }
    failures.fetch_add(failed, Ordering::Relaxed);
    debug!(producer = id, failed, "producer finished");
}

fn consume<A: NodeAlloc>(
    queue: &TwoLockQueue<i64, A>,
    id: usize,
    config: &StressConfig,
    abort: &AtomicBool,
) -> Consumed {
    let mut consumed = Consumed {
        count: 0,
        values: Vec::new(),
    };
    loop {
        match queue.pop() {
            Some(v) if v == config.terminal_marker => break,
            Some(v) => {
                consumed.count += 1;
                if config.verify {
                    consumed.values.push(v);
                }
            }
            None if abort.load(Ordering::Acquire) => break,
            None => thread::yield_now(),
        }
    }
    debug!(consumer = id, received = consumed.count, "consumer finished");
    consumed
}

/// Pushes one marker per consumer. Allocation failures are retried a bounded
/// number of times since a lost marker would leave a consumer polling forever.
fn deliver_markers<A: NodeAlloc>(
    queue: &TwoLockQueue<i64, A>,
    config: &StressConfig,
) -> Result<()> {
    for consumer in 0..config.consumers {
        let mut marker = config.terminal_marker;
        let mut attempt = 1;
        while let Err(e) = queue.push(marker) {
            if attempt == MARKER_ATTEMPTS {
                return Err(StressError::MarkerUndelivered {
                    consumer,
                    cause: e.cause().clone(),
                });
            }
            warn!(consumer, attempt, error = %e, "retrying terminal marker");
            marker = e.into_inner();
            attempt += 1;
            thread::yield_now();
        }
    }
    Ok(())
}

/// Counts duplicated and missing values against the produced range `0..expected`.
fn tally(expected: u64, values: impl Iterator<Item = i64>) -> (u64, u64) {
    let mut seen = vec![false; expected as usize];
    let mut duplicates = 0u64;
    for v in values {
        match usize::try_from(v).ok().and_then(|i| seen.get_mut(i)) {
            Some(slot) if *slot => duplicates += 1,
            Some(slot) => *slot = true,
            // outside the produced range
            None => duplicates += 1,
        }
    }
    let missing = seen.iter().filter(|s| !**s).count() as u64;
    (duplicates, missing)
}
