//! The delay queue driving the wheel hierarchy.
//!
//! Buckets from every level of the hierarchy are submitted here, keyed by
//! their expiration. A single worker thread, the *driver*, sleeps until the
//! earliest bucket is due, then hands it to the handler installed by the
//! innermost wheel. Producers wake the worker early whenever they insert a
//! sooner expiration or empty out the bucket the worker is sleeping on.
//!
//! The worker only exists while there is work: the first `add` against an
//! idle queue spawns it, and it exits once the heap is drained and no wake-up
//! arrived while it was draining.

use crate::bucket::Bucket;
use crate::clock::Clock;

use crossbeam_utils::sync::{Parker, Unparker};
use log::trace;

use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering::SeqCst;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// No worker is running; the next `add` must start one.
const SLEEPING: usize = 0;

/// A worker is draining the queue.
const WORKING: usize = 1;

/// Handler invoked with each bucket whose expiration has passed.
pub(crate) type ExpireHandler = Box<dyn Fn(Arc<Bucket>) + Send + Sync + 'static>;

pub(crate) struct DelayQueue {
    /// Worker state; transitions are made with compare-and-swap so at most
    /// one worker is ever active.
    state: AtomicUsize,

    /// Number of wake-ups requested while a worker was already active.
    pending: AtomicUsize,

    heap: Mutex<PriorityQueue>,

    clock: Clock,

    handler: ExpireHandler,

    /// Parker for the active worker. Only the single worker locks this; the
    /// mutex exists because successive worker episodes may run on different
    /// threads.
    parker: Mutex<Parker>,

    unparker: Unparker,
}

impl DelayQueue {
    pub(crate) fn new(capacity: usize, clock: Clock, handler: ExpireHandler) -> Arc<DelayQueue> {
        let parker = Parker::new();
        let unparker = parker.unparker().clone();

        Arc::new(DelayQueue {
            state: AtomicUsize::new(SLEEPING),
            pending: AtomicUsize::new(0),
            heap: Mutex::new(PriorityQueue::with_capacity(capacity)),
            clock,
            handler,
            parker: Mutex::new(parker),
            unparker,
        })
    }

    /// Submits `bucket` at the given expiration.
    ///
    /// Starts a worker if none is running; otherwise interrupts the current
    /// sleep so the worker re-evaluates the head, which may now be sooner.
    pub(crate) fn add(self: &Arc<Self>, bucket: Arc<Bucket>, expiration: i64) {
        self.heap.lock().unwrap().push(bucket, expiration);

        if self
            .state
            .compare_exchange(SLEEPING, WORKING, SeqCst, SeqCst)
            .is_ok()
        {
            let queue = self.clone();
            thread::Builder::new()
                .name("timewheel-driver".into())
                .spawn(move || queue.work())
                .expect("failed to spawn timewheel driver");
        } else {
            self.pending.fetch_add(1, SeqCst);
            self.unparker.unpark();
        }
    }

    /// Cancels any in-flight sleep without adding work.
    ///
    /// Called when a bucket's contents changed under the worker (e.g. its
    /// last timer was stopped) so the driver does not keep sleeping on a dead
    /// head.
    pub(crate) fn refresh(&self) {
        self.unparker.unpark();
    }

    fn work(self: Arc<Self>) {
        trace!("driver started");

        loop {
            self.process();

            self.state.store(SLEEPING, SeqCst);
            if self.pending.load(SeqCst) == 0 {
                break;
            }
            // An add raced in while draining. Take the worker role back; if
            // the CAS fails the add already spawned a replacement.
            if self
                .state
                .compare_exchange(SLEEPING, WORKING, SeqCst, SeqCst)
                .is_err()
            {
                break;
            }
        }

        trace!("driver exited");
    }

    /// Drains every due bucket, sleeping toward the head expiration in
    /// between. Returns once the heap is empty.
    fn process(&self) {
        self.pending.store(0, SeqCst);

        let parker = self.parker.lock().unwrap();

        loop {
            let now = self.clock.now();

            let head = self.heap.lock().unwrap().peek_and_shift(now);

            let (bucket, delta) = match head {
                Some(head) => head,
                None => return,
            };

            if delta > 0 {
                // Head is in the future. The sleep is cut short by `add` and
                // `refresh`, after which the head is re-evaluated.
                parker.park_timeout(Duration::from_millis(delta as u64));
                continue;
            }

            if bucket.len() == 0 {
                // Stale entry: the bucket emptied (or was flushed through a
                // re-submission) after this entry was pushed.
                continue;
            }

            (self.handler)(bucket);
        }
    }
}

/// Min-heap of `(bucket, expiration)` pairs backing the delay queue.
///
/// The backing storage grows by doubling (`Vec` push) and is halved once
/// occupancy falls below a quarter of capacity, down to a small floor, so a
/// long-running process does not hold on to a burst's worth of memory
/// forever.
pub(crate) struct PriorityQueue {
    items: Vec<Item>,
}

struct Item {
    bucket: Arc<Bucket>,
    priority: i64,
}

/// Capacity below which the heap no longer shrinks.
const SHRINK_FLOOR: usize = 25;

impl PriorityQueue {
    fn with_capacity(capacity: usize) -> PriorityQueue {
        PriorityQueue {
            items: Vec::with_capacity(capacity),
        }
    }

    fn push(&mut self, bucket: Arc<Bucket>, priority: i64) {
        self.items.push(Item { bucket, priority });
        self.sift_up(self.items.len() - 1);
    }

    fn pop(&mut self) -> Option<Item> {
        if self.items.is_empty() {
            return None;
        }

        let last = self.items.len() - 1;
        self.items.swap(0, last);
        let item = self.items.pop();
        self.sift_down(0);
        self.maybe_shrink();

        item
    }

    /// Peeks the head and pops it if due.
    ///
    /// Returns the head bucket paired with `0` if its priority is at or
    /// before `now` (the entry is removed), or with the remaining delay if it
    /// is still in the future (the entry stays put). `None` if the heap is
    /// empty.
    fn peek_and_shift(&mut self, now: i64) -> Option<(Arc<Bucket>, i64)> {
        let head = self.items.first()?;

        if head.priority > now {
            return Some((head.bucket.clone(), head.priority - now));
        }

        let item = self.pop().expect("non-empty heap must pop");
        Some((item.bucket, 0))
    }

    fn maybe_shrink(&mut self) {
        let capacity = self.items.capacity();
        if capacity > SHRINK_FLOOR && self.items.len() < capacity / 4 {
            self.items.shrink_to(capacity / 2);
        }
    }

    fn sift_up(&mut self, mut idx: usize) {
        while idx > 0 {
            let parent = (idx - 1) / 2;
            if self.items[idx].priority >= self.items[parent].priority {
                break;
            }
            self.items.swap(idx, parent);
            idx = parent;
        }
    }

    fn sift_down(&mut self, mut idx: usize) {
        loop {
            let left = idx * 2 + 1;
            if left >= self.items.len() {
                break;
            }

            let right = left + 1;
            let child = if right < self.items.len()
                && self.items[right].priority < self.items[left].priority
            {
                right
            } else {
                left
            };

            if self.items[idx].priority <= self.items[child].priority {
                break;
            }

            self.items.swap(idx, child);
            idx = child;
        }
    }
}
