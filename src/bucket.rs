//! A single slot's worth of timers.
//!
//! Every timer whose expiration truncates to the same wheel slot lands in the
//! same bucket. Buckets are allocated once per wheel level and reused as the
//! ring turns; the atomic expiration tracks which turn the bucket currently
//! represents, with `-1` meaning idle.
//!
//! The timer list is a doubly-linked FIFO stored in a slab and linked by slab
//! index, which gives each timer a stable node key for O(1) removal while
//! keeping the structure free of raw pointers.

use crate::atomic::AtomicI64;
use crate::queue::DelayQueue;
use crate::timer::Entry;

use slab::Slab;

use std::ptr;
use std::sync::atomic::Ordering::SeqCst;
use std::sync::{Arc, RwLock, Weak};

pub(crate) struct Bucket {
    /// Back-reference handed to timers so `stop` can find its way here.
    me: Weak<Bucket>,

    /// Expiration of the slot turn this bucket is scheduled for, `-1` while
    /// the bucket is idle.
    expiration: AtomicI64,

    list: RwLock<List>,

    /// Poked when a removal may have emptied the bucket ahead of its
    /// scheduled expiration, so the driver re-evaluates its sleep.
    queue: Weak<DelayQueue>,
}

/// Doubly-linked FIFO of entries, linked by slab key.
struct List {
    slab: Slab<Node>,
    head: Option<usize>,
    tail: Option<usize>,
}

struct Node {
    entry: Arc<Entry>,
    next: Option<usize>,
    prev: Option<usize>,
}

impl Bucket {
    pub(crate) fn new(queue: Weak<DelayQueue>) -> Arc<Bucket> {
        Arc::new_cyclic(|me| Bucket {
            me: me.clone(),
            expiration: AtomicI64::new(-1),
            list: RwLock::new(List {
                slab: Slab::new(),
                head: None,
                tail: None,
            }),
            queue,
        })
    }

    pub(crate) fn expiration(&self) -> i64 {
        self.expiration.load(SeqCst)
    }

    /// Swings the bucket expiration, returning `true` if the value changed.
    ///
    /// The caller re-submits the bucket to the delay queue on a change; an
    /// unchanged value means the bucket is already scheduled for this turn.
    pub(crate) fn set_expiration(&self, expiration: i64) -> bool {
        self.expiration.swap(expiration, SeqCst) != expiration
    }

    pub(crate) fn len(&self) -> usize {
        self.list.read().unwrap().slab.len()
    }

    /// Appends `entry` and publishes the bucket/node pair on the entry.
    pub(crate) fn add(&self, entry: &Arc<Entry>) {
        let mut list = self.list.write().unwrap();
        let key = list.push_back(entry.clone());
        entry.set_slot(Some((self.me.clone(), key)));
    }

    /// Removes `entry` if this bucket still owns it.
    ///
    /// Returns `false` when the entry has moved on: flushed or re-homed by
    /// the driver between the caller's load of the owner and this call.
    pub(crate) fn remove(&self, entry: &Arc<Entry>) -> bool {
        let mut list = self.list.write().unwrap();

        // Re-check ownership under the lock: a concurrent flush may have
        // unlinked the entry, and its old key may already be reused.
        let key = match entry.slot() {
            Some((ref bucket, key)) if ptr::eq(bucket.as_ptr(), self) => key,
            _ => return false,
        };

        list.unlink(key);
        entry.set_slot(None);
        drop(list);

        if let Some(queue) = self.queue.upgrade() {
            queue.refresh();
        }

        true
    }

    /// Drains the bucket in FIFO order, handing each entry to `reinsert`.
    ///
    /// Runs on the driver once the slot's expiration has passed. The list is
    /// unlinked under the lock, then the entries are offered synchronously
    /// outside it: the reinserter either dispatches an entry or re-inserts it
    /// into a finer level, and either one may take other bucket locks.
    pub(crate) fn flush(&self, reinsert: &mut dyn FnMut(Arc<Entry>)) {
        let mut drained = Vec::new();
        {
            let mut list = self.list.write().unwrap();
            while let Some(key) = list.head {
                let entry = list.unlink(key);
                entry.set_slot(None);
                drained.push(entry);
            }
            self.set_expiration(-1);
        }

        for entry in drained {
            reinsert(entry);
        }
    }

    #[cfg(test)]
    pub(crate) fn entry_expirations(&self) -> Vec<i64> {
        let list = self.list.read().unwrap();
        let mut out = Vec::new();
        let mut next = list.head;
        while let Some(key) = next {
            let node = &list.slab[key];
            out.push(node.entry.expiration());
            next = node.next;
        }
        out
    }
}

impl List {
    fn push_back(&mut self, entry: Arc<Entry>) -> usize {
        let prev = self.tail;
        let key = self.slab.insert(Node {
            entry,
            next: None,
            prev,
        });

        match prev {
            Some(tail) => self.slab[tail].next = Some(key),
            None => self.head = Some(key),
        }
        self.tail = Some(key);

        key
    }

    fn unlink(&mut self, key: usize) -> Arc<Entry> {
        let node = self.slab.remove(key);

        match node.prev {
            Some(prev) => self.slab[prev].next = node.next,
            None => self.head = node.next,
        }
        match node.next {
            Some(next) => self.slab[next].prev = node.prev,
            None => self.tail = node.prev,
        }

        node.entry
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn bucket() -> Arc<Bucket> {
        Bucket::new(Weak::new())
    }

    #[test]
    fn flush_preserves_insertion_order() {
        let bucket = bucket();

        for expiration in 0..5i64 {
            bucket.add(&Entry::new(expiration));
        }
        assert_eq!(bucket.len(), 5);

        let mut flushed = Vec::new();
        bucket.flush(&mut |entry| flushed.push(entry.expiration()));

        assert_eq!(flushed, vec![0, 1, 2, 3, 4]);
        assert_eq!(bucket.len(), 0);
        assert_eq!(bucket.expiration(), -1);
    }

    #[test]
    fn remove_unlinks_middle_entries() {
        let bucket = bucket();

        let entries: Vec<_> = (0..3i64).map(Entry::new).collect();
        for entry in &entries {
            bucket.add(entry);
        }

        assert!(bucket.remove(&entries[1]));
        assert_eq!(bucket.entry_expirations(), vec![0, 2]);

        // Already removed; ownership is gone.
        assert!(!bucket.remove(&entries[1]));
    }

    #[test]
    fn remove_rejects_foreign_entries() {
        let a = bucket();
        let b = bucket();

        let entry = Entry::new(7);
        a.add(&entry);

        assert!(!b.remove(&entry));
        assert!(a.remove(&entry));
    }

    #[test]
    fn set_expiration_reports_changes() {
        let bucket = bucket();

        assert_eq!(bucket.expiration(), -1);
        assert!(bucket.set_expiration(100));
        assert!(!bucket.set_expiration(100));
        assert!(bucket.set_expiration(200));
    }
}
