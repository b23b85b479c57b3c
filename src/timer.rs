//! Timer handles and the entries behind them.

use crate::atomic::AtomicI64;
use crate::bucket::Bucket;

use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::SeqCst;
use std::sync::{Arc, Mutex, Weak};

/// The task stored on an entry; re-run on every firing for loop and cron
/// timers.
///
/// The closure returns the expiration of the next firing, or `None` for a
/// task that is done. The dispatch path re-arms and resubmits the entry
/// *after* the call returns, once the task cell is unlocked again, so a
/// re-arm landing inside the current tick can dispatch recursively without
/// self-deadlocking on the cell.
pub(crate) type TaskCell = Box<dyn FnMut(&Entry) -> Option<i64> + Send + 'static>;

/// Handle to a scheduled task.
///
/// Returned by the scheduling methods on [`Wheel`]. Dropping the handle does
/// not cancel the task; call [`stop`] for that. Handles are cheap to clone
/// and may be used from any thread.
///
/// [`Wheel`]: struct.Wheel.html
/// [`stop`]: #method.stop
#[derive(Clone)]
pub struct Timer {
    entry: Arc<Entry>,
}

/// State shared between the timer handle, the bucket owning the timer, and
/// any in-flight dispatch.
pub(crate) struct Entry {
    /// Absolute expiration in milliseconds since the Unix epoch. Rewritten
    /// when a loop or cron task re-arms.
    expiration: AtomicI64,

    /// Sticky cancellation flag. A stopped entry is never rescheduled.
    stopped: AtomicBool,

    /// Claim on the current firing cycle. Exactly one claimant wins per
    /// cycle: the dispatch path or a `stop` call.
    fired: AtomicBool,

    /// The task. Locked only while firing or while being installed.
    task: Mutex<TaskCell>,

    /// Current owner. The bucket and node key are published together; `None`
    /// is authoritative and the key must never be used without the bucket it
    /// was published with.
    slot: Mutex<Option<(Weak<Bucket>, usize)>>,
}

// ===== impl Timer =====

impl Timer {
    pub(crate) fn new(entry: Arc<Entry>) -> Timer {
        Timer { entry }
    }

    /// Cancels the timer.
    ///
    /// Returns `true` if this call prevented the pending firing: the task
    /// will not run (again). Returns `false` if the firing had already been
    /// claimed: the task ran, is currently running, or was already stopped.
    ///
    /// Safe to call concurrently with the driver moving the timer between
    /// wheel levels, and idempotent: at most one `stop` call ever returns
    /// `true` per firing.
    pub fn stop(&self) -> bool {
        self.entry.stopped.store(true, SeqCst);
        let claimed = self.entry.claim();

        // Unlink from whatever bucket currently owns the entry. The driver
        // can re-home the entry concurrently, so retry against the published
        // owner until a removal lands or ownership is gone.
        loop {
            let bucket = match self.entry.slot() {
                Some((bucket, _)) => bucket.upgrade(),
                None => break,
            };
            match bucket {
                Some(bucket) => {
                    if bucket.remove(&self.entry) {
                        break;
                    }
                }
                None => break,
            }
        }

        claimed
    }

    /// Returns `true` once [`stop`] has been called.
    ///
    /// [`stop`]: #method.stop
    pub fn is_stopped(&self) -> bool {
        self.entry.is_stopped()
    }

    /// The absolute expiration in milliseconds since the Unix epoch.
    ///
    /// For loop and cron timers this is the next (or in-flight) firing.
    pub fn expiration(&self) -> i64 {
        self.entry.expiration()
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("Timer")
            .field("expiration", &self.expiration())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

// ===== impl Entry =====

impl Entry {
    pub(crate) fn new(expiration: i64) -> Arc<Entry> {
        Arc::new(Entry {
            expiration: AtomicI64::new(expiration),
            stopped: AtomicBool::new(false),
            fired: AtomicBool::new(false),
            task: Mutex::new(Box::new(|_| None)),
            slot: Mutex::new(None),
        })
    }

    pub(crate) fn set_task(&self, task: TaskCell) {
        *self.task.lock().unwrap() = task;
    }

    /// Runs the task, returning the expiration of the next firing for tasks
    /// that re-arm. Only ever called from the executor.
    pub(crate) fn run(&self) -> Option<i64> {
        let mut task = self.task.lock().unwrap();
        (*task)(self)
    }

    /// Claims the right to consume the current firing cycle.
    ///
    /// The dispatch path claims before executing; `stop` claims to prevent
    /// execution. Whoever loses the race backs off, so a task runs at most
    /// once per cycle and a successful stop guarantees it does not run.
    pub(crate) fn claim(&self) -> bool {
        !self.fired.swap(true, SeqCst)
    }

    /// Re-arms the entry for another firing cycle at `expiration`.
    pub(crate) fn rearm(&self, expiration: i64) {
        self.set_expiration(expiration);
        self.fired.store(false, SeqCst);
    }

    pub(crate) fn expiration(&self) -> i64 {
        self.expiration.load(SeqCst)
    }

    pub(crate) fn set_expiration(&self, expiration: i64) {
        self.expiration.store(expiration, SeqCst);
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.load(SeqCst)
    }

    pub(crate) fn slot(&self) -> Option<(Weak<Bucket>, usize)> {
        self.slot.lock().unwrap().clone()
    }

    pub(crate) fn set_slot(&self, slot: Option<(Weak<Bucket>, usize)>) {
        *self.slot.lock().unwrap() = slot;
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("Entry")
            .field("expiration", &self.expiration())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn claim_is_won_once_per_cycle() {
        let entry = Entry::new(0);

        assert!(entry.claim());
        assert!(!entry.claim());

        entry.rearm(10);
        assert_eq!(entry.expiration(), 10);
        assert!(entry.claim());
        assert!(!entry.claim());
    }

    #[test]
    fn stop_without_placement() {
        let timer = Timer::new(Entry::new(0));

        assert!(!timer.is_stopped());
        assert!(timer.stop());
        assert!(timer.is_stopped());

        // Idempotent: the cycle was already claimed.
        assert!(!timer.stop());
    }
}
