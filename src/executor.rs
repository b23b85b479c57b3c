//! Task execution.
//!
//! The wheel driver never runs user code itself; every task whose expiration
//! has passed is handed to the configured [`Executor`]. The default,
//! [`InlineExecutor`], runs tasks on the calling thread, which is fine for
//! cheap tasks; production configurations typically hand jobs off to a
//! thread pool so a slow task cannot delay subsequent firings.
//!
//! [`Executor`]: trait.Executor.html
//! [`InlineExecutor`]: struct.InlineExecutor.html

use log::error;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

/// A unit of work dispatched to an [`Executor`].
///
/// [`Executor`]: trait.Executor.html
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Executes jobs handed off by the wheel driver.
///
/// Implementations must isolate failures: a panicking job must not take down
/// the driver thread or the pool running it.
///
/// Any `Fn(Job) + Send + Sync` closure is an executor, so handing jobs to an
/// existing pool is a one-liner:
///
/// ```
/// use timewheel::{Job, Wheel};
///
/// let wheel = Wheel::builder()
///     .executor(|job: Job| {
///         std::thread::spawn(job);
///     })
///     .build();
/// # drop(wheel);
/// ```
pub trait Executor: Send + Sync + 'static {
    /// Execute the job.
    fn execute(&self, job: Job);
}

impl<F> Executor for F
where
    F: Fn(Job) + Send + Sync + 'static,
{
    fn execute(&self, job: Job) {
        (self)(job)
    }
}

/// The default executor: runs each job inline on the calling thread.
///
/// Panics are caught and logged so that one bad task cannot poison the driver.
#[derive(Debug, Default)]
pub struct InlineExecutor(());

impl InlineExecutor {
    /// Create a new inline executor.
    pub fn new() -> InlineExecutor {
        InlineExecutor(())
    }
}

impl Executor for InlineExecutor {
    fn execute(&self, job: Job) {
        if let Err(err) = panic::catch_unwind(AssertUnwindSafe(job)) {
            error!("task panicked: {}", panic_message(&err));
        }
    }
}

fn panic_message(err: &(dyn Any + Send)) -> &str {
    if let Some(msg) = err.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = err.downcast_ref::<String>() {
        msg
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering::SeqCst;
    use std::sync::Arc;

    #[test]
    fn inline_runs_on_caller() {
        let count = Arc::new(AtomicUsize::new(0));
        let executor = InlineExecutor::new();

        let job = count.clone();
        executor.execute(Box::new(move || {
            job.fetch_add(1, SeqCst);
        }));

        assert_eq!(count.load(SeqCst), 1);
    }

    #[test]
    fn inline_swallows_panics() {
        let executor = InlineExecutor::new();
        executor.execute(Box::new(|| panic!("boom")));

        // The executor survives and keeps running jobs.
        let ran = Arc::new(AtomicUsize::new(0));
        let job = ran.clone();
        executor.execute(Box::new(move || {
            job.fetch_add(1, SeqCst);
        }));
        assert_eq!(ran.load(SeqCst), 1);
    }
}
