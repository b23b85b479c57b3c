//! Task traits and stock loop policies.

use crate::clock;

use std::time::Duration;

/// A schedulable unit of work.
///
/// Implemented for every `FnMut() + Send` closure, so most call sites just
/// pass a closure. Implement the trait directly to carry explicit state.
pub trait Task: Send + 'static {
    /// Runs the task.
    fn execute(&mut self);
}

impl<F> Task for F
where
    F: FnMut() + Send + 'static,
{
    fn execute(&mut self) {
        self()
    }
}

/// A task that reschedules itself.
///
/// After each firing the wheel asks [`next`] for the following expiration; a
/// value at or before `previous` ends the loop.
///
/// [`next`]: #tymethod.next
pub trait LoopTask: Task {
    /// Returns the next expiration in milliseconds since the Unix epoch.
    ///
    /// `previous` is the expiration that just fired; `now` is the wheel
    /// clock's current time. Returning a value at or before `previous` stops
    /// the loop.
    fn next(&mut self, previous: i64, now: i64) -> i64;
}

/// Fixed-interval loop policy with a remaining-fire budget.
///
/// A non-negative count decrements once per firing and the loop stops when it
/// reaches zero; a negative count runs forever. A count of zero never runs
/// the task at all.
///
/// By default the previous expiration is clamped to the current time before
/// the interval is added, so a stalled executor produces at most one catch-up
/// firing instead of a burst. [`catch_up`] restores the unclamped arithmetic.
///
/// ```
/// use timewheel::{Every, Wheel};
/// use std::time::Duration;
///
/// let wheel = Wheel::new();
/// let timer = wheel.repeat(
///     Duration::from_millis(10),
///     Every::new(Duration::from_millis(10), 3, || println!("tick")),
/// );
/// # timer.stop();
/// ```
///
/// [`catch_up`]: #method.catch_up
pub struct Every<T> {
    interval: i64,
    remaining: i64,
    catch_up: bool,
    task: T,
}

impl<T: Task> Every<T> {
    /// Fire `task` up to `times` times, `interval` apart.
    pub fn new(interval: Duration, times: i64, task: T) -> Every<T> {
        Every {
            interval: clock::ms(interval),
            remaining: times,
            catch_up: false,
            task,
        }
    }

    /// Fire `task` every `interval`, forever.
    pub fn forever(interval: Duration, task: T) -> Every<T> {
        Every::new(interval, -1, task)
    }

    /// Controls catch-up behavior after a stall.
    ///
    /// When `true`, the next expiration is computed from the previous one
    /// without clamping to the current time, so a delayed firing is followed
    /// by a burst that restores the original cadence.
    pub fn catch_up(mut self, catch_up: bool) -> Every<T> {
        self.catch_up = catch_up;
        self
    }
}

impl<T: Task> Task for Every<T> {
    fn execute(&mut self) {
        if self.remaining == 0 {
            return;
        }
        self.task.execute();
        if self.remaining > 0 {
            self.remaining -= 1;
        }
    }
}

impl<T: Task> LoopTask for Every<T> {
    fn next(&mut self, previous: i64, now: i64) -> i64 {
        if self.remaining == 0 {
            return previous;
        }
        let base = if self.catch_up {
            previous
        } else {
            previous.max(now)
        };
        base + self.interval
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn every(times: i64) -> Every<impl FnMut() + Send + 'static> {
        Every::new(Duration::from_millis(100), times, || {})
    }

    #[test]
    fn counts_down_to_a_stop() {
        let mut task = every(2);

        task.execute();
        assert!(task.next(1_000, 1_000) > 1_000);

        task.execute();
        // Budget exhausted: next must not advance.
        assert_eq!(task.next(1_100, 1_100), 1_100);
    }

    #[test]
    fn negative_count_runs_forever() {
        let mut task = every(-1);
        for round in 0..100 {
            task.execute();
            let previous = round * 100;
            assert_eq!(task.next(previous, previous), previous + 100);
        }
    }

    #[test]
    fn clamps_to_now_by_default() {
        let mut task = every(-1);
        // The firing ran 5 seconds late; the next one is measured from now.
        assert_eq!(task.next(1_000, 6_000), 6_100);
    }

    #[test]
    fn catch_up_skips_the_clamp() {
        let mut task = every(-1).catch_up(true);
        assert_eq!(task.next(1_000, 6_000), 1_100);
    }
}
