//! A configurable source of time.
//!
//! This module provides an API to get the current time in such a way that the
//! source of time may be configured. This allows mocking out the source of
//! time in tests.
//!
//! All time in this crate is expressed as signed 64-bit milliseconds since the
//! Unix epoch. By default, [`Clock`] reads the system wall clock; a custom
//! source is installed by implementing the [`Now`] trait and passing an
//! instance to [`Clock::new_with_now`].
//!
//! [`Clock`]: struct.Clock.html
//! [`Now`]: trait.Now.html
//! [`Clock::new_with_now`]: struct.Clock.html#method.new_with_now

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Returns values representing the current time in milliseconds since the
/// Unix epoch.
///
/// This allows customizing the source of time which is especially useful for
/// testing.
pub trait Now: Send + Sync + 'static {
    /// Returns the current time in milliseconds since the Unix epoch.
    fn now(&self) -> i64;
}

/// A handle to a source of time.
///
/// `Clock` instances return the current time in milliseconds since the Unix
/// epoch. Cloning a `Clock` yields a handle to the same underlying source.
#[derive(Default, Clone)]
pub struct Clock {
    now: Option<Arc<dyn Now>>,
}

impl Clock {
    /// Return a new `Clock` backed by the system clock.
    pub fn new() -> Clock {
        Clock::system()
    }

    /// Return a new `Clock` backed by the system clock.
    pub fn system() -> Clock {
        Clock { now: None }
    }

    /// Return a new `Clock` using `now` as the source of time.
    pub fn new_with_now<T: Now>(now: T) -> Clock {
        Clock {
            now: Some(Arc::new(now)),
        }
    }

    /// Returns the current time in milliseconds since the Unix epoch.
    pub fn now(&self) -> i64 {
        match self.now {
            Some(ref now) => now.now(),
            None => system_now(),
        }
    }
}

impl fmt::Debug for Clock {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("Clock")
            .field("now", {
                if self.now.is_some() {
                    &"Some(Arc<Now>)"
                } else {
                    &"None"
                }
            })
            .finish()
    }
}

fn system_now() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(since) => since.as_millis() as i64,
        Err(err) => -(err.duration().as_millis() as i64),
    }
}

/// Truncates `x` down to a multiple of `m`.
///
/// Used to snap expirations onto wheel tick boundaries. A non-positive `m`
/// returns `x` unchanged.
pub fn truncate(x: i64, m: i64) -> i64 {
    if m <= 0 {
        return x;
    }
    x - x % m
}

/// Converts a `Duration` to whole milliseconds, saturating at `i64::MAX`.
pub(crate) fn ms(duration: Duration) -> i64 {
    let millis = duration.as_millis();
    if millis > i64::MAX as u128 {
        i64::MAX
    } else {
        millis as i64
    }
}
