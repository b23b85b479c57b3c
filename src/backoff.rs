//! Retry-delay computation.
//!
//! Standalone helpers for pacing retries; they pair naturally with
//! [`Wheel::after`]:
//!
//! ```
//! use timewheel::{backoff, Wheel};
//! use std::time::Duration;
//!
//! let wheel = Wheel::new();
//! let attempt = 2;
//!
//! if let Some(delay) = backoff::standard(
//!     attempt,
//!     5,
//!     Duration::from_millis(100),
//!     Duration::from_secs(30),
//! ) {
//!     let timer = wheel.after(delay, || { /* retry the operation */ });
//! #   timer.stop();
//! }
//! ```
//!
//! [`Wheel::after`]: ../struct.Wheel.html#method.after

use rand::Rng;

use std::time::Duration;

/// Computes the delay before retry number `attempt` (zero-based) with the
/// standard parameters: multiplier 2, randomization factor 0.5.
pub fn standard(attempt: i32, max_retries: i32, base: Duration, max: Duration) -> Option<Duration> {
    exponential(attempt, max_retries, base, max, 2.0, 0.5)
}

/// Computes the delay before retry number `attempt` (zero-based) using
/// exponential backoff.
///
/// Returns `None` once `attempt` exceeds `max_retries`; a negative
/// `max_retries` retries without bound. The delay grows from `base` by
/// `multiplier` per attempt, is capped at `max`, and `randomization` mixes in
/// jitter proportional to `base` so simultaneous failures do not retry in
/// lockstep.
pub fn exponential(
    attempt: i32,
    max_retries: i32,
    base: Duration,
    max: Duration,
    multiplier: f64,
    randomization: f64,
) -> Option<Duration> {
    if max_retries > -1 && attempt > max_retries {
        return None;
    }

    let base_ms = base.as_millis() as f64;
    let delay = base_ms * multiplier.powi(attempt);
    let jitter = (rand::thread_rng().gen::<f64>() - 0.5) * randomization * base_ms;

    let millis = (delay + jitter).max(0.0);
    let delay = Duration::from_millis(millis as u64);

    Some(delay.min(max))
}
