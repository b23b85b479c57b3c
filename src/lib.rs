//! A hierarchical timing wheel for managing very large numbers of timers.
//!
//! Timers are hashed into tick-sized buckets on a ring; timers beyond the
//! ring's span live in lazily created coarser levels and are re-hashed into
//! finer ones as their expiration approaches. Insertion and cancellation are
//! near-constant-time regardless of how many timers are pending, and the
//! wake-up cost of a tick is proportional to the number of timers actually
//! firing, so the structure comfortably tracks hundreds of thousands to
//! millions of pending timers.
//!
//! The crate is thread-based: any number of producer threads schedule and
//! stop timers, while a single driver thread sleeps on a shared delay queue
//! until the earliest bucket is due. Due tasks are handed to a pluggable
//! [`Executor`]; the default runs them inline on the driver, and production
//! configurations typically plug in a thread pool.
//!
//! # Scheduling
//!
//! Everything reduces to one primitive, [`Wheel::schedule`], which takes an
//! absolute expiration in milliseconds since the Unix epoch. Conveniences
//! are layered on top: [`after`] for one-shot delays, [`repeat`]
//! for self-rescheduling tasks, [`cron`] for wall-clock schedules, and
//! [`named`] for string-keyed registries with replace-on-insert semantics.
//!
//! ```
//! use timewheel::Wheel;
//! use std::sync::mpsc;
//! use std::time::Duration;
//!
//! let wheel = Wheel::new();
//!
//! let (tx, rx) = mpsc::channel();
//! let timer = wheel.after(Duration::from_millis(20), move || {
//!     tx.send(()).unwrap();
//! });
//!
//! rx.recv_timeout(Duration::from_secs(1)).expect("timer fired");
//! assert!(!timer.stop());
//! ```
//!
//! # Accuracy
//!
//! This is not a real-time system. A timer fires no earlier than one tick
//! before its expiration and otherwise as soon as the driver and executor get
//! to it; accuracy is bounded by the configured tick plus executor latency.
//! State is in-memory only and does not survive the process.
//!
//! [`Executor`]: trait.Executor.html
//! [`Wheel::schedule`]: struct.Wheel.html#method.schedule
//! [`after`]: struct.Wheel.html#method.after
//! [`repeat`]: struct.Wheel.html#method.repeat
//! [`cron`]: struct.Wheel.html#method.cron
//! [`named`]: struct.Wheel.html#method.named

mod atomic;
mod bucket;
mod error;
mod executor;
mod named;
mod queue;
mod task;
mod timer;
mod wheel;

pub mod backoff;
pub mod clock;

pub use crate::error::Error;
pub use crate::executor::{Executor, InlineExecutor, Job};
pub use crate::named::Named;
pub use crate::task::{Every, LoopTask, Task};
pub use crate::timer::Timer;
pub use crate::wheel::{Builder, Wheel};
