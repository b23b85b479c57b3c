//! The hierarchical timing wheel.
//!
//! A wheel level is a fixed ring of buckets, each covering one tick. A timer
//! whose expiration falls within the level's span is hashed into the bucket
//! at `(expiration / tick) % size`; one that falls beyond it is pushed into a
//! lazily created overflow level whose tick equals this level's whole span.
//!
//! All levels share one delay queue, so a single driver thread serves the
//! entire hierarchy. When the driver pulls an expired bucket it first
//! advances every level's clock to the bucket's expiration, then flushes the
//! bucket through [`Level::submit`]: a timer now inside the current tick is
//! dispatched to the executor, while a timer still in the future re-enters
//! the hierarchy at a finer level. Repeating that demotion walks every timer
//! down to the innermost wheel by the time it is due.

use crate::atomic::AtomicI64;
use crate::bucket::Bucket;
use crate::clock::{self, Clock};
use crate::error::Error;
use crate::executor::{Executor, InlineExecutor, Job};
use crate::named::Named;
use crate::queue::{DelayQueue, ExpireHandler};
use crate::task::{LoopTask, Task};
use crate::timer::{Entry, Timer};

use chrono::TimeZone;
use cron::Schedule;
use log::trace;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::Ordering::SeqCst;
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

/// Configuration shared by every level of one hierarchy.
pub(crate) struct Config {
    tick: i64,
    size: i64,
    executor: Arc<dyn Executor>,
    clock: Clock,
}

/// One level of the hierarchy.
pub(crate) struct Level {
    /// Self-reference handed to re-arming task closures.
    me: Weak<Level>,

    config: Arc<Config>,

    /// Slot resolution of this level in milliseconds: the configured tick for
    /// the innermost level, the parent's span for each overflow level.
    tick: i64,

    /// Span covered by this level: `tick * size`.
    interval: i64,

    /// Current time, always truncated to a multiple of `tick`.
    current: AtomicI64,

    buckets: Box<[Arc<Bucket>]>,

    /// Delay queue shared across the whole hierarchy.
    queue: Arc<DelayQueue>,

    /// Next coarser level, created by the first timer that overshoots this
    /// level's span. Levels are never destroyed.
    overflow: RwLock<Option<Arc<Level>>>,
}

// ===== impl Level =====

impl Level {
    /// Builds the innermost level together with the shared delay queue.
    fn top(config: Arc<Config>) -> Arc<Level> {
        let start = config.clock.now();

        Arc::new_cyclic(|me: &Weak<Level>| {
            let handler = {
                let level = me.clone();
                Box::new(move |bucket: Arc<Bucket>| match level.upgrade() {
                    Some(level) => {
                        trace!(
                            "flushing bucket at {} ({} timers)",
                            bucket.expiration(),
                            bucket.len()
                        );
                        level.advance_clock(bucket.expiration());
                        bucket.flush(&mut |entry| level.submit(entry));
                    }
                    None => {
                        // The wheel is gone; unlink the entries so the
                        // bucket/timer references unwind and drop.
                        bucket.flush(&mut |_| {});
                    }
                }) as ExpireHandler
            };

            let queue = DelayQueue::new(config.size as usize, config.clock.clone(), handler);
            Level::new(me.clone(), config.clone(), config.tick, start, queue)
        })
    }

    /// Builds an overflow level sharing the hierarchy's delay queue.
    fn child(config: Arc<Config>, tick: i64, start: i64, queue: Arc<DelayQueue>) -> Arc<Level> {
        Arc::new_cyclic(|me| Level::new(me.clone(), config, tick, start, queue))
    }

    fn new(
        me: Weak<Level>,
        config: Arc<Config>,
        tick: i64,
        start: i64,
        queue: Arc<DelayQueue>,
    ) -> Level {
        let buckets = (0..config.size)
            .map(|_| Bucket::new(Arc::downgrade(&queue)))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Level {
            me,
            tick,
            interval: tick.saturating_mul(config.size),
            current: AtomicI64::new(clock::truncate(start, tick)),
            buckets,
            queue,
            overflow: RwLock::new(None),
            config,
        }
    }

    /// Offers `entry` to the wheel: inserts it when it is still in the
    /// future, dispatches it to the executor when it is already due.
    pub(crate) fn submit(&self, entry: Arc<Entry>) {
        if entry.is_stopped() {
            return;
        }

        if !self.add(&entry) {
            // Already inside the current tick. Dispatch unless a concurrent
            // stop claimed this firing first.
            if entry.claim() {
                let level = self.me.clone();
                let job: Job = Box::new(move || {
                    if let Some(next) = entry.run() {
                        // The task wants to fire again.
                        if entry.is_stopped() {
                            return;
                        }
                        entry.rearm(next);
                        if let Some(level) = level.upgrade() {
                            level.submit(entry);
                        }
                    }
                });
                self.config.executor.execute(job);
            }
        }
    }

    /// Places `entry` in this level or a coarser one.
    ///
    /// Returns `false` when the expiration falls inside the current tick, in
    /// which case the caller dispatches instead.
    fn add(&self, entry: &Arc<Entry>) -> bool {
        let current = self.current.load(SeqCst);
        let expiration = entry.expiration();
        let remaining = expiration.saturating_sub(current);

        if remaining < self.tick {
            // Expires within the current tick.
            return false;
        }

        if remaining < self.interval {
            let slot = (expiration / self.tick % self.config.size) as usize;
            let bucket = &self.buckets[slot];
            bucket.add(entry);

            if bucket.set_expiration(clock::truncate(expiration, self.tick)) {
                // First timer for this turn of the slot; schedule the bucket.
                self.queue.add(bucket.clone(), bucket.expiration());
            }
            return true;
        }

        // Beyond this level's span: delegate to the overflow level, creating
        // it on first use.
        let mut overflow = self.overflow.write().unwrap();
        if overflow.is_none() {
            trace!("creating overflow level, tick={}ms", self.interval);
            *overflow = Some(Level::child(
                self.config.clone(),
                self.interval,
                current,
                self.queue.clone(),
            ));
        }
        overflow.as_ref().expect("overflow level exists").add(entry)
    }

    /// Advances this level's clock to `expiration`, and every coarser level
    /// with it.
    fn advance_clock(&self, expiration: i64) {
        let current = self.current.load(SeqCst);

        if expiration >= current.saturating_add(self.tick) {
            let current = clock::truncate(expiration, self.tick);
            self.current.store(current, SeqCst);
            trace!("advanced clock to {}, tick={}ms", current, self.tick);

            let overflow = self.overflow.read().unwrap();
            if let Some(ref overflow) = *overflow {
                overflow.advance_clock(current);
            }
        }
    }

    // ===== scheduling entry points, shared by `Wheel` and `Named` =====

    pub(crate) fn schedule<T: Task>(&self, expiration: i64, mut task: T) -> Timer {
        let entry = Entry::new(expiration);
        entry.set_task(Box::new(move |_| {
            task.execute();
            None
        }));

        self.submit(entry.clone());
        Timer::new(entry)
    }

    pub(crate) fn after<T: Task>(&self, delay: Duration, task: T) -> Timer {
        let now = self.config.clock.now();
        self.schedule(now.saturating_add(clock::ms(delay)), task)
    }

    pub(crate) fn repeat<T: LoopTask>(&self, initial: Duration, mut task: T) -> Timer {
        let clock = self.config.clock.clone();
        let entry = Entry::new(clock.now().saturating_add(clock::ms(initial)));

        entry.set_task(Box::new(move |entry| {
            task.execute();

            let previous = entry.expiration();
            let next = task.next(previous, clock.now());
            if next > previous {
                Some(next)
            } else {
                None
            }
        }));

        self.submit(entry.clone());
        Timer::new(entry)
    }

    pub(crate) fn cron<T: Task>(&self, expr: &str, mut task: T) -> Result<Timer, Error> {
        let schedule = Schedule::from_str(expr).map_err(Error::parse)?;
        let clock = self.config.clock.clone();

        // A schedule with no upcoming instant parks the timer forever; it
        // stays stoppable but never enters the wheel.
        let first = next_occurrence(&schedule, clock.now());
        let entry = Entry::new(first.unwrap_or(i64::MAX));

        entry.set_task(Box::new(move |_| {
            task.execute();
            next_occurrence(&schedule, clock.now())
        }));

        if first.is_some() {
            self.submit(entry.clone());
        }
        Ok(Timer::new(entry))
    }
}

/// Next instant matching `schedule` strictly after `now` (milliseconds since
/// the Unix epoch).
fn next_occurrence(schedule: &Schedule, now: i64) -> Option<i64> {
    let now = chrono::Utc.timestamp_millis_opt(now).single()?;
    schedule
        .after(&now)
        .next()
        .map(|next| next.timestamp_millis())
}

// ===== impl Wheel =====

/// A hierarchical timing wheel scheduler.
///
/// A `Wheel` manages very large numbers of deferred tasks with
/// near-constant-time insertion and cancellation. Timers are hashed into
/// tick-sized buckets; far-future timers live in coarser overflow levels and
/// are re-hashed into finer ones as their expiration approaches. A single
/// driver thread sleeps until the earliest bucket is due and hands ready
/// tasks to the configured [`Executor`].
///
/// Cloning a `Wheel` yields another handle to the same hierarchy; handles may
/// schedule and stop timers from any thread.
///
/// ```
/// use timewheel::Wheel;
/// use std::sync::mpsc;
/// use std::time::Duration;
///
/// let wheel = Wheel::new();
///
/// let (tx, rx) = mpsc::channel();
/// wheel.after(Duration::from_millis(10), move || {
///     tx.send("fired").unwrap();
/// });
///
/// assert_eq!(rx.recv_timeout(Duration::from_secs(1)), Ok("fired"));
/// ```
///
/// [`Executor`]: trait.Executor.html
#[derive(Clone)]
pub struct Wheel {
    level: Arc<Level>,
    named: Arc<Mutex<HashMap<String, Named>>>,
}

impl Wheel {
    /// Creates a wheel with the default configuration: 1 ms tick, 20 slots
    /// per level, tasks run inline on the driver.
    pub fn new() -> Wheel {
        Builder::new().build()
    }

    /// Returns a builder for a customized wheel.
    pub fn builder() -> Builder {
        Builder::new()
    }

    /// Schedules `task` to run at `expiration`, in milliseconds since the
    /// Unix epoch.
    ///
    /// This is the primitive every other scheduling method reduces to. An
    /// expiration inside the current tick (including any instant in the
    /// past) is dispatched to the executor immediately rather than enqueued.
    pub fn schedule<T: Task>(&self, expiration: i64, task: T) -> Timer {
        self.level.schedule(expiration, task)
    }

    /// Schedules `task` to run once, `delay` from now.
    pub fn after<T: Task>(&self, delay: Duration, task: T) -> Timer {
        self.level.after(delay, task)
    }

    /// Schedules a self-rescheduling task.
    ///
    /// The first firing happens `initial` from now; after each firing the
    /// task's [`next`] decides the following expiration, and the loop ends
    /// once it declines to advance. See [`Every`] for the stock
    /// fixed-interval policy.
    ///
    /// [`next`]: trait.LoopTask.html#tymethod.next
    /// [`Every`]: struct.Every.html
    pub fn repeat<T: LoopTask>(&self, initial: Duration, task: T) -> Timer {
        self.level.repeat(initial, task)
    }

    /// Schedules `task` on a cron expression, using the seconds-resolution
    /// field format (`sec min hour day-of-month month day-of-week [year]`).
    ///
    /// The task fires at each matching wall-clock instant; the next instant
    /// is recomputed from the wheel clock's current time after every firing.
    /// Returns an error only when the expression does not parse.
    ///
    /// ```
    /// use timewheel::Wheel;
    ///
    /// let wheel = Wheel::new();
    /// assert!(wheel.cron("not a cron expression", || {}).is_err());
    ///
    /// // Every five minutes, on the minute.
    /// let timer = wheel.cron("0 */5 * * * *", || {}).unwrap();
    /// # timer.stop();
    /// ```
    pub fn cron<T: Task>(&self, expr: &str, task: T) -> Result<Timer, Error> {
        self.level.cron(expr, task)
    }

    /// Returns the named-task registry for `topic`, creating it on first
    /// use.
    ///
    /// Registries of different topics are independent; the same topic always
    /// yields the same registry.
    pub fn named(&self, topic: &str) -> Named {
        let mut named = self.named.lock().unwrap();
        named
            .entry(topic.to_string())
            .or_insert_with(|| Named::new(self.level.clone()))
            .clone()
    }
}

impl Default for Wheel {
    fn default() -> Wheel {
        Wheel::new()
    }
}

impl fmt::Debug for Wheel {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("Wheel")
            .field("tick", &self.level.tick)
            .field("size", &self.level.config.size)
            .finish()
    }
}

// ===== impl Builder =====

/// Builds a wheel with custom configuration values.
///
/// Methods can be chained in order to set the configuration values. The wheel
/// is constructed by calling [`build`].
///
/// New instances of `Builder` are obtained via [`Wheel::builder`].
///
/// ```
/// use timewheel::Wheel;
/// use std::time::Duration;
///
/// let wheel = Wheel::builder()
///     .tick(Duration::from_millis(10))
///     .size(64)
///     .build();
/// # drop(wheel);
/// ```
///
/// [`build`]: #method.build
/// [`Wheel::builder`]: struct.Wheel.html#method.builder
pub struct Builder {
    tick: Duration,
    size: usize,
    executor: Arc<dyn Executor>,
    clock: Clock,
}

impl Builder {
    /// Returns a new builder initialized with default configuration values.
    pub fn new() -> Builder {
        Builder {
            tick: Duration::from_millis(1),
            size: 20,
            executor: Arc::new(InlineExecutor::new()),
            clock: Clock::system(),
        }
    }

    /// Sets the tick: the resolution of the innermost level.
    ///
    /// Sub-millisecond components are discarded. Defaults to 1 ms.
    pub fn tick(&mut self, tick: Duration) -> &mut Builder {
        self.tick = tick;
        self
    }

    /// Sets the number of slots per level. Defaults to 20.
    pub fn size(&mut self, size: usize) -> &mut Builder {
        self.size = size;
        self
    }

    /// Sets the executor that runs due tasks. Defaults to
    /// [`InlineExecutor`].
    ///
    /// [`InlineExecutor`]: struct.InlineExecutor.html
    pub fn executor<E: Executor>(&mut self, executor: E) -> &mut Builder {
        self.executor = Arc::new(executor);
        self
    }

    /// Sets the source of time. Defaults to the system clock.
    pub fn clock(&mut self, clock: Clock) -> &mut Builder {
        self.clock = clock;
        self
    }

    /// Creates the configured `Wheel`.
    ///
    /// # Panics
    ///
    /// Panics when the tick is shorter than one millisecond or the size is
    /// zero.
    pub fn build(&self) -> Wheel {
        let tick = clock::ms(self.tick);
        assert!(tick > 0, "tick must be at least one millisecond");
        assert!(self.size > 0, "size must be at least one slot");

        let config = Arc::new(Config {
            tick,
            size: self.size as i64,
            executor: self.executor.clone(),
            clock: self.clock.clone(),
        });

        Wheel {
            level: Level::top(config),
            named: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl Default for Builder {
    fn default() -> Builder {
        Builder::new()
    }
}

impl fmt::Debug for Builder {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("Builder")
            .field("tick", &self.tick)
            .field("size", &self.size)
            .finish()
    }
}
