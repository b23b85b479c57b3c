//! String-keyed task registries.

use crate::error::Error;
use crate::task::{LoopTask, Task};
use crate::timer::Timer;
use crate::wheel::Level;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A string-keyed task registry over a wheel.
///
/// Scheduling under a name that is already taken stops the previous task
/// before the replacement is registered, so at most one task is live per
/// name. Obtained from [`Wheel::named`]; clones share the registry.
///
/// ```
/// use timewheel::Wheel;
/// use std::time::Duration;
///
/// let wheel = Wheel::new();
/// let jobs = wheel.named("reconnect");
///
/// jobs.after("db", Duration::from_secs(5), || { /* first plan */ });
/// // Changed our mind: this replaces the previous "db" task.
/// jobs.after("db", Duration::from_secs(1), || { /* second plan */ });
///
/// jobs.stop("db");
/// ```
///
/// [`Wheel::named`]: struct.Wheel.html#method.named
#[derive(Clone)]
pub struct Named {
    level: Arc<Level>,
    timers: Arc<Mutex<HashMap<String, Timer>>>,
}

impl Named {
    pub(crate) fn new(level: Arc<Level>) -> Named {
        Named {
            level,
            timers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Schedules `task` to run once after `delay`, replacing any previous
    /// task registered under `name`.
    pub fn after<T: Task>(&self, name: &str, delay: Duration, task: T) {
        let mut timers = self.timers.lock().unwrap();
        if let Some(old) = timers.remove(name) {
            old.stop();
        }
        timers.insert(name.to_string(), self.level.after(delay, task));
    }

    /// Schedules a self-rescheduling task under `name`, replacing any
    /// previous task registered under that name.
    pub fn repeat<T: LoopTask>(&self, name: &str, initial: Duration, task: T) {
        let mut timers = self.timers.lock().unwrap();
        if let Some(old) = timers.remove(name) {
            old.stop();
        }
        timers.insert(name.to_string(), self.level.repeat(initial, task));
    }

    /// Schedules `task` on a cron expression under `name`, replacing any
    /// previous task registered under that name.
    ///
    /// An invalid expression leaves the registry untouched.
    pub fn cron<T: Task>(&self, name: &str, expr: &str, task: T) -> Result<(), Error> {
        let mut timers = self.timers.lock().unwrap();
        let timer = self.level.cron(expr, task)?;
        if let Some(old) = timers.remove(name) {
            old.stop();
        }
        timers.insert(name.to_string(), timer);
        Ok(())
    }

    /// Stops and forgets the task registered under `name`, if any.
    pub fn stop(&self, name: &str) {
        let mut timers = self.timers.lock().unwrap();
        if let Some(timer) = timers.remove(name) {
            timer.stop();
        }
    }

    /// Stops every task in this registry.
    pub fn clear(&self) {
        let mut timers = self.timers.lock().unwrap();
        for (_, timer) in timers.drain() {
            timer.stop();
        }
    }

    /// Number of registered names.
    pub fn len(&self) -> usize {
        self.timers.lock().unwrap().len()
    }

    /// Returns `true` when no task is registered.
    pub fn is_empty(&self) -> bool {
        self.timers.lock().unwrap().is_empty()
    }
}

impl fmt::Debug for Named {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("Named")
            .field("len", &self.len())
            .finish()
    }
}
