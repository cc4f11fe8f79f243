//! Deterministic clock and scheduler for tests.

use parking_lot::Mutex;
use std::time::Duration;

use super::backend::{Clock, Scheduler, TimerCallback, TimerToken};

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub(crate) struct ManualClock {
    now: Mutex<Duration>,
}

impl ManualClock {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }

    pub(crate) fn set(&self, now: Duration) {
        *self.now.lock() = now;
    }
}

impl Clock for ManualClock {
    fn time_since_boot(&self) -> Duration {
        *self.now.lock()
    }
}

pub(crate) struct WorkItem {
    pub(crate) token: TimerToken,
    pub(crate) delay: Duration,
    pub(crate) callback: TimerCallback,
}

/// A scheduler that queues callbacks until the test runs them.
#[derive(Default)]
pub(crate) struct ManualScheduler {
    work: Mutex<Vec<WorkItem>>,
}

impl ManualScheduler {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Token and delay of every queued callback.
    pub(crate) fn pending(&self) -> Vec<(TimerToken, Duration)> {
        self.work
            .lock()
            .iter()
            .map(|item| (item.token, item.delay))
            .collect()
    }

    /// Dequeue every callback without running it.
    pub(crate) fn take_all(&self) -> Vec<WorkItem> {
        std::mem::take(&mut *self.work.lock())
    }

    /// Run every queued callback. The queue lock is released first, since the
    /// callbacks take the limiter's lock.
    pub(crate) fn run_all(&self) {
        for item in self.take_all() {
            (item.callback)();
        }
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, token: TimerToken, delay: Duration, callback: TimerCallback) {
        let mut work = self.work.lock();
        work.retain(|item| item.token != token);
        work.push(WorkItem {
            token,
            delay,
            callback,
        });
    }

    fn cancel(&self, token: TimerToken) {
        self.work.lock().retain(|item| item.token != token);
    }
}
