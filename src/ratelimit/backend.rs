//! Host collaborators injected into the rate limiter.
//!
//! The limiter never touches the disk, the system clock or a timer facility
//! directly; the host supplies these through the traits below.

use std::time::Duration;

use super::identity::LskfIdentifier;
use crate::error::Result;

/// Persistent per-protector failure counters.
///
/// Never called for special credentials.
pub trait CounterStore: Send + Sync {
    /// Read the failure counter, returning 0 if none was ever written.
    fn read(&self, id: &LskfIdentifier) -> Result<u32>;

    /// Write the failure counter.
    ///
    /// Must be durable before returning: the write has to survive an
    /// immediate power loss, since a failure is only shown to the user after
    /// this returns.
    fn write(&self, id: &LskfIdentifier, count: u32) -> Result<()>;
}

/// Monotonic time since boot.
///
/// Must not depend on the wall clock. Restarting from zero on reboot is
/// expected.
pub trait Clock: Send + Sync {
    fn time_since_boot(&self) -> Duration;
}

/// Opaque key of a scheduled callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerToken(pub u64);

impl std::fmt::Display for TimerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// Callback run by a [`Scheduler`].
pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// Deferred callbacks keyed by token.
pub trait Scheduler: Send + Sync {
    /// Run `callback` after `delay`. Scheduling with a token that is still
    /// pending replaces the earlier callback.
    fn schedule(&self, token: TimerToken, delay: Duration, callback: TimerCallback);

    /// Cancel the pending callback for `token`, if any.
    fn cancel(&self, token: TimerToken);
}
