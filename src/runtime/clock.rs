//! Boot-relative clock for the host process.

use std::time::{Duration, Instant};

use crate::ratelimit::Clock;

/// Time since the host process booted the limiter.
///
/// On Linux and Android this reads `CLOCK_BOOTTIME`, which keeps counting
/// while the system is suspended, so a lockout delay elapses during deep
/// sleep. Elsewhere, and for clocks built with
/// [`starting_at`](Self::starting_at), it is built on [`Instant`], which may
/// pause during suspend. Either way it never goes backwards and ignores
/// wall-clock changes. A restart resets it to zero, just like a device reboot
/// resets the time since boot.
#[derive(Debug, Clone, Copy)]
pub struct BootClock {
    boot: Instant,
    boottime_origin: Option<Duration>,
}

impl BootClock {
    /// A clock whose origin is now.
    pub fn new() -> Self {
        Self {
            boot: Instant::now(),
            boottime_origin: boottime(),
        }
    }

    /// A monotonic clock whose origin is `boot`.
    pub fn starting_at(boot: Instant) -> Self {
        Self {
            boot,
            boottime_origin: None,
        }
    }

    /// Whether this clock counts time spent suspended.
    pub fn counts_suspend(&self) -> bool {
        self.boottime_origin.is_some()
    }
}

impl Default for BootClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for BootClock {
    fn time_since_boot(&self) -> Duration {
        match (self.boottime_origin, boottime()) {
            (Some(origin), Some(now)) => now.saturating_sub(origin),
            _ => self.boot.elapsed(),
        }
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn boottime() -> Option<Duration> {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: `ts` is a valid, writable timespec for the duration of the call.
    let rc = unsafe { libc::clock_gettime(libc::CLOCK_BOOTTIME, &mut ts) };
    if rc != 0 {
        return None;
    }
    Some(Duration::new(
        u64::try_from(ts.tv_sec).ok()?,
        u32::try_from(ts.tv_nsec).ok()?,
    ))
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn boottime() -> Option<Duration> {
    None
}
