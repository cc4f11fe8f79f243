//! Forget-timer scheduler backed by tokio tasks.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tracing::trace;

use crate::error::{LimiterError, Result};
use crate::ratelimit::{Scheduler, TimerCallback, TimerToken};

/// A pending task and the generation that identifies it.
type PendingTask = (u64, AbortHandle);

/// Runs each callback on its own tokio task after the requested delay.
///
/// Rescheduling a token aborts the earlier task. Callbacks always run on a
/// runtime worker, never inline from [`Scheduler::schedule`], so they are
/// free to take the rate limiter's lock.
pub struct TokioScheduler {
    handle: Handle,
    tasks: Arc<DashMap<TimerToken, PendingTask>>,
    next_generation: AtomicU64,
}

impl TokioScheduler {
    /// Create a scheduler on the runtime of the calling context.
    pub fn new() -> Result<Self> {
        let handle = Handle::try_current().map_err(|e| {
            LimiterError::Scheduler(format!("No tokio runtime available: {}", e))
        })?;
        Ok(Self::with_handle(handle))
    }

    /// Create a scheduler that spawns onto `handle`.
    pub fn with_handle(handle: Handle) -> Self {
        Self {
            handle,
            tasks: Arc::new(DashMap::new()),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Number of callbacks that have not run or been cancelled yet.
    pub fn pending_count(&self) -> usize {
        self.tasks.len()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, token: TimerToken, delay: Duration, callback: TimerCallback) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let tasks = Arc::clone(&self.tasks);

        // Holding the entry until the task is registered keeps a short delay
        // from firing before it can be found and replaced.
        let entry = self.tasks.entry(token);
        let task = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            let current = tasks
                .remove_if(&token, |_, (pending, _)| *pending == generation)
                .is_some();
            if current {
                trace!(token = %token, "Running scheduled callback");
                callback();
            }
        });

        match entry {
            Entry::Occupied(mut occupied) => {
                let (_, previous) = occupied.insert((generation, task.abort_handle()));
                previous.abort();
            }
            Entry::Vacant(vacant) => {
                vacant.insert((generation, task.abort_handle()));
            }
        }
    }

    fn cancel(&self, token: TimerToken) {
        if let Some((_, (_, task))) = self.tasks.remove(&token) {
            trace!(token = %token, "Cancelled scheduled callback");
            task.abort();
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for entry in self.tasks.iter() {
            entry.value().1.abort();
        }
    }
}

impl std::fmt::Debug for TokioScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokioScheduler")
            .field("pending", &self.tasks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    use crate::ratelimit::testing::ManualClock;
    use crate::ratelimit::{Credential, Decision, LskfIdentifier, SoftwareRateLimiter};
    use crate::storage::MemoryCounterStore;

    fn flag_callback(flag: &Arc<AtomicBool>) -> TimerCallback {
        let flag = Arc::clone(flag);
        Box::new(move || flag.store(true, Ordering::SeqCst))
    }

    #[test]
    fn test_requires_runtime() {
        assert!(matches!(
            TokioScheduler::new(),
            Err(LimiterError::Scheduler(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_callback_runs_after_delay() {
        let scheduler = TokioScheduler::new().unwrap();
        let fired = Arc::new(AtomicBool::new(false));

        scheduler.schedule(TimerToken(1), Duration::from_secs(300), flag_callback(&fired));
        assert_eq!(scheduler.pending_count(), 1);

        tokio::time::sleep(Duration::from_secs(299)).await;
        assert!(!fired.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(fired.load(Ordering::SeqCst));
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel() {
        let scheduler = TokioScheduler::new().unwrap();
        let fired = Arc::new(AtomicBool::new(false));

        scheduler.schedule(TimerToken(1), Duration::from_secs(300), flag_callback(&fired));
        scheduler.cancel(TimerToken(1));
        scheduler.cancel(TimerToken(2));
        assert_eq!(scheduler.pending_count(), 0);

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_replaces() {
        let scheduler = TokioScheduler::new().unwrap();
        let runs = Arc::new(AtomicUsize::new(0));

        for delay in [10, 20] {
            let runs = Arc::clone(&runs);
            scheduler.schedule(
                TimerToken(7),
                Duration::from_secs(delay),
                Box::new(move || {
                    runs.fetch_add(1, Ordering::SeqCst);
                }),
            );
        }
        assert_eq!(scheduler.pending_count(), 1);

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_limiter_forgets_guesses_on_timeout() {
        let limiter = SoftwareRateLimiter::new(
            Arc::new(MemoryCounterStore::new()),
            Arc::new(ManualClock::new()),
            Arc::new(TokioScheduler::new().unwrap()),
        );
        let id = LskfIdentifier::new(10, 1000);
        let guess = Credential::password("password");

        assert_eq!(limiter.apply(&id, &guess).unwrap(), Decision::ContinueToHardware);
        limiter.report_failure(&id, &guess).unwrap();
        assert_eq!(limiter.apply(&id, &guess).unwrap(), Decision::DuplicateWrongGuess);

        tokio::time::sleep(Duration::from_secs(4 * 60)).await;
        assert_eq!(limiter.apply(&id, &guess).unwrap(), Decision::DuplicateWrongGuess);

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(limiter.apply(&id, &guess).unwrap(), Decision::ContinueToHardware);
    }

    #[tokio::test(start_paused = true)]
    async fn test_limiter_clear_cancels_timer() {
        let scheduler = Arc::new(TokioScheduler::new().unwrap());
        let limiter = SoftwareRateLimiter::new(
            Arc::new(MemoryCounterStore::new()),
            Arc::new(ManualClock::new()),
            scheduler.clone(),
        );
        let id = LskfIdentifier::new(10, 1000);
        let guess = Credential::password("password");

        limiter.apply(&id, &guess).unwrap();
        limiter.report_failure(&id, &guess).unwrap();
        assert_eq!(scheduler.pending_count(), 1);

        limiter.clear_user(10);
        assert_eq!(scheduler.pending_count(), 0);
        assert_eq!(limiter.state_count(), 0);
    }
}
