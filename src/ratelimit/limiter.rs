//! The software rate limiter for LSKF guesses.
//!
//! It complements the hardware (TEE or secure element) rate limiter:
//!
//! - Recent wrong guesses are remembered, and duplicates are rejected before
//!   they reach the hardware and count as real guesses. This helps users who
//!   mistype their LSKF the same way twice, and gives an attacker nothing.
//! - Guesses too short to possibly be correct are rejected for free.
//! - Every real failure is counted persistently and an exponential delay is
//!   enforced before the next guess.
//!
//! Both limiters run concurrently, so the stricter of the two is what a user
//! normally observes.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use super::backend::{Clock, CounterStore, Scheduler, TimerToken};
use super::credential::{Credential, CredentialType};
use super::decision::Decision;
use super::identity::LskfIdentifier;
use super::schedule;
use super::state::RateLimiterState;
use crate::config::LimiterConfig;
use crate::error::Result;

/// All per-LSKF state, guarded by the limiter's single lock.
#[derive(Debug, Default)]
struct StateTable {
    states: HashMap<LskfIdentifier, RateLimiterState>,
    next_token: u64,
}

/// The software rate limiter.
///
/// Every operation runs under one exclusive lock. The only I/O performed
/// while holding it is the failure counter write in
/// [`report_failure`](Self::report_failure), which must be synchronous.
pub struct SoftwareRateLimiter {
    states: Arc<Mutex<StateTable>>,
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    scheduler: Arc<dyn Scheduler>,
    /// In non-enforcing mode all delays are zero and duplicate wrong guesses
    /// are never reported as such.
    enforcing: bool,
    saved_wrong_guess_timeout: Duration,
}

/// Diagnostic view of one LSKF's state. Contains no secrets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateSnapshot {
    pub id: LskfIdentifier,
    pub num_failures: u32,
    pub num_duplicate_wrong_guesses: u32,
    pub credential_type: CredentialType,
    pub time_since_boot_of_last_failure: Duration,
    pub num_saved_wrong_guesses: usize,
    pub forget_pending: bool,
}

/// Diagnostic view of the whole limiter.
#[derive(Debug, Clone, Serialize)]
pub struct LimiterSnapshot {
    pub enforcing: bool,
    pub states: Vec<StateSnapshot>,
}

impl SoftwareRateLimiter {
    /// Create an enforcing rate limiter with the default forget window.
    pub fn new(
        store: Arc<dyn CounterStore>,
        clock: Arc<dyn Clock>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        Self::with_config(store, clock, scheduler, &LimiterConfig::default())
    }

    /// Create a rate limiter with explicit policy configuration.
    pub fn with_config(
        store: Arc<dyn CounterStore>,
        clock: Arc<dyn Clock>,
        scheduler: Arc<dyn Scheduler>,
        config: &LimiterConfig,
    ) -> Self {
        Self {
            states: Arc::new(Mutex::new(StateTable::default())),
            store,
            clock,
            scheduler,
            enforcing: config.enforcing,
            saved_wrong_guess_timeout: config.saved_wrong_guess_timeout(),
        }
    }

    /// Whether delays and duplicate detection are enforced.
    pub fn is_enforcing(&self) -> bool {
        self.enforcing
    }

    /// The backoff table: delay owed after `n` failures at index `n`.
    pub fn delay_table(&self) -> &'static [Duration] {
        &schedule::DELAY_TABLE
    }

    /// Apply the rate limiter to a guess of the LSKF identified by `id`.
    ///
    /// Only a [`Decision::ContinueToHardware`] result allows the guess to be
    /// checked for real, after which the outcome must be reported with
    /// [`report_success`](Self::report_success) or
    /// [`report_failure`](Self::report_failure).
    pub fn apply(&self, id: &LskfIdentifier, guess: &Credential) -> Result<Decision> {
        // No real guess needs to be spent on a credential that cannot be correct.
        if guess.is_too_short() {
            warn!(lskf = %id, size = guess.len(), kind = %guess.kind(), "Credential is too short");
            return Ok(Decision::CredentialTooShort);
        }

        let mut table = self.states.lock();
        let state = match table.states.entry(*id) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                // Only the failure counter survives a reboot. The last failure
                // time starts at zero, so the delay for the current count
                // restarts from the beginning, which matches what hardware
                // limiters without a trusted real-time clock do.
                let num_failures = self.read_failure_counter(id)?;
                debug!(
                    lskf = %id,
                    num_failures = num_failures,
                    "Creating rate limiter state"
                );
                entry.insert(RateLimiterState::new(num_failures, guess))
            }
        };

        // A positive remaining delay is normally unreachable, since the lock
        // screen blocks input for the delay returned by report_failure(). It
        // still happens after e.g. a reboot.
        let delay = if self.enforcing {
            match schedule::delay_for(state.num_failures) {
                Some(delay) => delay,
                None => {
                    warn!(
                        lskf = %id,
                        num_failures = state.num_failures,
                        "No more guesses allowed"
                    );
                    return Ok(Decision::NoMoreGuesses);
                }
            }
        } else {
            Duration::ZERO
        };
        let now = self.clock.time_since_boot();
        let allowed_at = state.time_since_boot_of_last_failure.saturating_add(delay);
        if allowed_at > now {
            let remaining = allowed_at - now;
            warn!(
                lskf = %id,
                num_failures = state.num_failures,
                remaining = ?remaining,
                "Rate-limited"
            );
            return Ok(Decision::RateLimited { remaining });
        }

        if state.saved_wrong_guesses.touch(guess) {
            info!(lskf = %id, "Duplicate wrong guess");
            state.num_duplicate_wrong_guesses = state.num_duplicate_wrong_guesses.saturating_add(1);
            self.log_attempt(id, state, false);
            return Ok(if self.enforcing {
                Decision::DuplicateWrongGuess
            } else {
                Decision::ContinueToHardware
            });
        }

        Ok(Decision::ContinueToHardware)
    }

    /// Report that the hardware check accepted the guess.
    ///
    /// Clears the failure counter and forgets saved wrong guesses.
    ///
    /// # Panics
    ///
    /// Panics if [`apply`](Self::apply) was not called for `id` first.
    pub fn report_success(&self, id: &LskfIdentifier) -> Result<()> {
        let mut table = self.states.lock();
        let state = existing_state(&mut table.states, id);
        self.log_attempt(id, state, true);

        // With a zero counter there are no saved wrong guesses either. This is
        // the common case of a correct first guess.
        if state.num_failures != 0 {
            state.num_failures = 0;
            state.num_duplicate_wrong_guesses = 0;
            self.forget_saved_wrong_guesses(state);
            self.write_failure_counter(id, 0)?;
        }
        Ok(())
    }

    /// Report that the hardware check rejected the guess as wrong.
    ///
    /// Must be called right after the hardware failure and before the
    /// failure becomes visible to the user. Returns the delay until the next
    /// guess is allowed.
    ///
    /// # Panics
    ///
    /// Panics if [`apply`](Self::apply) was not called for `id` first.
    pub fn report_failure(&self, id: &LskfIdentifier, guess: &Credential) -> Result<Duration> {
        self.record_failure(id, guess, true)
    }

    /// Report a hardware failure that was not certainly caused by a wrong
    /// guess, e.g. a throttling or generic error code.
    ///
    /// The failure still counts, since it may well have been a wrong guess,
    /// but the guess is not saved for duplicate detection.
    ///
    /// # Panics
    ///
    /// Panics if [`apply`](Self::apply) was not called for `id` first.
    pub fn report_generic_failure(
        &self,
        id: &LskfIdentifier,
        guess: &Credential,
    ) -> Result<Duration> {
        self.record_failure(id, guess, false)
    }

    fn record_failure(
        &self,
        id: &LskfIdentifier,
        guess: &Credential,
        certainly_wrong: bool,
    ) -> Result<Duration> {
        let mut guard = self.states.lock();
        let table = &mut *guard;
        let state = existing_state(&mut table.states, id);

        // In non-enforcing mode apply() lets duplicates through, but they
        // were already counted the first time.
        if !self.enforcing && state.saved_wrong_guesses.contains(guess) {
            return Ok(Duration::ZERO);
        }

        state.num_failures = state.num_failures.saturating_add(1);
        state.time_since_boot_of_last_failure = self.clock.time_since_boot();

        // Persist before the failure reaches the user, so that cutting power
        // cannot roll the counter back.
        self.write_failure_counter(id, state.num_failures)?;
        self.log_attempt(id, state, false);

        if certainly_wrong {
            state.saved_wrong_guesses.insert(guess);

            let token = TimerToken(table.next_token);
            table.next_token += 1;
            self.arm_forget_timer(*id, state, token);
        }

        if !self.enforcing {
            return Ok(Duration::ZERO);
        }
        // Past the end of the table no more guesses are allowed, which
        // apply() reports. Here the final delay is all that can be conveyed.
        Ok(schedule::delay_for_saturating(state.num_failures))
    }

    /// Clear the in-memory state of a protector that is being removed.
    ///
    /// The persisted counter is left alone.
    pub fn clear_identity(&self, id: &LskfIdentifier) {
        let mut table = self.states.lock();
        if let Some(mut state) = table.states.remove(id) {
            self.forget_saved_wrong_guesses(&mut state);
            debug!(lskf = %id, "Cleared rate limiter state");
        }
    }

    /// Clear the in-memory state of every LSKF of a user that is being removed.
    pub fn clear_user(&self, user_id: i32) {
        let mut table = self.states.lock();
        table.states.retain(|id, state| {
            if id.user_id != user_id {
                return true;
            }
            self.forget_saved_wrong_guesses(state);
            debug!(lskf = %id, "Cleared rate limiter state");
            false
        });
    }

    /// Get the number of LSKFs with in-memory state.
    pub fn state_count(&self) -> usize {
        self.states.lock().states.len()
    }

    /// Diagnostic snapshot of all state, ordered by identifier.
    pub fn snapshot(&self) -> LimiterSnapshot {
        let table = self.states.lock();
        let mut states: Vec<StateSnapshot> = table
            .states
            .iter()
            .map(|(id, state)| StateSnapshot {
                id: *id,
                num_failures: state.num_failures,
                num_duplicate_wrong_guesses: state.num_duplicate_wrong_guesses,
                credential_type: state.credential_type,
                time_since_boot_of_last_failure: state.time_since_boot_of_last_failure,
                num_saved_wrong_guesses: state.saved_wrong_guesses.len(),
                forget_pending: state.pending_forget.is_some(),
            })
            .collect();
        states.sort_by_key(|s| s.id);

        LimiterSnapshot {
            enforcing: self.enforcing,
            states,
        }
    }

    /// Schedule the saved wrong guesses to be forgotten, extending any timer
    /// that is already running.
    fn arm_forget_timer(&self, id: LskfIdentifier, state: &mut RateLimiterState, token: TimerToken) {
        if let Some(previous) = state.pending_forget.replace(token) {
            self.scheduler.cancel(previous);
        }

        let states = Arc::downgrade(&self.states);
        self.scheduler.schedule(
            token,
            self.saved_wrong_guess_timeout,
            Box::new(move || forget_on_timeout(&states, &id, token)),
        );
    }

    fn forget_saved_wrong_guesses(&self, state: &mut RateLimiterState) {
        if let Some(token) = state.pending_forget.take() {
            self.scheduler.cancel(token);
        }
        state.saved_wrong_guesses.forget();
    }

    fn read_failure_counter(&self, id: &LskfIdentifier) -> Result<u32> {
        // Special credentials (FRP, repair mode) have no persistent counter.
        if id.is_special_credential() {
            return Ok(0);
        }
        self.store.read(id)
    }

    fn write_failure_counter(&self, id: &LskfIdentifier, count: u32) -> Result<()> {
        if id.is_special_credential() {
            return Ok(());
        }
        self.store.write(id, count)
    }

    fn log_attempt(&self, id: &LskfIdentifier, state: &RateLimiterState, success: bool) {
        info!(
            lskf = %id,
            success = success,
            num_failures = state.num_failures,
            num_duplicate_guesses = state.num_duplicate_wrong_guesses,
            credential_type = %state.credential_type,
            enforcing = self.enforcing,
            "LSKF authentication attempt"
        );
    }
}

impl std::fmt::Debug for SoftwareRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftwareRateLimiter")
            .field("enforcing", &self.enforcing)
            .field("saved_wrong_guess_timeout", &self.saved_wrong_guess_timeout)
            .field("state_count", &self.state_count())
            .finish()
    }
}

/// Look up state that `apply()` must already have created.
fn existing_state<'a>(
    states: &'a mut HashMap<LskfIdentifier, RateLimiterState>,
    id: &LskfIdentifier,
) -> &'a mut RateLimiterState {
    match states.get_mut(id) {
        Some(state) => state,
        // Outcomes are always paired with an apply() for the same LSKF, and
        // callers serialize clearing against checks. Getting here is a bug.
        None => panic!("no rate limiter state for {}; apply() must be called first", id),
    }
}

/// Forget-timer body. Acts only if the state that armed the timer is still
/// present and has not re-armed or cancelled it since.
fn forget_on_timeout(states: &Weak<Mutex<StateTable>>, id: &LskfIdentifier, token: TimerToken) {
    let Some(states) = states.upgrade() else {
        return;
    };
    let mut table = states.lock();
    match table.states.get_mut(id) {
        Some(state) if state.pending_forget == Some(token) => {
            info!(lskf = %id, "Forgetting wrong LSKF guesses");
            state.pending_forget = None;
            state.saved_wrong_guesses.forget();
        }
        _ => trace!(lskf = %id, token = %token, "Ignoring stale forget timer"),
    }
}
