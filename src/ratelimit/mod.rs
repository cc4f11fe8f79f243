//! Rate limiting logic and state management.

mod backend;
mod credential;
mod decision;
mod identity;
mod limiter;
mod schedule;
mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::{Clock, CounterStore, Scheduler, TimerCallback, TimerToken};
pub use credential::{Credential, CredentialType, MIN_LOCK_PASSWORD_SIZE, MIN_LOCK_PATTERN_SIZE};
pub use decision::Decision;
pub use identity::{LskfIdentifier, NULL_PROTECTOR_ID, USER_FRP, USER_REPAIR_MODE};
pub use limiter::{LimiterSnapshot, SoftwareRateLimiter, StateSnapshot};
pub use schedule::{delay_for, delay_for_saturating, final_delay, DELAY_TABLE};
pub use state::MAX_SAVED_WRONG_GUESSES;
