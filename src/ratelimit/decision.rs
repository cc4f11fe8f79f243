//! Outcome of applying the rate limiter to a guess.

use std::time::Duration;

/// What the caller must do with a guess after [`apply`](super::SoftwareRateLimiter::apply).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The guess may be checked by the hardware verifier.
    ContinueToHardware,
    /// The guess is shorter than any credential of its type; it is rejected
    /// without counting.
    CredentialTooShort,
    /// A delay from an earlier failure is still running.
    RateLimited { remaining: Duration },
    /// The guess matches a recently saved wrong guess and is rejected
    /// without counting.
    DuplicateWrongGuess,
    /// The backoff table is exhausted; no further guesses are allowed.
    NoMoreGuesses,
}

impl Decision {
    /// Whether the guess should be forwarded to the hardware check.
    pub fn is_continue(&self) -> bool {
        matches!(self, Decision::ContinueToHardware)
    }

    /// Remaining delay for a rate-limited guess, zero otherwise.
    pub fn remaining_delay(&self) -> Duration {
        match self {
            Decision::RateLimited { remaining } => *remaining,
            _ => Duration::ZERO,
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::ContinueToHardware => write!(f, "continue_to_hardware"),
            Decision::CredentialTooShort => write!(f, "credential_too_short"),
            Decision::RateLimited { remaining } => write!(f, "rate_limited({:?})", remaining),
            Decision::DuplicateWrongGuess => write!(f, "duplicate_wrong_guess"),
            Decision::NoMoreGuesses => write!(f, "no_more_guesses"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remaining_delay() {
        let limited = Decision::RateLimited {
            remaining: Duration::from_secs(60),
        };
        assert_eq!(limited.remaining_delay(), Duration::from_secs(60));
        assert_eq!(Decision::DuplicateWrongGuess.remaining_delay(), Duration::ZERO);
    }

    #[test]
    fn test_is_continue() {
        assert!(Decision::ContinueToHardware.is_continue());
        assert!(!Decision::NoMoreGuesses.is_continue());
        assert!(!Decision::CredentialTooShort.is_continue());
    }
}
