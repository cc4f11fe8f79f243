//! Per-LSKF rate limiter state.

use std::collections::VecDeque;
use std::time::Duration;

use super::backend::TimerToken;
use super::credential::{Credential, CredentialType};

/// The maximum number of unique wrong guesses saved per LSKF.
///
/// The chance of matching the n-th last unique wrong guess diminishes as n
/// grows, and the delays start after 5 unique wrong guesses anyway.
pub const MAX_SAVED_WRONG_GUESSES: usize = 5;

/// Recently seen wrong guesses, newest first.
///
/// Each entry is owned by the list and erased when it is evicted, forgotten
/// or when the list itself is dropped.
#[derive(Debug, Default)]
pub(crate) struct SavedWrongGuesses {
    guesses: VecDeque<Credential>,
}

impl SavedWrongGuesses {
    /// Store a copy of `guess` as the newest entry, evicting the oldest if full.
    pub(crate) fn insert(&mut self, guess: &Credential) {
        if self.guesses.len() == MAX_SAVED_WRONG_GUESSES {
            // Dropping the credential zeroizes it.
            drop(self.guesses.pop_back());
        }
        self.guesses.push_front(guess.clone());
    }

    /// If `guess` is saved, move it to the front and return true.
    pub(crate) fn touch(&mut self, guess: &Credential) -> bool {
        match self.guesses.iter().position(|saved| saved == guess) {
            Some(index) => {
                if let Some(saved) = self.guesses.remove(index) {
                    self.guesses.push_front(saved);
                }
                true
            }
            None => false,
        }
    }

    pub(crate) fn contains(&self, guess: &Credential) -> bool {
        self.guesses.iter().any(|saved| saved == guess)
    }

    /// Zeroize and discard every saved guess.
    pub(crate) fn forget(&mut self) {
        self.guesses.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.guesses.len()
    }
}

/// The rate limiter state for one LSKF.
#[derive(Debug)]
pub(crate) struct RateLimiterState {
    /// Failed attempts since the last success, not counting attempts that
    /// never reached the real credential check.
    pub(crate) num_failures: u32,
    /// Duplicate wrong guesses detected since the last success or reboot.
    pub(crate) num_duplicate_wrong_guesses: u32,
    /// Type of the first guess seen for this LSKF.
    pub(crate) credential_type: CredentialType,
    /// Time since boot of the last failure; zero if it happened before the
    /// current boot.
    pub(crate) time_since_boot_of_last_failure: Duration,
    pub(crate) saved_wrong_guesses: SavedWrongGuesses,
    /// Token of the armed forget-timer.
    pub(crate) pending_forget: Option<TimerToken>,
}

impl RateLimiterState {
    pub(crate) fn new(num_failures: u32, first_guess: &Credential) -> Self {
        Self {
            num_failures,
            num_duplicate_wrong_guesses: 0,
            credential_type: first_guess.kind(),
            time_since_boot_of_last_failure: Duration::ZERO,
            saved_wrong_guesses: SavedWrongGuesses::default(),
            pending_forget: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn password(i: usize) -> Credential {
        Credential::password(format!("password{}", i))
    }

    #[test]
    fn test_insert_is_bounded() {
        let mut saved = SavedWrongGuesses::default();
        for i in 0..MAX_SAVED_WRONG_GUESSES + 3 {
            saved.insert(&password(i));
        }
        assert_eq!(saved.len(), MAX_SAVED_WRONG_GUESSES);
        assert!(!saved.contains(&password(2)));
        assert!(saved.contains(&password(3)));
    }

    #[test]
    fn test_touch_moves_to_front() {
        let mut saved = SavedWrongGuesses::default();
        for i in 0..MAX_SAVED_WRONG_GUESSES {
            saved.insert(&password(i));
        }

        assert!(saved.touch(&password(0)));
        saved.insert(&password(99));

        // password1 was the least recently seen, not password0
        assert!(saved.contains(&password(0)));
        assert!(!saved.contains(&password(1)));
        assert!(!saved.touch(&password(1)));
    }

    #[test]
    fn test_forget() {
        let mut saved = SavedWrongGuesses::default();
        saved.insert(&password(0));
        saved.forget();
        assert_eq!(saved.len(), 0);
        assert!(!saved.contains(&password(0)));
    }
}
