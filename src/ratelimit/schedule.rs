//! Backoff schedule for wrong guesses.

use std::time::Duration;

const fn minutes(n: u64) -> Duration {
    Duration::from_secs(n * 60)
}

/// Maps the number of real failures to the delay enforced before the next
/// guess. Indices past the end of the table allow no more guesses.
pub const DELAY_TABLE: [Duration; 20] = [
    /* 0 */ Duration::ZERO,
    /* 1 */ Duration::ZERO,
    /* 2 */ Duration::ZERO,
    /* 3 */ Duration::ZERO,
    /* 4 */ Duration::ZERO,
    /* 5 */ minutes(1),
    /* 6 */ minutes(5),
    /* 7 */ minutes(15),
    /* 8 */ minutes(30),
    /* 9 */ minutes(90),
    /* 10 */ minutes(243), // This and the rest are 3^(n-5) minutes.
    /* 11 */ minutes(729),
    /* 12 */ minutes(2187),
    /* 13 */ minutes(6561),
    /* 14 */ minutes(19683),
    /* 15 */ minutes(59049),
    /* 16 */ minutes(177147),
    /* 17 */ minutes(531441),
    /* 18 */ minutes(1594323),
    /* 19 */ minutes(4782969),
];

/// Delay owed after `num_failures` failures, or `None` once the table is
/// exhausted.
pub fn delay_for(num_failures: u32) -> Option<Duration> {
    DELAY_TABLE.get(num_failures as usize).copied()
}

/// The longest delay in the table.
pub fn final_delay() -> Duration {
    DELAY_TABLE[DELAY_TABLE.len() - 1]
}

/// Like [`delay_for`] but saturating at [`final_delay`].
pub fn delay_for_saturating(num_failures: u32) -> Duration {
    delay_for(num_failures).unwrap_or_else(final_delay)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_guesses() {
        for n in 0..5 {
            assert_eq!(delay_for(n), Some(Duration::ZERO));
        }
    }

    #[test]
    fn test_documented_delays() {
        assert_eq!(delay_for(5), Some(Duration::from_secs(60)));
        assert_eq!(delay_for(6), Some(Duration::from_secs(5 * 60)));
        assert_eq!(delay_for(7), Some(Duration::from_secs(15 * 60)));
        assert_eq!(delay_for(8), Some(Duration::from_secs(30 * 60)));
        assert_eq!(delay_for(9), Some(Duration::from_secs(90 * 60)));
        assert_eq!(delay_for(10), Some(Duration::from_secs(243 * 60)));
    }

    #[test]
    fn test_powers_of_three() {
        for n in 10..DELAY_TABLE.len() as u32 {
            let expected = 3u64.pow(n - 5) * 60;
            assert_eq!(delay_for(n), Some(Duration::from_secs(expected)));
        }
    }

    #[test]
    fn test_table_is_monotonic() {
        for pair in DELAY_TABLE.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
    }

    #[test]
    fn test_past_end_of_table() {
        assert_eq!(delay_for(20), None);
        assert_eq!(delay_for(u32::MAX), None);
        assert_eq!(delay_for_saturating(20), final_delay());
        assert_eq!(final_delay(), Duration::from_secs(4782969 * 60));
    }
}
