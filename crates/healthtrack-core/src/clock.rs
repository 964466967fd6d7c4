//! Wall-clock access, injectable so timestamps can be pinned in tests.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Source of the current time for record stamps, envelopes and the outbox.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;

    /// The instant `age` ago. An age too large for chrono yields the
    /// earliest representable instant.
    fn cutoff(&self, age: Duration) -> DateTime<Utc> {
        chrono::Duration::from_std(age)
            .ok()
            .and_then(|age| self.now().checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    struct Pinned;

    impl Clock for Pinned {
        fn now(&self) -> DateTime<Utc> {
            Utc.with_ymd_and_hms(2024, 1, 2, 6, 5, 0).unwrap()
        }
    }

    #[test]
    fn test_cutoff_subtracts_age_from_now() {
        let cutoff = Pinned.cutoff(Duration::from_secs(120));

        assert_eq!(cutoff, Utc.with_ymd_and_hms(2024, 1, 2, 6, 3, 0).unwrap());
    }

    #[test]
    fn test_cutoff_saturates_for_huge_ages() {
        assert_eq!(Pinned.cutoff(Duration::MAX), DateTime::<Utc>::MIN_UTC);
    }
}
