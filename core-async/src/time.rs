//! Time-related abstractions.
//!
//! `Instant` is Tokio's instant rather than `std::time::Instant`: it follows
//! the runtime clock, so tests running with a paused clock
//! (`#[tokio::test(start_paused = true)]`) observe virtual time consistently
//! across sleeps, intervals and elapsed-time measurements.

pub use tokio::time::{
    interval, sleep, sleep_until, timeout, Instant, Interval, MissedTickBehavior, Sleep, Timeout,
};

pub use tokio::time::error::Elapsed;

pub use std::time::Duration;

/// Milliseconds elapsed from `earlier` to `later`, signed.
///
/// Negative when `later` precedes `earlier`. Timing code works in signed
/// milliseconds because origins can legitimately sit in the future (a device
/// that confirmed slightly before the requested offset).
pub fn signed_millis_between(earlier: Instant, later: Instant) -> i64 {
    if later >= earlier {
        i64::try_from(later.duration_since(earlier).as_millis()).unwrap_or(i64::MAX)
    } else {
        -i64::try_from(earlier.duration_since(later).as_millis()).unwrap_or(i64::MAX)
    }
}

/// Shift `instant` by a signed number of milliseconds.
pub fn offset_instant(instant: Instant, millis: i64) -> Instant {
    let magnitude = Duration::from_millis(millis.unsigned_abs());
    if millis >= 0 {
        instant + magnitude
    } else {
        instant.checked_sub(magnitude).unwrap_or(instant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn signed_millis_handles_both_directions() {
        let a = Instant::now();
        sleep(Duration::from_millis(250)).await;
        let b = Instant::now();

        assert_eq!(signed_millis_between(a, b), 250);
        assert_eq!(signed_millis_between(b, a), -250);
        assert_eq!(signed_millis_between(a, a), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn offset_instant_round_trips_with_signed_millis() {
        sleep(Duration::from_secs(1)).await;
        let base = Instant::now();

        let later = offset_instant(base, 120);
        let earlier = offset_instant(base, -80);

        assert_eq!(signed_millis_between(base, later), 120);
        assert_eq!(signed_millis_between(base, earlier), -80);
    }
}
