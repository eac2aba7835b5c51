//! Bounded polling.
//!
//! Every "ask again later" loop in the engine (seek confirmation, command
//! retries, the progress and correction loops) runs through [`poll_until`],
//! so attempt counting, spacing and early exit behave identically at every
//! call site.
//!
//! The probe is invoked immediately for attempt `0`; the schedule's interval
//! is slept *between* attempts, never before the first or after the last.
//! A bounded schedule of `n` attempts therefore waits `(n - 1) * interval`
//! plus whatever the probes themselves take.

use crate::time::{sleep, Duration};
use std::future::Future;

/// Verdict returned by a single probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStep<T> {
    /// Condition met; stop and hand back the value.
    Ready(T),
    /// Not yet; sleep one interval and probe again.
    Pending,
    /// The caller no longer cares (e.g. its request was superseded).
    Abort,
}

/// How a polling loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Ready(T),
    Aborted,
    /// The attempt budget ran out without a `Ready` or `Abort`.
    Exhausted { attempts: u32 },
}

impl<T> PollOutcome<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, PollOutcome::Ready(_))
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, PollOutcome::Aborted)
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, PollOutcome::Exhausted { .. })
    }

    /// Consume the outcome, returning the ready value if any.
    pub fn ready(self) -> Option<T> {
        match self {
            PollOutcome::Ready(value) => Some(value),
            _ => None,
        }
    }
}

/// Spacing and budget for a polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    /// Delay between consecutive probes.
    pub interval: Duration,
    /// Maximum number of probes; `None` polls until `Ready` or `Abort`.
    pub max_attempts: Option<u32>,
}

impl PollSchedule {
    /// A schedule that gives up after `max_attempts` probes.
    pub fn bounded(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: Some(max_attempts),
        }
    }

    /// A schedule that only ends when the probe says so.
    pub fn unbounded(interval: Duration) -> Self {
        Self {
            interval,
            max_attempts: None,
        }
    }

    /// Upper bound on the time spent sleeping between probes.
    pub fn max_wait(&self) -> Option<Duration> {
        self.max_attempts
            .map(|attempts| self.interval * attempts.saturating_sub(1))
    }
}

/// Repeatedly invoke `probe` until it returns `Ready` or `Abort`, or the
/// schedule's attempt budget is spent.
///
/// The probe receives the zero-based attempt number.
pub async fn poll_until<T, F, Fut>(schedule: PollSchedule, mut probe: F) -> PollOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = PollStep<T>>,
{
    if schedule.max_attempts == Some(0) {
        return PollOutcome::Exhausted { attempts: 0 };
    }

    let mut attempt: u32 = 0;
    loop {
        match probe(attempt).await {
            PollStep::Ready(value) => return PollOutcome::Ready(value),
            PollStep::Abort => return PollOutcome::Aborted,
            PollStep::Pending => {}
        }

        attempt = attempt.saturating_add(1);
        if let Some(max) = schedule.max_attempts {
            if attempt >= max {
                return PollOutcome::Exhausted { attempts: attempt };
            }
        }

        sleep(schedule.interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::Instant;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn ready_on_first_attempt_does_not_sleep() {
        let start = Instant::now();
        let outcome = poll_until(
            PollSchedule::bounded(Duration::from_millis(50), 5),
            |_| async { PollStep::Ready("done") },
        )
        .await;

        assert_eq!(outcome, PollOutcome::Ready("done"));
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_after_budget_with_interval_between_attempts() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let outcome: PollOutcome<()> = poll_until(
            PollSchedule::bounded(Duration::from_millis(50), 40),
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { PollStep::Pending }
            },
        )
        .await;

        assert_eq!(outcome, PollOutcome::Exhausted { attempts: 40 });
        assert_eq!(calls.load(Ordering::SeqCst), 40);
        assert_eq!(start.elapsed(), Duration::from_millis(50 * 39));
    }

    #[tokio::test(start_paused = true)]
    async fn abort_stops_immediately() {
        let outcome: PollOutcome<u32> = poll_until(
            PollSchedule::unbounded(Duration::from_millis(10)),
            |attempt| async move {
                if attempt == 2 {
                    PollStep::Abort
                } else {
                    PollStep::Pending
                }
            },
        )
        .await;

        assert!(outcome.is_aborted());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_budget_never_probes() {
        let calls = AtomicU32::new(0);
        let outcome: PollOutcome<()> =
            poll_until(PollSchedule::bounded(Duration::from_millis(10), 0), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { PollStep::Ready(()) }
            })
            .await;

        assert!(outcome.is_exhausted());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn max_wait_counts_gaps_between_attempts() {
        let schedule = PollSchedule::bounded(Duration::from_millis(50), 40);
        assert_eq!(schedule.max_wait(), Some(Duration::from_millis(1950)));
        assert_eq!(
            PollSchedule::unbounded(Duration::from_millis(5)).max_wait(),
            None
        );
    }
}
