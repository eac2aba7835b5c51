//! # Seek Confirmation
//!
//! After `play` and `seek` have been issued, poll the transport until it
//! reports a position inside `[target - tolerance, target + tolerance]`
//! while playing. The instant of that poll, corrected by how far the device
//! already moved past the target, becomes the timing origin.
//!
//! When the attempt budget runs out:
//! - any position ever read is used as a degraded confirmation;
//! - otherwise [`ConfirmationPolicy::Defensive`] fails with `seek-timeout`
//!   and [`ConfirmationPolicy::Optimistic`] starts unconfirmed.

use crate::arbiter::RequestId;
use crate::config::ConfirmationPolicy;
use crate::error::{PlaybackError, Result};
use crate::transport::{PlaybackPosition, Transport};
use core_async::poll::{poll_until, PollOutcome, PollSchedule, PollStep};
use core_async::time::{offset_instant, Instant};
use parking_lot::Mutex;
use tracing::{debug, warn};

/// How the origin was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationQuality {
    /// A poll landed inside the tolerance window while playing.
    Confirmed,
    /// Budget exhausted; the last position read was used instead.
    Degraded,
    /// Budget exhausted with no reading at all (optimistic policy only).
    Unconfirmed,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Confirmation {
    /// Instant at which the transport was (or is assumed to be) at the target.
    pub origin: Instant,
    pub position_ms: u64,
    pub quality: ConfirmationQuality,
}

pub(crate) struct ConfirmRequest {
    pub id: RequestId,
    pub target_ms: u64,
    pub tolerance_ms: u64,
    pub schedule: PollSchedule,
    pub policy: ConfirmationPolicy,
}

pub(crate) fn within_tolerance(position_ms: u64, target_ms: u64, tolerance_ms: u64) -> bool {
    position_ms.abs_diff(target_ms) <= tolerance_ms
}

/// The instant at which a transport read at `read_at` showing `position_ms`
/// was at `target_ms`.
pub(crate) fn origin_for(read_at: Instant, position_ms: u64, target_ms: u64) -> Instant {
    let ahead = position_ms as i64 - target_ms as i64;
    offset_instant(read_at, -ahead)
}

pub(crate) async fn confirm_seek<C>(
    transport: &dyn Transport,
    request: ConfirmRequest,
    is_current: C,
) -> Result<Confirmation>
where
    C: Fn() -> bool,
{
    let last_read: Mutex<Option<(PlaybackPosition, Instant)>> = Mutex::new(None);
    let last_read_ref = &last_read;
    let is_current_ref = &is_current;
    let target_ms = request.target_ms;
    let tolerance_ms = request.tolerance_ms;

    let outcome = poll_until(request.schedule, move |attempt| async move {
        if !is_current_ref() {
            return PollStep::Abort;
        }
        let reading = transport.position().await;
        if !is_current_ref() {
            return PollStep::Abort;
        }

        let read_at = Instant::now();
        let Some(position) = reading else {
            return PollStep::Pending;
        };
        *last_read_ref.lock() = Some((position, read_at));

        if position.is_playing && within_tolerance(position.position_ms, target_ms, tolerance_ms) {
            debug!(attempt, position_ms = position.position_ms, "Seek confirmed");
            PollStep::Ready((position, read_at))
        } else {
            PollStep::Pending
        }
    })
    .await;

    match outcome {
        PollOutcome::Ready((position, read_at)) => Ok(Confirmation {
            origin: origin_for(read_at, position.position_ms, target_ms),
            position_ms: position.position_ms,
            quality: ConfirmationQuality::Confirmed,
        }),
        PollOutcome::Aborted => Err(PlaybackError::AbortedBySupersession(request.id.get())),
        PollOutcome::Exhausted { attempts } => {
            if let Some((position, read_at)) = last_read.lock().take() {
                warn!(
                    attempts,
                    target_ms,
                    position_ms = position.position_ms,
                    is_playing = position.is_playing,
                    "Seek not confirmed; using last known position"
                );
                return Ok(Confirmation {
                    origin: origin_for(read_at, position.position_ms, target_ms),
                    position_ms: position.position_ms,
                    quality: ConfirmationQuality::Degraded,
                });
            }

            match request.policy {
                ConfirmationPolicy::Defensive => {
                    Err(PlaybackError::SeekTimeout { target_ms, attempts })
                }
                ConfirmationPolicy::Optimistic => {
                    warn!(attempts, target_ms, "No position ever read; starting unconfirmed");
                    Ok(Confirmation {
                        origin: Instant::now(),
                        position_ms: target_ms,
                        quality: ConfirmationQuality::Unconfirmed,
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbiter::Arbiter;
    use crate::error::Result;
    use crate::transport::{ConnectStatus, TrackRef, TransportKind};
    use async_trait::async_trait;
    use core_async::time::{signed_millis_between, Duration};
    use std::collections::VecDeque;

    /// Replays a script of position readings, one per poll; repeats the
    /// last one when the script runs out.
    struct Scripted {
        readings: Mutex<VecDeque<Option<PlaybackPosition>>>,
    }

    impl Scripted {
        fn new(readings: Vec<Option<PlaybackPosition>>) -> Self {
            Self {
                readings: Mutex::new(readings.into()),
            }
        }
    }

    #[async_trait]
    impl Transport for Scripted {
        fn kind(&self) -> TransportKind {
            TransportKind::Remote
        }

        async fn connect(&self) -> ConnectStatus {
            ConnectStatus::Ready
        }

        async fn seek(&self, _position_ms: u64) -> Result<()> {
            Ok(())
        }

        async fn play(&self, _track: &TrackRef, _position_ms: u64) -> Result<()> {
            Ok(())
        }

        async fn pause(&self) -> Result<()> {
            Ok(())
        }

        async fn position(&self) -> Option<PlaybackPosition> {
            let mut readings = self.readings.lock();
            if readings.len() > 1 {
                readings.pop_front().flatten()
            } else {
                readings.front().copied().flatten()
            }
        }
    }

    fn request(policy: ConfirmationPolicy) -> ConfirmRequest {
        ConfirmRequest {
            id: Arbiter::new().mint().0,
            target_ms: 10_000,
            tolerance_ms: 100,
            schedule: PollSchedule::bounded(Duration::from_millis(50), 40),
            policy,
        }
    }

    #[test]
    fn tolerance_window_is_symmetric() {
        assert!(within_tolerance(10_000, 10_000, 100));
        assert!(within_tolerance(10_100, 10_000, 100));
        assert!(within_tolerance(9_900, 10_000, 100));
        assert!(!within_tolerance(10_101, 10_000, 100));
        assert!(!within_tolerance(0, 10_000, 100));
    }

    #[tokio::test(start_paused = true)]
    async fn confirms_inside_window_and_backdates_origin() {
        let transport = Scripted::new(vec![
            None,
            Some(PlaybackPosition::new(0, false)),
            Some(PlaybackPosition::new(10_030, true)),
        ]);
        let start = Instant::now();

        let confirmation = confirm_seek(&transport, request(ConfirmationPolicy::Defensive), || true)
            .await
            .unwrap();

        assert_eq!(confirmation.quality, ConfirmationQuality::Confirmed);
        assert_eq!(confirmation.position_ms, 10_030);
        // Third poll happens at 100ms; the device was 30ms past the target.
        assert_eq!(signed_millis_between(start, confirmation.origin), 70);
    }

    #[tokio::test(start_paused = true)]
    async fn paused_device_in_window_is_not_confirmed() {
        let transport = Scripted::new(vec![Some(PlaybackPosition::new(10_000, false))]);

        let confirmation = confirm_seek(&transport, request(ConfirmationPolicy::Defensive), || true)
            .await
            .unwrap();

        assert_eq!(confirmation.quality, ConfirmationQuality::Degraded);
    }

    #[tokio::test(start_paused = true)]
    async fn no_reading_times_out_defensively() {
        let transport = Scripted::new(vec![None]);
        let start = Instant::now();

        let err = confirm_seek(&transport, request(ConfirmationPolicy::Defensive), || true)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PlaybackError::SeekTimeout {
                target_ms: 10_000,
                attempts: 40
            }
        ));
        assert_eq!(start.elapsed(), Duration::from_millis(1950));
    }

    #[tokio::test(start_paused = true)]
    async fn no_reading_starts_unconfirmed_optimistically() {
        let transport = Scripted::new(vec![None]);

        let confirmation =
            confirm_seek(&transport, request(ConfirmationPolicy::Optimistic), || true)
                .await
                .unwrap();

        assert_eq!(confirmation.quality, ConfirmationQuality::Unconfirmed);
        assert_eq!(confirmation.position_ms, 10_000);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_request_aborts_without_polling() {
        let transport = Scripted::new(vec![Some(PlaybackPosition::new(10_000, true))]);

        let err = confirm_seek(&transport, request(ConfirmationPolicy::Defensive), || false)
            .await
            .unwrap_err();

        assert!(err.is_supersession());
    }
}
