//! # Timing Engine
//!
//! Two loops per playing request, both keyed to its [`RequestId`]:
//!
//! - the **progress loop** ticks at display rate, turning the timing origin
//!   into a clamped, non-decreasing `progress` value. It never ends the
//!   request; it just stops ticking once the full duration has elapsed.
//! - the **correction loop** polls the transport, re-bases the origin when
//!   the reported and wall-clock elapsed times disagree by more than the
//!   drift tolerance, and decides when the window is over.
//!
//! Re-basing forward is immediate. Re-basing backward is limited to the
//! drift tolerance per correction, so a lagging device pulls the clock back
//! gradually instead of making elapsed time jump.

use crate::arbiter::{PlaybackRequest, RequestId};
use crate::config::millis;
use crate::engine::EngineInner;
use crate::state::PlayerStatus;
use crate::transport::Transport;
use core_async::poll::{poll_until, PollOutcome, PollSchedule, PollStep};
use core_async::time::{offset_instant, signed_millis_between, Instant};
use core_runtime::events::SnippetEvent;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Why the correction loop ended the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EndReason {
    /// The transport reported the end position (minus the safety margin).
    Reported,
    /// No position was available; wall-clock elapsed time reached the end.
    WallClock,
    /// The hard overrun ceiling was hit.
    Ceiling,
}

/// Elapsed time the origin should be re-based to, if any.
///
/// `wall_ms` and `reported_ms` are elapsed times since the start offset as
/// measured by the local clock and by the transport.
pub(crate) fn corrected_elapsed(wall_ms: i64, reported_ms: i64, tolerance_ms: i64) -> Option<i64> {
    let drift = reported_ms - wall_ms;
    if drift.abs() <= tolerance_ms {
        return None;
    }
    if drift > 0 {
        Some(reported_ms)
    } else {
        Some(reported_ms.max(wall_ms - tolerance_ms))
    }
}

pub(crate) async fn progress_loop(inner: Arc<EngineInner>, id: RequestId) {
    let schedule = PollSchedule::unbounded(inner.config.progress_interval);
    let outcome = poll_until(schedule, |_| {
        let step = progress_tick(&inner, id);
        async move { step }
    })
    .await;

    if outcome.is_ready() {
        debug!(request_id = id.get(), "Progress loop reached full duration");
    }
}

fn progress_tick(inner: &EngineInner, id: RequestId) -> PollStep<()> {
    let _turn = inner.turn.lock();
    if !inner.arbiter.is_current(id) {
        return PollStep::Abort;
    }

    let (progress, duration) = {
        let mut state = inner.state.lock();
        if state.status != PlayerStatus::Playing {
            return PollStep::Abort;
        }
        let (Some(elapsed), Some(duration)) = (state.elapsed_ms(Instant::now()), state.duration_ms)
        else {
            return PollStep::Abort;
        };
        (state.advance_progress(elapsed), duration)
    };

    inner.channel.emit(id, SnippetEvent::Progress { elapsed_ms: progress });

    if progress >= duration {
        PollStep::Ready(())
    } else {
        PollStep::Pending
    }
}

/// Run the correction loop until the window ends. Returns `None` if the
/// request went stale first.
pub(crate) async fn correction_loop(
    inner: &EngineInner,
    transport: &dyn Transport,
    request: &PlaybackRequest,
) -> Option<EndReason> {
    let id = request.id;
    let config = &inner.config;
    let duration_ms = request.duration_ms as i64;
    let end_threshold_ms = duration_ms - millis(config.safety_margin) as i64;
    let ceiling_ms = duration_ms.saturating_add(millis(config.max_overrun) as i64);
    let tolerance_ms = millis(config.drift_tolerance) as i64;
    let start_offset_ms = request.start_offset_ms as i64;
    // Re-basing moves the origin, so the ceiling is measured from here.
    let started_at = Instant::now();

    let schedule = PollSchedule::unbounded(config.correction_interval);
    let outcome = poll_until(schedule, move |_| async move {
        if !inner.arbiter.is_current(id) {
            return PollStep::Abort;
        }
        let reading = transport.position().await;

        let _turn = inner.turn.lock();
        if !inner.arbiter.is_current(id) {
            return PollStep::Abort;
        }
        let now = Instant::now();
        let mut state = inner.state.lock();
        let Some(origin) = state.origin else {
            return PollStep::Abort;
        };
        let wall_ms = signed_millis_between(origin, now);

        if signed_millis_between(started_at, now) >= ceiling_ms {
            return PollStep::Ready(EndReason::Ceiling);
        }

        match reading {
            Some(position) => {
                let reported_ms = position.position_ms as i64 - start_offset_ms;
                if let Some(rebased_ms) = corrected_elapsed(wall_ms, reported_ms, tolerance_ms) {
                    debug!(
                        request_id = id.get(),
                        drift_ms = reported_ms - wall_ms,
                        rebased_ms,
                        "Re-basing timing origin"
                    );
                    state.origin = Some(offset_instant(now, -rebased_ms));
                }
                if reported_ms >= end_threshold_ms {
                    return PollStep::Ready(EndReason::Reported);
                }
            }
            None => {
                if wall_ms >= end_threshold_ms {
                    return PollStep::Ready(EndReason::WallClock);
                }
            }
        }
        PollStep::Pending
    })
    .await;

    match outcome {
        PollOutcome::Ready(reason) => {
            match reason {
                EndReason::Ceiling => warn!(request_id = id.get(), "Snippet hit the overrun ceiling"),
                _ => info!(request_id = id.get(), ?reason, "Snippet window complete"),
            }
            Some(reason)
        }
        PollOutcome::Aborted | PollOutcome::Exhausted { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_drift_is_ignored() {
        assert_eq!(corrected_elapsed(500, 560, 100), None);
        assert_eq!(corrected_elapsed(500, 400, 100), None);
    }

    #[test]
    fn device_ahead_rebases_fully() {
        assert_eq!(corrected_elapsed(500, 750, 100), Some(750));
    }

    #[test]
    fn device_behind_rebases_by_at_most_the_tolerance() {
        assert_eq!(corrected_elapsed(500, 100, 100), Some(400));
        assert_eq!(corrected_elapsed(500, 380, 100), Some(400));
        assert_eq!(corrected_elapsed(500, 395, 100), Some(400));
    }
}
