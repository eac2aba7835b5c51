//! Player state and its status machine.
//!
//! ```text
//! idle -> requesting -> confirming -> playing -> ended
//!             |              |           |
//!             +--------------+-----------+--> error -> idle
//! any state --cancel--> idle
//! ```

use crate::arbiter::RequestId;
use crate::transport::TransportKind;
use core_async::time::{signed_millis_between, Instant};
use serde::{Deserialize, Serialize};
use tracing::error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerStatus {
    #[default]
    Idle,
    Requesting,
    Confirming,
    Playing,
    Ended,
    Error,
}

impl PlayerStatus {
    /// Whether `self -> next` is an edge of the status machine.
    pub fn can_transition_to(self, next: PlayerStatus) -> bool {
        use PlayerStatus::*;

        match (self, next) {
            // Cancellation (new request or stop) and error recovery.
            (_, Idle) => true,
            (Idle | Ended, Requesting) => true,
            (Requesting, Confirming) => true,
            (Confirming, Playing) => true,
            (Playing, Ended) => true,
            (Requesting | Confirming | Playing, Error) => true,
            _ => false,
        }
    }

    /// A request is in flight (not idle and not finished).
    pub fn is_active(self) -> bool {
        matches!(
            self,
            PlayerStatus::Requesting | PlayerStatus::Confirming | PlayerStatus::Playing
        )
    }
}

/// Snapshot of the engine's single player state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlayerState {
    pub status: PlayerStatus,
    pub active_request_id: Option<RequestId>,
    /// Instant corresponding to the request's start offset.
    pub origin: Option<Instant>,
    pub duration_ms: Option<u64>,
    /// Non-decreasing within a request; reset to 0 by every new request.
    pub progress_ms: u64,
    /// Transport the current request is using.
    pub transport: Option<TransportKind>,
}

impl PlayerState {
    /// Move to `next`, refusing edges the status machine does not have.
    pub(crate) fn transition(&mut self, next: PlayerStatus) -> bool {
        if !self.status.can_transition_to(next) {
            error!(from = ?self.status, to = ?next, "Rejected invalid status transition");
            return false;
        }
        self.status = next;
        true
    }

    /// Enter `requesting` for a freshly minted request.
    pub(crate) fn begin(&mut self, id: RequestId, duration_ms: u64) {
        self.reset();
        self.transition(PlayerStatus::Requesting);
        self.active_request_id = Some(id);
        self.duration_ms = Some(duration_ms);
    }

    /// Back to `idle` with every per-request field cleared.
    pub(crate) fn reset(&mut self) {
        self.transition(PlayerStatus::Idle);
        self.active_request_id = None;
        self.origin = None;
        self.duration_ms = None;
        self.progress_ms = 0;
        self.transport = None;
    }

    /// Wall-clock elapsed time since the origin, clamped to `[0, duration]`.
    pub fn elapsed_ms(&self, now: Instant) -> Option<u64> {
        let origin = self.origin?;
        let duration = self.duration_ms?;
        let elapsed = signed_millis_between(origin, now).max(0) as u64;
        Some(elapsed.min(duration))
    }

    /// Record a progress reading, never moving backwards. Returns the value
    /// to report.
    pub(crate) fn advance_progress(&mut self, elapsed_ms: u64) -> u64 {
        let bounded = self.duration_ms.map_or(elapsed_ms, |d| elapsed_ms.min(d));
        self.progress_ms = self.progress_ms.max(bounded);
        self.progress_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbiter::Arbiter;
    use core_async::time::{offset_instant, Duration};

    #[test]
    fn happy_path_transitions() {
        use PlayerStatus::*;
        assert!(Idle.can_transition_to(Requesting));
        assert!(Requesting.can_transition_to(Confirming));
        assert!(Confirming.can_transition_to(Playing));
        assert!(Playing.can_transition_to(Ended));
        assert!(Ended.can_transition_to(Requesting));
    }

    #[test]
    fn confirming_cannot_be_skipped() {
        use PlayerStatus::*;
        assert!(!Requesting.can_transition_to(Playing));
        assert!(!Idle.can_transition_to(Playing));
        assert!(!Confirming.can_transition_to(Ended));
        assert!(!Ended.can_transition_to(Error));
        assert!(!Error.can_transition_to(Requesting));
    }

    #[test]
    fn every_state_can_be_cancelled() {
        use PlayerStatus::*;
        for status in [Idle, Requesting, Confirming, Playing, Ended, Error] {
            assert!(status.can_transition_to(Idle));
        }
    }

    #[test]
    fn invalid_transition_leaves_status_unchanged() {
        let mut state = PlayerState::default();
        assert!(!state.transition(PlayerStatus::Playing));
        assert_eq!(state.status, PlayerStatus::Idle);
    }

    #[test]
    fn begin_resets_progress() {
        let arbiter = Arbiter::new();
        let (id, _) = arbiter.mint();
        let mut state = PlayerState {
            status: PlayerStatus::Ended,
            progress_ms: 900,
            ..Default::default()
        };

        state.begin(id, 1000);
        assert_eq!(state.status, PlayerStatus::Requesting);
        assert_eq!(state.active_request_id, Some(id));
        assert_eq!(state.progress_ms, 0);
        assert_eq!(state.duration_ms, Some(1000));
    }

    #[test]
    fn progress_is_monotonic_and_bounded() {
        let mut state = PlayerState {
            duration_ms: Some(1000),
            ..Default::default()
        };
        assert_eq!(state.advance_progress(300), 300);
        assert_eq!(state.advance_progress(250), 300);
        assert_eq!(state.advance_progress(5000), 1000);
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_is_clamped() {
        let now = Instant::now();
        let mut state = PlayerState {
            duration_ms: Some(1000),
            origin: Some(offset_instant(now, 50)),
            ..Default::default()
        };
        assert_eq!(state.elapsed_ms(now), Some(0));

        state.origin = Some(now);
        assert_eq!(state.elapsed_ms(now + Duration::from_millis(400)), Some(400));
        assert_eq!(state.elapsed_ms(now + Duration::from_secs(3)), Some(1000));
    }
}
