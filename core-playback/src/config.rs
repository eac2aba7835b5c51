//! # Snippet Engine Configuration
//!
//! Every timing constant the engine uses, with serde defaults so a partial
//! config file fills in the rest.

use crate::error::{PlaybackError, Result};
use crate::transport::TransportKind;
use core_async::poll::PollSchedule;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What to do when seek confirmation exhausts its attempts without ever
/// reading a position from the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationPolicy {
    /// Fail the request with `seek-timeout`.
    #[default]
    Defensive,
    /// Start timing anyway, with the origin at the moment confirmation gave up.
    Optimistic,
}

/// Snippet engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnippetConfig {
    /// Delay between seek confirmation polls.
    ///
    /// Default: 50ms.
    #[serde(default = "default_confirm_interval")]
    pub confirm_interval: Duration,

    /// Maximum number of confirmation polls.
    ///
    /// Default: 40 (about 2 seconds with the default interval).
    #[serde(default = "default_confirm_attempts")]
    pub confirm_attempts: u32,

    /// How far a remote device's reported position may sit from the target
    /// and still count as confirmed.
    ///
    /// Default: 100ms.
    #[serde(default = "default_remote_seek_tolerance")]
    pub remote_seek_tolerance: Duration,

    /// Same as `remote_seek_tolerance`, for the local transport.
    ///
    /// Default: 25ms.
    #[serde(default = "default_local_seek_tolerance")]
    pub local_seek_tolerance: Duration,

    /// Progress tick period.
    ///
    /// Default: 16ms.
    #[serde(default = "default_progress_interval")]
    pub progress_interval: Duration,

    /// Correction (position poll) period.
    ///
    /// Default: 50ms.
    #[serde(default = "default_correction_interval")]
    pub correction_interval: Duration,

    /// Disagreement between reported and wall-clock elapsed time that
    /// triggers a re-base of the timing origin.
    ///
    /// Default: 100ms.
    #[serde(default = "default_drift_tolerance")]
    pub drift_tolerance: Duration,

    /// The window ends once reported elapsed time reaches
    /// `duration - safety_margin`.
    ///
    /// Default: 40ms.
    #[serde(default = "default_safety_margin")]
    pub safety_margin: Duration,

    /// Hard ceiling past the requested duration, in wall-clock time, after
    /// which the window is ended regardless of what the transport reports.
    ///
    /// Default: 2 seconds.
    #[serde(default = "default_max_overrun")]
    pub max_overrun: Duration,

    /// Attempts per seek/play/pause command, including the first.
    ///
    /// Default: 3.
    #[serde(default = "default_command_attempts")]
    pub command_attempts: u32,

    /// Fixed delay between command attempts.
    ///
    /// Default: 250ms.
    #[serde(default = "default_command_backoff")]
    pub command_backoff: Duration,

    /// Upper bound on the remote device readiness handshake.
    ///
    /// Default: 10 seconds.
    #[serde(default = "default_device_ready_timeout")]
    pub device_ready_timeout: Duration,

    /// A `replay()` within this long of the previous one is ignored.
    ///
    /// Default: 300ms.
    #[serde(default = "default_replay_debounce")]
    pub replay_debounce: Duration,

    #[serde(default)]
    pub confirmation_policy: ConfirmationPolicy,

    /// Select the local transport when the remote one cannot connect.
    ///
    /// Default: true.
    #[serde(default = "default_fallback_to_local")]
    pub fallback_to_local: bool,
}

impl Default for SnippetConfig {
    fn default() -> Self {
        Self {
            confirm_interval: default_confirm_interval(),
            confirm_attempts: default_confirm_attempts(),
            remote_seek_tolerance: default_remote_seek_tolerance(),
            local_seek_tolerance: default_local_seek_tolerance(),
            progress_interval: default_progress_interval(),
            correction_interval: default_correction_interval(),
            drift_tolerance: default_drift_tolerance(),
            safety_margin: default_safety_margin(),
            max_overrun: default_max_overrun(),
            command_attempts: default_command_attempts(),
            command_backoff: default_command_backoff(),
            device_ready_timeout: default_device_ready_timeout(),
            replay_debounce: default_replay_debounce(),
            confirmation_policy: ConfirmationPolicy::default(),
            fallback_to_local: default_fallback_to_local(),
        }
    }
}

impl SnippetConfig {
    /// Tighter polling and tolerances for responsive devices.
    pub fn low_latency() -> Self {
        Self {
            confirm_interval: Duration::from_millis(25),
            confirm_attempts: 60,
            correction_interval: Duration::from_millis(25),
            drift_tolerance: Duration::from_millis(50),
            safety_margin: Duration::from_millis(20),
            command_backoff: Duration::from_millis(100),
            ..Default::default()
        }
    }

    /// Looser tolerances and longer budgets for slow or jittery networks.
    pub fn tolerant() -> Self {
        Self {
            confirm_interval: Duration::from_millis(100),
            confirm_attempts: 50,
            remote_seek_tolerance: Duration::from_millis(250),
            drift_tolerance: Duration::from_millis(200),
            safety_margin: Duration::from_millis(60),
            max_overrun: Duration::from_secs(4),
            command_attempts: 5,
            command_backoff: Duration::from_millis(500),
            device_ready_timeout: Duration::from_secs(20),
            ..Default::default()
        }
    }

    /// Validate the configuration.
    ///
    /// Returns an error if any interval is zero or any attempt budget is empty.
    pub fn validate(&self) -> Result<()> {
        let intervals = [
            ("confirm_interval", self.confirm_interval),
            ("progress_interval", self.progress_interval),
            ("correction_interval", self.correction_interval),
            ("drift_tolerance", self.drift_tolerance),
            ("device_ready_timeout", self.device_ready_timeout),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, value)| value.is_zero()) {
            return Err(PlaybackError::Config(format!("{} must be non-zero", name)));
        }

        if self.confirm_attempts == 0 {
            return Err(PlaybackError::Config(
                "confirm_attempts must be at least 1".to_string(),
            ));
        }

        if self.command_attempts == 0 {
            return Err(PlaybackError::Config(
                "command_attempts must be at least 1".to_string(),
            ));
        }

        if self.progress_interval > self.correction_interval {
            return Err(PlaybackError::Config(format!(
                "progress_interval ({:?}) must not exceed correction_interval ({:?})",
                self.progress_interval, self.correction_interval
            )));
        }

        Ok(())
    }

    pub fn confirm_schedule(&self) -> PollSchedule {
        PollSchedule::bounded(self.confirm_interval, self.confirm_attempts)
    }

    pub fn command_schedule(&self) -> PollSchedule {
        PollSchedule::bounded(self.command_backoff, self.command_attempts)
    }

    /// Seek confirmation tolerance for the given transport, in milliseconds.
    pub fn seek_tolerance_ms(&self, kind: TransportKind) -> u64 {
        let tolerance = match kind {
            TransportKind::Remote => self.remote_seek_tolerance,
            TransportKind::Local => self.local_seek_tolerance,
        };
        millis(tolerance)
    }
}

pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn default_confirm_interval() -> Duration {
    Duration::from_millis(50)
}

fn default_confirm_attempts() -> u32 {
    40
}

fn default_remote_seek_tolerance() -> Duration {
    Duration::from_millis(100)
}

fn default_local_seek_tolerance() -> Duration {
    Duration::from_millis(25)
}

fn default_progress_interval() -> Duration {
    Duration::from_millis(16)
}

fn default_correction_interval() -> Duration {
    Duration::from_millis(50)
}

fn default_drift_tolerance() -> Duration {
    Duration::from_millis(100)
}

fn default_safety_margin() -> Duration {
    Duration::from_millis(40)
}

fn default_max_overrun() -> Duration {
    Duration::from_secs(2)
}

fn default_command_attempts() -> u32 {
    3
}

fn default_command_backoff() -> Duration {
    Duration::from_millis(250)
}

fn default_device_ready_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_replay_debounce() -> Duration {
    Duration::from_millis(300)
}

fn default_fallback_to_local() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SnippetConfig::default();
        assert_eq!(config.confirm_interval, Duration::from_millis(50));
        assert_eq!(config.confirm_attempts, 40);
        assert_eq!(config.drift_tolerance, Duration::from_millis(100));
        assert_eq!(config.safety_margin, Duration::from_millis(40));
        assert_eq!(config.confirmation_policy, ConfirmationPolicy::Defensive);
        assert!(config.fallback_to_local);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_presets_are_valid() {
        assert!(SnippetConfig::low_latency().validate().is_ok());
        assert!(SnippetConfig::tolerant().validate().is_ok());
        assert!(
            SnippetConfig::tolerant().remote_seek_tolerance
                > SnippetConfig::default().remote_seek_tolerance
        );
    }

    #[test]
    fn test_validation_rejects_zero_values() {
        let config = SnippetConfig {
            confirm_attempts: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = SnippetConfig {
            correction_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = SnippetConfig {
            progress_interval: Duration::from_millis(100),
            correction_interval: Duration::from_millis(50),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_schedules_and_tolerances() {
        let config = SnippetConfig::default();
        assert_eq!(
            config.confirm_schedule().max_wait(),
            Some(Duration::from_millis(1950))
        );
        assert_eq!(config.command_schedule().max_attempts, Some(3));
        assert_eq!(config.seek_tolerance_ms(TransportKind::Remote), 100);
        assert_eq!(config.seek_tolerance_ms(TransportKind::Local), 25);
    }

    #[test]
    fn test_partial_deserialization_uses_defaults() {
        let config: SnippetConfig = serde_json::from_str(
            r#"{ "confirm_attempts": 10, "confirmation_policy": "optimistic" }"#,
        )
        .unwrap();
        assert_eq!(config.confirm_attempts, 10);
        assert_eq!(config.confirmation_policy, ConfirmationPolicy::Optimistic);
        assert_eq!(config.correction_interval, Duration::from_millis(50));
    }
}
