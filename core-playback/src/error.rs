//! # Playback Error Types
//!
//! Errors surfaced by the snippet engine. The first group mirrors the
//! `error(kind)` event taxonomy; the second group is API-level and never
//! reaches subscribers.

use bridge_traits::BridgeError;
use core_runtime::events::ErrorKind;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Transport command, for error context and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Play,
    Seek,
    Pause,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Play => f.write_str("play"),
            Command::Seek => f.write_str("seek"),
            Command::Pause => f.write_str("pause"),
        }
    }
}

/// Errors that can occur while playing a snippet.
#[derive(Error, Debug)]
pub enum PlaybackError {
    // ========================================================================
    // Lifecycle Errors (emitted as `error(kind)`)
    // ========================================================================
    /// Neither the remote nor the local transport can play this request.
    #[error("No playback transport available: {0}")]
    TransportUnavailable(String),

    /// The remote device never announced readiness.
    #[error("Remote device not ready after {0:?}")]
    DeviceReadyTimeout(Duration),

    /// The seek was never observed on the transport.
    #[error("Seek to {target_ms}ms not confirmed after {attempts} attempts")]
    SeekTimeout { target_ms: u64, attempts: u32 },

    /// A transport command failed.
    ///
    /// `retryable` marks failures worth another attempt (network errors,
    /// throttling, server errors, a device that is not registered yet).
    #[error("{command} command failed: {message}")]
    CommandFailed {
        command: Command,
        message: String,
        retryable: bool,
    },

    /// A newer request (or `stop`) replaced this one. Never emitted.
    #[error("Request {0} was superseded")]
    AbortedBySupersession(u64),

    // ========================================================================
    // API Errors
    // ========================================================================
    #[error("Nothing to replay")]
    NothingToReplay,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    /// A spawned engine task died unexpectedly.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PlaybackError {
    pub(crate) fn command(command: Command, message: impl Into<String>, retryable: bool) -> Self {
        PlaybackError::CommandFailed {
            command,
            message: message.into(),
            retryable,
        }
    }

    /// Wrap a bridge failure raised while running `command`.
    pub(crate) fn from_bridge(command: Command, err: BridgeError) -> Self {
        let retryable = err.is_transient();
        PlaybackError::command(command, err.to_string(), retryable)
    }

    /// The event kind reported to subscribers, if this error is emitted at all.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            PlaybackError::TransportUnavailable(_) => Some(ErrorKind::TransportUnavailable),
            PlaybackError::DeviceReadyTimeout(_) => Some(ErrorKind::DeviceReadyTimeout),
            PlaybackError::SeekTimeout { .. } => Some(ErrorKind::SeekTimeout),
            PlaybackError::CommandFailed { .. } | PlaybackError::Bridge(_) => {
                Some(ErrorKind::CommandFailed)
            }
            PlaybackError::AbortedBySupersession(_)
            | PlaybackError::NothingToReplay
            | PlaybackError::InvalidRequest(_)
            | PlaybackError::Config(_)
            | PlaybackError::Internal(_) => None,
        }
    }

    /// Returns `true` if the failed operation can be retried.
    pub fn is_transient(&self) -> bool {
        match self {
            PlaybackError::CommandFailed { retryable, .. } => *retryable,
            PlaybackError::Bridge(err) => err.is_transient(),
            _ => false,
        }
    }

    pub fn is_supersession(&self) -> bool {
        matches!(self, PlaybackError::AbortedBySupersession(_))
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;
