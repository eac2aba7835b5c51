//! # Transport Capability
//!
//! The engine drives audio through exactly two kinds of playback surface,
//! both behind the [`Transport`] trait:
//!
//! - [`RemoteTransport`]: a networked device commanded over HTTP. It must
//!   announce readiness before it can be addressed, and its position is only
//!   known by polling.
//! - [`LocalTransport`]: an in-process media element with immediate
//!   seek/play/pause and a synchronously readable current time.
//!
//! Transports never touch engine state. They report failures as
//! [`PlaybackError`](crate::PlaybackError) and leave retries to the caller.

mod local;
mod remote;

pub use local::LocalTransport;
pub use remote::RemoteTransport;

pub use core_runtime::events::TransportKind;

use crate::error::{PlaybackError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Caller-supplied track metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackRef {
    /// Opaque identifier understood by the remote device (e.g. a track URI).
    pub uri: String,
    /// Directly decodable audio for the local transport.
    pub fallback_url: Option<String>,
}

impl TrackRef {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            fallback_url: None,
        }
    }

    pub fn with_fallback_url(mut self, url: impl Into<String>) -> Self {
        self.fallback_url = Some(url.into());
        self
    }
}

/// A position reading from a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackPosition {
    pub position_ms: u64,
    pub is_playing: bool,
}

impl PlaybackPosition {
    pub fn new(position_ms: u64, is_playing: bool) -> Self {
        Self {
            position_ms,
            is_playing,
        }
    }
}

/// Result of [`Transport::connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectStatus {
    Ready,
    /// No credential, no device, or the handshake failed outright.
    Unavailable,
    /// The device never announced readiness within the bounded wait.
    ReadyTimeout,
}

impl ConnectStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, ConnectStatus::Ready)
    }

    /// The error to surface when no transport could be connected.
    pub(crate) fn into_error(self, ready_timeout: Duration) -> PlaybackError {
        match self {
            ConnectStatus::ReadyTimeout => PlaybackError::DeviceReadyTimeout(ready_timeout),
            ConnectStatus::Ready | ConnectStatus::Unavailable => {
                PlaybackError::TransportUnavailable("transport could not connect".to_string())
            }
        }
    }
}

/// Something that can seek, play, pause and report its position.
#[async_trait]
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Whether this transport can play `track` at all.
    fn supports(&self, track: &TrackRef) -> bool {
        let _ = track;
        true
    }

    /// Make the transport addressable. Idempotent; never errors.
    async fn connect(&self) -> ConnectStatus;

    async fn seek(&self, position_ms: u64) -> Result<()>;

    /// Start `track` at `position_ms`.
    async fn play(&self, track: &TrackRef, position_ms: u64) -> Result<()>;

    /// Stop audible output. Succeeds when already paused.
    async fn pause(&self) -> Result<()>;

    /// Current position, or `None` when the transport cannot tell.
    async fn position(&self) -> Option<PlaybackPosition>;
}
