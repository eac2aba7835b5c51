//! Local media element transport.

use super::{ConnectStatus, PlaybackPosition, TrackRef, Transport, TransportKind};
use crate::config::millis;
use crate::error::{Command, PlaybackError, Result};
use async_trait::async_trait;
use bridge_traits::MediaElement;
use core_runtime::logging::strip_query;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Transport over an in-process [`MediaElement`], playing a track's
/// `fallback_url`.
pub struct LocalTransport {
    element: Arc<dyn MediaElement>,
}

impl LocalTransport {
    pub fn new(element: Arc<dyn MediaElement>) -> Self {
        Self { element }
    }
}

#[async_trait]
impl Transport for LocalTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Local
    }

    fn supports(&self, track: &TrackRef) -> bool {
        track.fallback_url.is_some()
    }

    async fn connect(&self) -> ConnectStatus {
        ConnectStatus::Ready
    }

    async fn seek(&self, position_ms: u64) -> Result<()> {
        self.element
            .set_current_time(Duration::from_millis(position_ms))
            .map_err(|e| PlaybackError::from_bridge(Command::Seek, e))
    }

    async fn play(&self, track: &TrackRef, position_ms: u64) -> Result<()> {
        let url = track.fallback_url.as_deref().ok_or_else(|| {
            PlaybackError::TransportUnavailable(format!("no local audio for {}", track.uri))
        })?;

        if self.element.source().as_deref() != Some(url) {
            debug!(source = %strip_query(url), "Loading local source");
            self.element
                .load(url)
                .await
                .map_err(|e| PlaybackError::from_bridge(Command::Play, e))?;
        }

        self.element
            .set_current_time(Duration::from_millis(position_ms))
            .map_err(|e| PlaybackError::from_bridge(Command::Play, e))?;
        self.element
            .play()
            .await
            .map_err(|e| PlaybackError::from_bridge(Command::Play, e))
    }

    async fn pause(&self) -> Result<()> {
        self.element.pause();
        Ok(())
    }

    async fn position(&self) -> Option<PlaybackPosition> {
        let current = self.element.current_time()?;
        Some(PlaybackPosition::new(
            millis(current),
            !self.element.is_paused(),
        ))
    }
}
