//! # Request Arbiter
//!
//! Generation counter for playback requests. Every request gets a fresh,
//! strictly increasing [`RequestId`]; minting a new one (or cancelling)
//! makes every older id stale at once. Asynchronous continuations carry
//! their id explicitly and call [`Arbiter::is_current`] before acting, so a
//! slow response from a superseded request can never touch engine state.

use crate::transport::TrackRef;
use core_async::time::Instant;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Sentinel stored in `current` when no request is active.
const NONE: u64 = 0;

/// Identifier of a playback request. Ids start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(u64);

impl RequestId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An immutable "play this window" request.
#[derive(Debug, Clone)]
pub struct PlaybackRequest {
    pub id: RequestId,
    pub track: TrackRef,
    pub start_offset_ms: u64,
    pub duration_ms: u64,
    pub created_at: Instant,
}

impl PlaybackRequest {
    /// Track position at which the window ends.
    pub fn end_offset_ms(&self) -> u64 {
        self.start_offset_ms.saturating_add(self.duration_ms)
    }
}

/// Mints request ids and tracks which one is current.
#[derive(Debug, Default)]
pub struct Arbiter {
    minted: AtomicU64,
    current: AtomicU64,
}

impl Arbiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next id and make it current.
    ///
    /// Returns the new id together with the request it displaced, if one
    /// was still active.
    pub fn mint(&self) -> (RequestId, Option<RequestId>) {
        let id = self.minted.fetch_add(1, Ordering::SeqCst) + 1;
        let previous = self.current.swap(id, Ordering::SeqCst);
        (RequestId(id), to_id(previous))
    }

    /// Whether `id` is still the active request.
    pub fn is_current(&self, id: RequestId) -> bool {
        self.current.load(Ordering::SeqCst) == id.0
    }

    pub fn current(&self) -> Option<RequestId> {
        to_id(self.current.load(Ordering::SeqCst))
    }

    /// The most recently minted id, active or not.
    pub fn latest(&self) -> Option<RequestId> {
        to_id(self.minted.load(Ordering::SeqCst))
    }

    /// Whether a request newer than `id` has been minted.
    pub fn is_superseded(&self, id: RequestId) -> bool {
        self.minted.load(Ordering::SeqCst) > id.0
    }

    /// Mark whatever is active as stale without minting a replacement.
    pub fn cancel(&self) -> Option<RequestId> {
        to_id(self.current.swap(NONE, Ordering::SeqCst))
    }

    /// Retire `id` after it finished. No-op if `id` is no longer current.
    pub fn retire(&self, id: RequestId) -> bool {
        self.current
            .compare_exchange(id.0, NONE, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

fn to_id(raw: u64) -> Option<RequestId> {
    (raw != NONE).then_some(RequestId(raw))
}
