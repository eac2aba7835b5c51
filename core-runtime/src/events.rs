//! # Event Types and Event Bus
//!
//! Shared event vocabulary for the snippet playback core, plus a broadcast
//! [`EventBus`] for consumers that prefer an async stream over callbacks.
//!
//! ## Overview
//!
//! - **`SnippetEvent`**: the four lifecycle events of a playback window
//!   (`start`, `progress`, `end`, `error`)
//! - **`TransportEvent`**: which playback surface the engine is driving
//! - **`CoreEvent`**: the envelope published on the bus, tagging snippet
//!   events with the request they belong to
//! - **`EventBus` / `EventStream`**: `tokio::sync::broadcast` fan-out with
//!   optional filtering
//!
//! The engine's own subscriber callbacks (synchronous, in-order delivery)
//! live in `core_playback::channel`; every event delivered there is mirrored
//! onto the bus when one is configured.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, EventStream, SnippetEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(64);
//! let mut ends = EventStream::new(bus.subscribe())
//!     .filter(|event| matches!(event, CoreEvent::Snippet { event: SnippetEvent::End, .. }));
//!
//! bus.emit(CoreEvent::Snippet { request_id: 1, event: SnippetEvent::End }).ok();
//! let received = ends.recv().await.unwrap();
//! assert_eq!(received.request_id(), Some(1));
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events (progress
//!   ticks are frequent; size the buffer accordingly). Non-fatal.
//! - **`RecvError::Closed`**: all senders dropped; treat as shutdown.

use core_async::sync::broadcast;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use core_async::sync::broadcast::error::{RecvError, SendError};
pub use core_async::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// Progress ticks arrive roughly every 16ms, so this holds a few seconds of
/// backlog for a slow subscriber.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 256;

// ============================================================================
// Snippet Events
// ============================================================================

/// Failure categories surfaced through the `error(kind)` event.
///
/// Supersession by a newer request is deliberately absent: it terminates a
/// request silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// Neither remote nor local playback is possible.
    TransportUnavailable,
    /// The remote device never announced readiness.
    DeviceReadyTimeout,
    /// The seek could not be confirmed within the attempt budget.
    SeekTimeout,
    /// A seek/play/pause command kept failing after retries.
    CommandFailed,
}

impl ErrorKind {
    /// Stable wire name (`"seek-timeout"`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::TransportUnavailable => "transport-unavailable",
            ErrorKind::DeviceReadyTimeout => "device-ready-timeout",
            ErrorKind::SeekTimeout => "seek-timeout",
            ErrorKind::CommandFailed => "command-failed",
        }
    }

    /// Whether a host should retry the request on the local transport.
    pub fn suggests_local_fallback(&self) -> bool {
        matches!(
            self,
            ErrorKind::TransportUnavailable | ErrorKind::DeviceReadyTimeout
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Discriminant of [`SnippetEvent`], used as the subscription key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Start,
    Progress,
    End,
    Error,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::Start,
        EventKind::Progress,
        EventKind::End,
        EventKind::Error,
    ];
}

/// Lifecycle event of a single playback window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum SnippetEvent {
    /// Playback confirmed at the requested offset; timing has begun.
    Start {
        /// Length of the window in milliseconds.
        duration_ms: u64,
    },
    /// Elapsed time into the window, clamped to `[0, duration_ms]`.
    Progress { elapsed_ms: u64 },
    /// The window ran its full length and the transport was paused.
    End,
    /// The request failed; the engine is idle again.
    Error { kind: ErrorKind },
}

impl SnippetEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SnippetEvent::Start { .. } => EventKind::Start,
            SnippetEvent::Progress { .. } => EventKind::Progress,
            SnippetEvent::End => EventKind::End,
            SnippetEvent::Error { .. } => EventKind::Error,
        }
    }

    fn description(&self) -> &str {
        match self {
            SnippetEvent::Start { .. } => "Snippet started",
            SnippetEvent::Progress { .. } => "Snippet progress",
            SnippetEvent::End => "Snippet ended",
            SnippetEvent::Error { .. } => "Snippet failed",
        }
    }
}

// ============================================================================
// Transport Events
// ============================================================================

/// Which playback surface is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Remote,
    Local,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Remote => f.write_str("remote"),
            TransportKind::Local => f.write_str("local"),
        }
    }
}

/// Events about transport selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum TransportEvent {
    /// A transport finished connecting and was selected.
    Selected { transport: TransportKind },
    /// The primary transport was unusable; the fallback was selected instead.
    FellBack {
        from: TransportKind,
        to: TransportKind,
        reason: ErrorKind,
    },
}

impl TransportEvent {
    fn description(&self) -> &str {
        match self {
            TransportEvent::Selected { .. } => "Transport selected",
            TransportEvent::FellBack { .. } => "Fell back to secondary transport",
        }
    }
}

// ============================================================================
// Core Event Envelope
// ============================================================================

/// Top-level event published on the bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Lifecycle event of the playback request `request_id`.
    Snippet { request_id: u64, event: SnippetEvent },
    /// Transport selection change.
    Transport(TransportEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Snippet { event, .. } => event.description(),
            CoreEvent::Transport(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Snippet {
                event: SnippetEvent::Error { .. },
                ..
            } => EventSeverity::Error,
            CoreEvent::Transport(TransportEvent::FellBack { .. }) => EventSeverity::Warning,
            CoreEvent::Snippet {
                event: SnippetEvent::Progress { .. },
                ..
            } => EventSeverity::Debug,
            _ => EventSeverity::Info,
        }
    }

    /// Request id for snippet events.
    pub fn request_id(&self) -> Option<u64> {
        match self {
            CoreEvent::Snippet { request_id, .. } => Some(*request_id),
            CoreEvent::Transport(_) => None,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Event Bus
// ============================================================================

/// Broadcast channel for [`CoreEvent`]s.
///
/// Cheap to clone; every clone publishes into the same channel. Each call to
/// [`subscribe`](Self::subscribe) creates an independent receiver that sees
/// all events emitted after it was created.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error when nobody is listening.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` with an optional predicate.
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` will be returned.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Convenience filter: snippet events for one request only.
    pub fn for_request(self, request_id: u64) -> Self {
        self.filter(move |event| event.request_id() == Some(request_id))
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// `RecvError::Lagged(n)` if the subscriber fell behind by `n` events,
    /// `RecvError::Closed` once all senders are gone.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive a matching event without waiting.
    ///
    /// Returns `None` if no matching event is currently buffered.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
