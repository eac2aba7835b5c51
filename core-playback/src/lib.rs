//! # Snippet Playback
//!
//! Plays bounded windows ("snippets") of tracks over a remote device or a
//! local media element, with millisecond-level start confirmation and drift
//! correction.
//!
//! ## Overview
//!
//! This crate handles:
//! - Request arbitration: newest request wins, stale continuations are inert
//! - Transport selection with local fallback
//! - Seek confirmation and timing-origin capture
//! - Progress reporting and end-of-window detection
//! - Lifecycle events (`start`, `progress`, `end`, `error`)
//!
//! ```no_run
//! use core_playback::{SnippetEngine, TrackRef};
//! # use std::sync::Arc;
//! # async fn example(remote: Arc<dyn core_playback::Transport>) -> core_playback::Result<()> {
//! let engine = SnippetEngine::builder().primary(remote).build()?;
//! let _sub = engine.on_end(|| println!("snippet over"));
//! engine
//!     .play_snippet(TrackRef::new("spotify:track:6rqhFgbbKwnb9MLmUQDhG6"), 30_000, 1_000)
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod arbiter;
pub mod channel;
mod command;
pub mod config;
pub mod confirm;
pub mod engine;
pub mod error;
pub mod state;
mod timing;
pub mod transport;

pub use arbiter::{PlaybackRequest, RequestId};
pub use channel::{EventChannel, Subscription};
pub use config::{ConfirmationPolicy, SnippetConfig};
pub use confirm::ConfirmationQuality;
pub use engine::{SnippetEngine, SnippetEngineBuilder, SnippetFuture, SnippetOutcome};
pub use error::{Command, PlaybackError, Result};
pub use state::{PlayerState, PlayerStatus};
pub use transport::{
    ConnectStatus, LocalTransport, PlaybackPosition, RemoteTransport, TrackRef, Transport,
    TransportKind,
};
