//! Playback surfaces provided by the host.
//!
//! Two very different things can make sound for the engine:
//!
//! - a **remote device** that the host instantiates through a vendor SDK and
//!   that only becomes addressable once it announces readiness with a device
//!   handle ([`DeviceHost`]); afterwards it is driven over HTTP;
//! - an in-process **media element** (an `<audio>` tag, a decoder-backed
//!   sink, ...) with immediate seek/play/pause and a readable current time
//!   ([`MediaElement`]).
//!
//! Neither trait knows anything about snippets, requests or timing; the core
//! wraps both behind its own transport abstraction.

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Readiness signal emitted by a remote playback device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceReady {
    /// Handle used to address the device in control requests.
    pub device_id: String,
    /// Display name, when the SDK reports one.
    pub name: Option<String>,
}

impl DeviceReady {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Host capability that instantiates the remote playback device.
///
/// `launch` resolves once the device has announced readiness. It may take
/// arbitrarily long (SDK script loading, user gestures); callers bound the
/// wait themselves.
#[async_trait]
pub trait DeviceHost: Send + Sync {
    /// Create (or reuse) the device using `access_token` and wait for its
    /// ready signal.
    async fn launch(&self, access_token: &str) -> Result<DeviceReady>;

    /// Release the device. Safe to call when nothing was launched.
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

/// In-process decodable audio resource.
///
/// Mirrors the small subset of an HTML media element the local transport
/// needs. Position reads are synchronous; `load` and `play` may suspend while
/// the resource buffers.
#[async_trait]
pub trait MediaElement: Send + Sync {
    /// Point the element at a new source URL. Resets position to zero.
    async fn load(&self, source_url: &str) -> Result<()>;

    /// URL of the currently loaded source.
    fn source(&self) -> Option<String>;

    /// Move the playhead.
    fn set_current_time(&self, position: Duration) -> Result<()>;

    /// Current playhead, or `None` when no source is loaded.
    fn current_time(&self) -> Option<Duration>;

    /// Whether output is currently stopped.
    fn is_paused(&self) -> bool;

    /// Start or resume audible output.
    async fn play(&self) -> Result<()>;

    /// Stop audible output. Idempotent.
    fn pause(&self);
}
