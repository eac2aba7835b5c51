//! # Host Bridge Traits
//!
//! Capabilities the snippet engine needs from its host but cannot provide
//! itself.
//!
//! ## Traits
//!
//! ### Networking
//! - [`HttpClient`](http::HttpClient) - Async HTTP used to command the remote playback device
//!
//! ### Credentials
//! - [`AccessTokenProvider`](auth::AccessTokenProvider) - Supplies the bearer token; refreshing
//!   it is the host auth module's job
//!
//! ### Playback surfaces
//! - [`DeviceHost`](device::DeviceHost) - Instantiates the remote playback device and reports
//!   its readiness handle
//! - [`MediaElement`](device::MediaElement) - The in-process audio resource used by the local
//!   fallback transport
//!
//! ### Diagnostics
//! - [`LoggerSink`](log_sink::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! Every trait reports failures as [`BridgeError`](error::BridgeError). Implementations
//! should map platform errors onto the closest variant so the core can tell
//! transient failures (`Network`, `Timeout`) from permanent ones.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so implementations can be shared
//! across the engine's spawned timer tasks behind an `Arc`.

pub mod auth;
pub mod device;
pub mod error;
pub mod http;
pub mod log_sink;

pub use error::BridgeError;

pub use auth::{AccessTokenProvider, StaticTokenProvider};
pub use device::{DeviceHost, DeviceReady, MediaElement};
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
pub use log_sink::{LogEntry, LogLevel, LoggerSink};
