//! # Desktop Bridge Implementations
//!
//! Default bridge implementations for desktop hosts (macOS, Windows, Linux).
//!
//! - `HttpClient` using `reqwest` with rustls
//!
//! Remote device instantiation and the local media element are UI concerns
//! and stay with the host application.
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::ReqwestHttpClient;
//! use std::sync::Arc;
//!
//! let http = Arc::new(ReqwestHttpClient::new()?);
//! ```

mod http;

pub use http::ReqwestHttpClient;
