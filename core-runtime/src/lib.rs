//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the snippet playback core:
//! - Logging and tracing setup, with optional host log forwarding
//! - Host capability configuration (`CoreConfig`)
//! - The shared event vocabulary and broadcast event bus
//!
//! ## Overview
//!
//! Nothing in this crate knows how a snippet is played. It establishes the
//! logging conventions, the bridge wiring and the event types that
//! `core-playback` and `core-service` build on.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
