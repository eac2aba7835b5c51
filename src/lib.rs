//! Workspace facade crate.
//!
//! This crate exposes feature flags that map to the individual workspace
//! crates. Host applications can depend on `snippet-workspace` and enable
//! `desktop-shims` (full bootstrap through `core-service`) or `engine-only`
//! (just the playback engine, bring your own bridges).

#[cfg(feature = "desktop-shims")]
pub use core_service as service;

#[cfg(feature = "engine-only")]
pub use core_playback as playback;
