//! Runtime abstraction layer for the snippet playback core.
//!
//! All `core-*` crates depend on this crate instead of reaching for Tokio
//! directly, so the executor choice lives in exactly one place.
//!
//! # Modules
//!
//! - `task`: Task spawning and abort handles
//! - `time`: Sleep, intervals, timeouts and the monotonic `Instant`
//! - `sync`: Async-aware synchronization primitives and channels
//! - `runtime`: Handle access and `block_on` for sync contexts
//! - `poll`: Bounded `poll_until` loop shared by every polling call site
//!
//! # Examples
//!
//! ```rust
//! use core_async::poll::{poll_until, PollSchedule, PollStep};
//! use core_async::time::Duration;
//!
//! # async fn example() {
//! let outcome = poll_until(
//!     PollSchedule::bounded(Duration::from_millis(50), 40),
//!     |attempt| async move {
//!         if attempt == 3 {
//!             PollStep::Ready(attempt)
//!         } else {
//!             PollStep::Pending
//!         }
//!     },
//! )
//! .await;
//! assert!(outcome.is_ready());
//! # }
//! ```

pub mod poll;
pub mod runtime;
pub mod sync;
pub mod task;
pub mod time;

pub use poll::{poll_until, PollOutcome, PollSchedule, PollStep};
pub use task::spawn;
pub use time::{sleep, Duration, Instant};
