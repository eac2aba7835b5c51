//! Synchronization primitives.
//!
//! Async-aware primitives from Tokio. Short critical sections that never
//! cross an `.await` should prefer a blocking lock (`parking_lot`) instead.

pub use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex, MutexGuard, Notify, RwLock};
