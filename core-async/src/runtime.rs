//! Runtime utilities that abstract over the underlying async executor.

use std::io;

pub use tokio::runtime::{Builder, Handle, Runtime};

/// Drive `future` to completion on a throwaway current-thread runtime.
///
/// Intended for synchronous call sites that have no ambient runtime (for
/// example a logging layer invoked from a plain thread).
pub fn block_on<F>(future: F) -> io::Result<F::Output>
where
    F: std::future::Future,
{
    let runtime = Builder::new_current_thread().enable_all().build()?;
    Ok(runtime.block_on(future))
}
