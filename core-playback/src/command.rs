//! Bounded retries for transport commands.

use crate::error::{Command, PlaybackError, Result};
use core_async::poll::{poll_until, PollOutcome, PollSchedule, PollStep};
use parking_lot::Mutex;
use std::future::Future;
use tracing::{debug, warn};

/// Run `op` until it succeeds, fails permanently, or `schedule` runs out.
///
/// Only transient failures are retried. `is_current` is consulted before
/// every attempt; once it returns `false` no further attempt is made and the
/// result is [`PlaybackError::AbortedBySupersession`] for `request`.
pub(crate) async fn retry_command<F, Fut, C>(
    command: Command,
    request: u64,
    schedule: PollSchedule,
    is_current: C,
    mut op: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
    C: Fn() -> bool,
{
    let last_error: Mutex<Option<PlaybackError>> = Mutex::new(None);
    let last_error_ref = &last_error;

    let outcome = poll_until(schedule, move |attempt| {
        let attempt_fut = is_current().then(|| op());
        async move {
            let Some(attempt_fut) = attempt_fut else {
                return PollStep::Abort;
            };
            match attempt_fut.await {
                Ok(()) => PollStep::Ready(Ok(())),
                Err(err) if err.is_transient() => {
                    debug!(%command, attempt, error = %err, "Command failed, will retry");
                    *last_error_ref.lock() = Some(err);
                    PollStep::Pending
                }
                Err(err) => PollStep::Ready(Err(err)),
            }
        }
    })
    .await;

    match outcome {
        PollOutcome::Ready(result) => result,
        PollOutcome::Aborted => Err(PlaybackError::AbortedBySupersession(request)),
        PollOutcome::Exhausted { attempts } => {
            let err = last_error.lock().take().unwrap_or_else(|| {
                PlaybackError::command(command, "retry budget exhausted", false)
            });
            warn!(%command, attempts, error = %err, "Command retry budget exhausted");
            Err(match err {
                PlaybackError::CommandFailed { message, .. } => {
                    PlaybackError::command(command, message, false)
                }
                other => other,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_async::time::{Duration, Instant};
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    fn schedule() -> PollSchedule {
        PollSchedule::bounded(Duration::from_millis(250), 3)
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result = retry_command(Command::Seek, 1, schedule(), || true, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(PlaybackError::command(Command::Seek, "timeout", true))
                } else {
                    Ok(())
                }
            }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failure_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result = retry_command(Command::Play, 1, schedule(), || true, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(PlaybackError::command(Command::Play, "bad request", false)) }
        })
        .await;

        assert!(matches!(result, Err(PlaybackError::CommandFailed { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_surfaces_command_failed() {
        let result = retry_command(Command::Seek, 1, schedule(), || true, || async {
            Err(PlaybackError::command(Command::Seek, "503", true))
        })
        .await;

        let err = result.unwrap_err();
        assert!(matches!(
            err,
            PlaybackError::CommandFailed {
                command: Command::Seek,
                ..
            }
        ));
        assert!(!err.is_transient());
    }

    #[tokio::test(start_paused = true)]
    async fn stops_retrying_once_superseded() {
        let current = AtomicBool::new(true);
        let calls = AtomicU32::new(0);

        let result = retry_command(
            Command::Seek,
            7,
            schedule(),
            || current.load(Ordering::SeqCst),
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                current.store(false, Ordering::SeqCst);
                async { Err(PlaybackError::command(Command::Seek, "timeout", true)) }
            },
        )
        .await;

        assert!(matches!(result, Err(PlaybackError::AbortedBySupersession(7))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
