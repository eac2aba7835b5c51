//! # Snippet Engine
//!
//! Plays bounded windows of tracks: "play `duration_ms` of this track
//! starting at `start_offset_ms`". Exactly one request is active at a time;
//! a newer request supersedes the older one at the moment it is issued.
//!
//! ## Lifecycle
//!
//! 1. `play_snippet` mints a request id, cancels whatever was active and
//!    spawns a driver task for the new request.
//! 2. The driver selects a transport (primary first, local fallback when
//!    the primary cannot connect), issues `play` then `seek`, and polls
//!    until the seek is confirmed.
//! 3. The confirmation instant becomes the timing origin; `start` is
//!    emitted and the progress and correction loops begin.
//! 4. When the window is over `end` is emitted and the transport is
//!    paused on a detached task, so pause latency never delays `end`. The
//!    next request waits for that pause before issuing its own commands.
//!
//! ## Concurrency
//!
//! Every "check the request is current, mutate state, emit" sequence runs
//! under the reentrant turn lock, so subscribers may call back into the
//! engine (`replay()` from an `end` handler) from the emitting thread. The
//! turn lock is never held across an `.await`.

use crate::arbiter::{Arbiter, PlaybackRequest, RequestId};
use crate::channel::{EventChannel, Subscription};
use crate::command::retry_command;
use crate::config::{millis, SnippetConfig};
use crate::confirm::{confirm_seek, ConfirmRequest};
use crate::error::{Command, PlaybackError, Result};
use crate::state::{PlayerState, PlayerStatus};
use crate::timing::{correction_loop, progress_loop, EndReason};
use crate::transport::{ConnectStatus, TrackRef, Transport, TransportKind};
use core_async::task::{spawn, AbortHandle};
use core_async::time::Instant;
use core_runtime::events::{
    CoreEvent, ErrorKind, EventBus, EventKind, SnippetEvent, TransportEvent,
};
use futures::future::{self, BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, ReentrantMutex};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};

/// How a `play_snippet` or `replay` call resolved without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnippetOutcome {
    /// The full window played and `end` was emitted.
    Completed,
    /// A newer request took over before this one finished.
    Superseded,
    /// `stop()` cancelled the request.
    Stopped,
    /// A `replay()` arrived inside the debounce window and was ignored.
    Debounced,
}

pub type SnippetFuture = BoxFuture<'static, Result<SnippetOutcome>>;

/// A pause running on a detached task.
type Settling = Shared<BoxFuture<'static, ()>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Primary,
    Fallback,
}

#[derive(Debug, Clone)]
struct ReplayParams {
    track: TrackRef,
    start_offset_ms: u64,
    duration_ms: u64,
}

pub(crate) struct EngineInner {
    pub(crate) config: SnippetConfig,
    pub(crate) turn: ReentrantMutex<()>,
    pub(crate) state: Mutex<PlayerState>,
    pub(crate) arbiter: Arbiter,
    pub(crate) channel: EventChannel,
    primary: Option<Arc<dyn Transport>>,
    fallback: Option<Arc<dyn Transport>>,
    /// Sticky once the fallback has been chosen.
    selected: Mutex<Option<Slot>>,
    /// Transport the active request has issued commands on.
    engaged: Mutex<Option<Arc<dyn Transport>>>,
    progress_task: Mutex<Option<AbortHandle>>,
    /// Most recent detached pause.
    settling: Mutex<Option<Settling>>,
    last_request: Mutex<Option<ReplayParams>>,
    last_replay: Mutex<Option<Instant>>,
}

/// Builder for [`SnippetEngine`].
#[derive(Default)]
pub struct SnippetEngineBuilder {
    config: SnippetConfig,
    primary: Option<Arc<dyn Transport>>,
    fallback: Option<Arc<dyn Transport>>,
    bus: Option<EventBus>,
}

impl SnippetEngineBuilder {
    pub fn config(mut self, config: SnippetConfig) -> Self {
        self.config = config;
        self
    }

    /// Transport tried first for every request (usually the remote device).
    pub fn primary(mut self, transport: Arc<dyn Transport>) -> Self {
        self.primary = Some(transport);
        self
    }

    /// Transport used when the primary cannot connect.
    pub fn fallback(mut self, transport: Arc<dyn Transport>) -> Self {
        self.fallback = Some(transport);
        self
    }

    /// Mirror lifecycle events onto a broadcast bus.
    pub fn event_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn build(self) -> Result<SnippetEngine> {
        self.config.validate()?;
        if self.primary.is_none() && self.fallback.is_none() {
            return Err(PlaybackError::Config(
                "at least one transport must be configured".to_string(),
            ));
        }

        let channel = match self.bus {
            Some(bus) => EventChannel::new().with_bus(bus),
            None => EventChannel::new(),
        };

        info!(
            primary = ?self.primary.as_ref().map(|t| t.kind()),
            fallback = ?self.fallback.as_ref().map(|t| t.kind()),
            policy = ?self.config.confirmation_policy,
            "Snippet engine ready"
        );

        Ok(SnippetEngine {
            inner: Arc::new(EngineInner {
                config: self.config,
                turn: ReentrantMutex::new(()),
                state: Mutex::new(PlayerState::default()),
                arbiter: Arbiter::new(),
                channel,
                primary: self.primary,
                fallback: self.fallback,
                selected: Mutex::new(None),
                engaged: Mutex::new(None),
                progress_task: Mutex::new(None),
                settling: Mutex::new(None),
                last_request: Mutex::new(None),
                last_replay: Mutex::new(None),
            }),
        })
    }
}

/// Cheap to clone; every clone drives the same player.
#[derive(Clone)]
pub struct SnippetEngine {
    inner: Arc<EngineInner>,
}

impl fmt::Debug for SnippetEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnippetEngine")
            .field("state", &*self.inner.state.lock())
            .field("channel", &self.inner.channel)
            .finish()
    }
}

impl SnippetEngine {
    pub fn builder() -> SnippetEngineBuilder {
        SnippetEngineBuilder::default()
    }

    pub fn config(&self) -> &SnippetConfig {
        &self.inner.config
    }

    /// Copy of the current player state.
    pub fn snapshot(&self) -> PlayerState {
        self.inner.state.lock().clone()
    }

    pub fn event_bus(&self) -> Option<EventBus> {
        self.inner.channel.bus().cloned()
    }

    /// Transport kind new requests will try first.
    pub fn preferred_transport(&self) -> Option<TransportKind> {
        let slot = *self.inner.selected.lock();
        match slot {
            Some(Slot::Fallback) => self.inner.fallback.as_ref().map(|t| t.kind()),
            _ => self
                .inner
                .primary
                .as_ref()
                .or(self.inner.fallback.as_ref())
                .map(|t| t.kind()),
        }
    }

    /// Forget a sticky fallback selection so the next request tries the
    /// primary transport again.
    pub fn reset_transport(&self) {
        if self.inner.selected.lock().take().is_some() {
            info!("Transport selection reset");
        }
    }

    pub fn subscribe<F>(&self, kind: EventKind, callback: F) -> Subscription
    where
        F: Fn(&SnippetEvent) + Send + Sync + 'static,
    {
        self.inner.channel.subscribe(kind, callback)
    }

    /// Called with the window duration once the seek is confirmed.
    pub fn on_start<F>(&self, callback: F) -> Subscription
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        self.subscribe(EventKind::Start, move |event| {
            if let SnippetEvent::Start { duration_ms } = event {
                callback(*duration_ms);
            }
        })
    }

    /// Called with the elapsed milliseconds on every progress tick.
    pub fn on_progress<F>(&self, callback: F) -> Subscription
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        self.subscribe(EventKind::Progress, move |event| {
            if let SnippetEvent::Progress { elapsed_ms } = event {
                callback(*elapsed_ms);
            }
        })
    }

    pub fn on_end<F>(&self, callback: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.subscribe(EventKind::End, move |_| callback())
    }

    pub fn on_error<F>(&self, callback: F) -> Subscription
    where
        F: Fn(ErrorKind) + Send + Sync + 'static,
    {
        self.subscribe(EventKind::Error, move |event| {
            if let SnippetEvent::Error { kind } = event {
                callback(*kind);
            }
        })
    }

    /// Play `duration_ms` of `track` starting at `start_offset_ms`.
    ///
    /// The request supersedes any active one as soon as this returns; the
    /// returned future does not need to be polled for playback to proceed.
    /// It resolves once the request completes, is superseded or stopped,
    /// or fails.
    pub fn play_snippet(
        &self,
        track: TrackRef,
        start_offset_ms: u64,
        duration_ms: u64,
    ) -> SnippetFuture {
        if duration_ms == 0 {
            return future::ready(Err(PlaybackError::InvalidRequest(
                "snippet duration must be positive".to_string(),
            )))
            .boxed();
        }

        let (request, settling) = self.inner.begin_request(track, start_offset_ms, duration_ms);
        let span = info_span!("snippet", request_id = request.id.get());
        let inner = Arc::clone(&self.inner);
        let handle = spawn(async move { inner.drive(request, settling).await }.instrument(span));

        async move {
            match handle.await {
                Ok(result) => result,
                Err(err) => Err(PlaybackError::Internal(format!("snippet task failed: {err}"))),
            }
        }
        .boxed()
    }

    /// Play the most recent request's window again.
    ///
    /// Calls arriving within `replay_debounce` of the previous replay
    /// resolve to [`SnippetOutcome::Debounced`] without touching playback.
    pub fn replay(&self) -> SnippetFuture {
        let params = {
            let _turn = self.inner.turn.lock();
            let Some(params) = self.inner.last_request.lock().clone() else {
                return future::ready(Err(PlaybackError::NothingToReplay)).boxed();
            };

            let now = Instant::now();
            let mut last_replay = self.inner.last_replay.lock();
            if let Some(previous) = *last_replay {
                if now.duration_since(previous) < self.inner.config.replay_debounce {
                    debug!("Replay debounced");
                    return future::ready(Ok(SnippetOutcome::Debounced)).boxed();
                }
            }
            *last_replay = Some(now);
            params
        };

        self.play_snippet(params.track, params.start_offset_ms, params.duration_ms)
    }

    /// Cancel the active request and pause its transport.
    ///
    /// The cancellation is synchronous: by the time this returns the state
    /// is `idle`, progress is 0 and no further events will be emitted for
    /// the cancelled request. The returned future resolves once the pause
    /// command has been attempted. Stopping while idle is a no-op.
    pub fn stop(&self) -> BoxFuture<'static, Result<()>> {
        match self.inner.cancel_active() {
            Some(settling) => settling.map(Ok::<(), PlaybackError>).boxed(),
            None => future::ready(Ok(())).boxed(),
        }
    }
}

impl EngineInner {
    /// Mint a request for the window and make it current. Returns it along
    /// with any pause still in flight, which must settle before the new
    /// request issues commands.
    fn begin_request(
        &self,
        track: TrackRef,
        start_offset_ms: u64,
        duration_ms: u64,
    ) -> (PlaybackRequest, Option<Settling>) {
        let _turn = self.turn.lock();
        let (id, previous) = self.arbiter.mint();

        let displaced = previous.and_then(|previous| {
            info!(superseded = previous.get(), request_id = id.get(), "Superseding request");
            self.clear_timers();
            self.engaged.lock().take()
        });
        if let Some(transport) = displaced {
            self.settle(async move {
                if let Err(err) = transport.pause().await {
                    debug!(error = %err, "Pausing superseded playback failed");
                }
            });
        }
        let settling = self
            .settling
            .lock()
            .clone()
            .filter(|settling| settling.peek().is_none());

        self.state.lock().begin(id, duration_ms);
        *self.last_request.lock() = Some(ReplayParams {
            track: track.clone(),
            start_offset_ms,
            duration_ms,
        });

        info!(
            request_id = id.get(),
            uri = %track.uri,
            start_offset_ms,
            duration_ms,
            "Snippet requested"
        );

        let request = PlaybackRequest {
            id,
            track,
            start_offset_ms,
            duration_ms,
            created_at: Instant::now(),
        };
        (request, settling)
    }

    /// Cancel whatever is active. Returns the pause of its transport, if it
    /// had engaged one.
    fn cancel_active(&self) -> Option<Settling> {
        let _turn = self.turn.lock();
        let cancelled = self.arbiter.cancel()?;
        info!(request_id = cancelled.get(), "Snippet stopped");
        self.clear_timers();
        self.state.lock().reset();
        let engaged = self.engaged.lock().take()?;
        Some(self.settle(async move {
            if let Err(err) = engaged.pause().await {
                warn!(error = %err, "Pause after stop failed");
            }
        }))
    }

    fn clear_timers(&self) {
        if let Some(handle) = self.progress_task.lock().take() {
            handle.abort();
        }
    }

    /// Run `pause` on a detached task and record it as the pause the next
    /// request waits for.
    fn settle<F>(&self, pause: F) -> Settling
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = spawn(pause.in_current_span());
        let settling = async move {
            if let Err(err) = handle.await {
                warn!(error = %err, "Pause task failed");
            }
        }
        .boxed()
        .shared();
        *self.settling.lock() = Some(settling.clone());
        settling
    }

    /// Pause issued once the window is over. The first attempt always goes
    /// out; retries stop once a newer request exists.
    fn pause_at_end(
        self: &Arc<Self>,
        id: RequestId,
        transport: Arc<dyn Transport>,
    ) -> BoxFuture<'static, ()> {
        let inner = Arc::clone(self);
        let schedule = self.config.command_schedule();
        async move {
            let attempted = AtomicBool::new(false);
            let paused = retry_command(
                Command::Pause,
                id.get(),
                schedule,
                || !attempted.swap(true, Ordering::SeqCst) || !inner.arbiter.is_superseded(id),
                || transport.pause(),
            )
            .await;
            match paused {
                Ok(()) => {}
                Err(err) if err.is_supersession() => debug!("End-of-window pause abandoned"),
                Err(err) => warn!(error = %err, "Pause at end of snippet failed"),
            }
        }
        .boxed()
    }

    fn ensure_current(&self, id: RequestId) -> Result<()> {
        if self.arbiter.is_current(id) {
            Ok(())
        } else {
            Err(PlaybackError::AbortedBySupersession(id.get()))
        }
    }

    fn stale_outcome(&self, id: RequestId) -> SnippetOutcome {
        if self.arbiter.is_superseded(id) {
            SnippetOutcome::Superseded
        } else {
            SnippetOutcome::Stopped
        }
    }

    async fn drive(
        self: Arc<Self>,
        request: PlaybackRequest,
        settling: Option<Settling>,
    ) -> Result<SnippetOutcome> {
        let id = request.id;

        if let Some(settling) = settling {
            settling.await;
        }

        match self.run(&request).await {
            Ok(outcome) => Ok(outcome),
            Err(err) if err.is_supersession() => {
                let outcome = self.stale_outcome(id);
                debug!(?outcome, "Request went stale");
                Ok(outcome)
            }
            Err(err) => {
                if self.fail(id, &err).await {
                    Err(err)
                } else {
                    Ok(self.stale_outcome(id))
                }
            }
        }
    }

    async fn run(self: &Arc<Self>, request: &PlaybackRequest) -> Result<SnippetOutcome> {
        let id = request.id;
        let transport = self.select_transport(request).await?;

        {
            let _turn = self.turn.lock();
            self.ensure_current(id)?;
            let mut state = self.state.lock();
            state.transport = Some(transport.kind());
            state.transition(PlayerStatus::Confirming);
            *self.engaged.lock() = Some(Arc::clone(&transport));
        }

        let is_current = || self.arbiter.is_current(id);
        let schedule = self.config.command_schedule();
        retry_command(Command::Play, id.get(), schedule, is_current, || {
            transport.play(&request.track, request.start_offset_ms)
        })
        .await?;
        retry_command(Command::Seek, id.get(), schedule, is_current, || {
            transport.seek(request.start_offset_ms)
        })
        .await?;

        let confirmation = confirm_seek(
            transport.as_ref(),
            ConfirmRequest {
                id,
                target_ms: request.start_offset_ms,
                tolerance_ms: self.config.seek_tolerance_ms(transport.kind()),
                schedule: self.config.confirm_schedule(),
                policy: self.config.confirmation_policy,
            },
            is_current,
        )
        .await?;

        {
            let _turn = self.turn.lock();
            self.ensure_current(id)?;
            {
                let mut state = self.state.lock();
                state.origin = Some(confirmation.origin);
                state.transition(PlayerStatus::Playing);
            }
            info!(
                quality = ?confirmation.quality,
                position_ms = confirmation.position_ms,
                latency_ms = millis(request.created_at.elapsed()),
                "Snippet started"
            );
            self.channel.emit(
                id,
                SnippetEvent::Start {
                    duration_ms: request.duration_ms,
                },
            );
            // A start subscriber may already have replaced this request.
            if self.arbiter.is_current(id) {
                let handle = spawn(progress_loop(Arc::clone(self), id).in_current_span());
                *self.progress_task.lock() = Some(handle.abort_handle());
            }
        }

        let Some(reason) = correction_loop(self, transport.as_ref(), request).await else {
            return Err(PlaybackError::AbortedBySupersession(id.get()));
        };
        self.finish(request, reason).await
    }

    /// Emit the final progress and `end` as soon as the window is over,
    /// then wait for the detached pause.
    async fn finish(
        self: &Arc<Self>,
        request: &PlaybackRequest,
        reason: EndReason,
    ) -> Result<SnippetOutcome> {
        let id = request.id;
        let settling = {
            let _turn = self.turn.lock();
            self.ensure_current(id)?;
            self.clear_timers();
            let progress = {
                let mut state = self.state.lock();
                state.transition(PlayerStatus::Ended);
                state.origin = None;
                state.active_request_id = None;
                state.advance_progress(request.duration_ms)
            };
            let settling = self
                .engaged
                .lock()
                .take()
                .map(|transport| self.settle(self.pause_at_end(id, transport)));

            self.channel.emit(id, SnippetEvent::Progress { elapsed_ms: progress });
            // A progress subscriber may have started a new request.
            self.ensure_current(id)?;
            self.channel.emit(id, SnippetEvent::End);
            self.arbiter.retire(id);
            info!(?reason, "Snippet ended");
            settling
        };

        if let Some(settling) = settling {
            settling.await;
        }
        Ok(SnippetOutcome::Completed)
    }

    /// Report `err` for the request if it is still current. Returns `false`
    /// when the request went stale first, in which case nothing is emitted.
    async fn fail(&self, id: RequestId, err: &PlaybackError) -> bool {
        let settling = {
            let _turn = self.turn.lock();
            if !self.arbiter.is_current(id) {
                return false;
            }
            warn!(error = %err, kind = ?err.kind(), "Snippet failed");
            self.clear_timers();
            self.state.lock().transition(PlayerStatus::Error);

            if let Some(kind) = err.kind() {
                self.channel.emit(id, SnippetEvent::Error { kind });
            }
            // An error subscriber may have started a new request, which then
            // owns the transport and has already taken it over.
            if !self.arbiter.retire(id) {
                return true;
            }
            self.state.lock().reset();
            self.engaged.lock().take().map(|transport| {
                self.settle(async move {
                    if let Err(err) = transport.pause().await {
                        debug!(error = %err, "Pause after failure failed");
                    }
                })
            })
        };

        if let Some(settling) = settling {
            settling.await;
        }
        true
    }

    fn candidates(&self, track: &TrackRef) -> Vec<(Slot, Arc<dyn Transport>)> {
        let fallback = self
            .fallback
            .as_ref()
            .filter(|_| self.config.fallback_to_local || self.primary.is_none())
            .map(|t| (Slot::Fallback, Arc::clone(t)));

        let sticky = *self.selected.lock() == Some(Slot::Fallback);
        if sticky {
            if let Some((slot, transport)) = &fallback {
                if transport.supports(track) {
                    return vec![(*slot, Arc::clone(transport))];
                }
            }
        }

        self.primary
            .as_ref()
            .map(|t| (Slot::Primary, Arc::clone(t)))
            .into_iter()
            .chain(fallback)
            .collect()
    }

    async fn select_transport(&self, request: &PlaybackRequest) -> Result<Arc<dyn Transport>> {
        let id = request.id;
        let mut failure: Option<(TransportKind, ConnectStatus)> = None;

        for (slot, transport) in self.candidates(&request.track) {
            let kind = transport.kind();
            if !transport.supports(&request.track) {
                debug!(transport = %kind, "Transport cannot play this track");
                continue;
            }

            let status = transport.connect().await;
            self.ensure_current(id)?;

            if !status.is_ready() {
                warn!(transport = %kind, ?status, "Transport did not connect");
                failure.get_or_insert((kind, status));
                continue;
            }

            let previous = self.selected.lock().replace(slot);
            let event = match failure {
                Some((from, status)) => Some(TransportEvent::FellBack {
                    from,
                    to: kind,
                    reason: status
                        .into_error(self.config.device_ready_timeout)
                        .kind()
                        .unwrap_or(ErrorKind::TransportUnavailable),
                }),
                None if previous != Some(slot) => Some(TransportEvent::Selected { transport: kind }),
                None => None,
            };
            if let Some(event) = event {
                info!(transport = %kind, "Transport selected");
                if let Some(bus) = self.channel.bus() {
                    let _ = bus.emit(CoreEvent::Transport(event));
                }
            }
            return Ok(transport);
        }

        Err(match failure {
            Some((_, status)) => status.into_error(self.config.device_ready_timeout),
            None => PlaybackError::TransportUnavailable(format!(
                "no configured transport can play {}",
                request.track.uri
            )),
        })
    }
}
