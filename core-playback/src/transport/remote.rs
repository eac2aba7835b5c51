//! Remote device transport.
//!
//! Commands a networked playback device through a Web-API style player
//! endpoint. The device handle comes from the host's [`DeviceHost`] once the
//! device announces readiness; every command is addressed to that handle.

use super::{ConnectStatus, PlaybackPosition, TrackRef, Transport, TransportKind};
use crate::error::{Command, PlaybackError, Result};
use async_trait::async_trait;
use bridge_traits::{
    AccessTokenProvider, DeviceHost, HttpClient, HttpMethod, HttpRequest, HttpResponse,
};
use core_async::sync::Mutex as AsyncMutex;
use core_async::time::timeout;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Per-request HTTP timeout for player commands.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Serialize)]
struct PlayBody<'a> {
    uris: [&'a str; 1],
    position_ms: u64,
}

#[derive(Deserialize)]
struct PlayerStateBody {
    #[serde(default)]
    is_playing: bool,
    progress_ms: Option<u64>,
    device: Option<DeviceBody>,
}

#[derive(Deserialize)]
struct DeviceBody {
    id: Option<String>,
}

/// Transport for a remote, HTTP-commanded playback device.
pub struct RemoteTransport {
    http: Arc<dyn HttpClient>,
    tokens: Arc<dyn AccessTokenProvider>,
    device_host: Arc<dyn DeviceHost>,
    base_url: String,
    ready_timeout: Duration,
    device_id: Mutex<Option<String>>,
    connecting: AsyncMutex<()>,
}

impl RemoteTransport {
    pub fn new(
        http: Arc<dyn HttpClient>,
        tokens: Arc<dyn AccessTokenProvider>,
        device_host: Arc<dyn DeviceHost>,
        base_url: impl Into<String>,
        ready_timeout: Duration,
    ) -> Self {
        Self {
            http,
            tokens,
            device_host,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ready_timeout,
            device_id: Mutex::new(None),
            connecting: AsyncMutex::new(()),
        }
    }

    /// Handle of the connected device, if any.
    pub fn device_id(&self) -> Option<String> {
        self.device_id.lock().clone()
    }

    /// Forget the device so the next `connect` performs a new handshake.
    pub fn disconnect(&self) {
        if self.device_id.lock().take().is_some() {
            info!("Remote device handle cleared");
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/me/player{}", self.base_url, path)
    }

    fn require_device(&self) -> Result<String> {
        self.device_id()
            .ok_or_else(|| PlaybackError::TransportUnavailable("remote device not connected".into()))
    }

    async fn authorize(&self, request: HttpRequest) -> Result<HttpRequest> {
        let token = self.tokens.access_token().await.ok_or_else(|| {
            PlaybackError::TransportUnavailable("no access token available".to_string())
        })?;
        Ok(request.bearer_token(token).timeout(COMMAND_TIMEOUT))
    }

    /// Execute a player command and classify the response.
    async fn send(&self, command: Command, request: HttpRequest) -> Result<HttpResponse> {
        let request = self.authorize(request).await?;
        let response = self
            .http
            .execute(request)
            .await
            .map_err(|e| PlaybackError::from_bridge(command, e))?;

        if response.is_success() {
            return Ok(response);
        }

        match response.status {
            401 => {
                warn!(%command, "Remote player rejected credentials");
                self.disconnect();
                Err(PlaybackError::command(command, "unauthorized (401)", false))
            }
            // Spotify answers 403 when pausing an already paused player.
            403 if command == Command::Pause => Ok(response),
            // A freshly announced device can take a moment to register.
            404 => Err(PlaybackError::command(command, "device not found (404)", true)),
            status => Err(PlaybackError::command(
                command,
                format!("unexpected status {}", status),
                response.is_retryable(),
            )),
        }
    }
}

#[async_trait]
impl Transport for RemoteTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Remote
    }

    #[instrument(skip(self), name = "remote_connect")]
    async fn connect(&self) -> ConnectStatus {
        if self.device_id().is_some() {
            return ConnectStatus::Ready;
        }

        let _guard = self.connecting.lock().await;
        if self.device_id().is_some() {
            return ConnectStatus::Ready;
        }

        let Some(token) = self.tokens.access_token().await else {
            warn!("No access token; remote playback unavailable");
            return ConnectStatus::Unavailable;
        };

        match timeout(self.ready_timeout, self.device_host.launch(&token)).await {
            Ok(Ok(ready)) => {
                info!(
                    device_id = %ready.device_id,
                    name = ready.name.as_deref().unwrap_or("unknown"),
                    "Remote device ready"
                );
                *self.device_id.lock() = Some(ready.device_id);
                ConnectStatus::Ready
            }
            Ok(Err(err)) => {
                warn!(error = %err, "Remote device launch failed");
                ConnectStatus::Unavailable
            }
            Err(_) => {
                warn!(timeout_ms = self.ready_timeout.as_millis() as u64, "Remote device never became ready");
                ConnectStatus::ReadyTimeout
            }
        }
    }

    async fn seek(&self, position_ms: u64) -> Result<()> {
        let device_id = self.require_device()?;
        let request = HttpRequest::new(HttpMethod::Put, self.endpoint("/seek"))
            .query("position_ms", position_ms)
            .query("device_id", device_id);
        self.send(Command::Seek, request).await?;
        debug!(position_ms, "Remote seek issued");
        Ok(())
    }

    async fn play(&self, track: &TrackRef, position_ms: u64) -> Result<()> {
        let device_id = self.require_device()?;
        let body = PlayBody {
            uris: [track.uri.as_str()],
            position_ms,
        };
        let request = HttpRequest::new(HttpMethod::Put, self.endpoint("/play"))
            .query("device_id", device_id)
            .json(&body)?;
        self.send(Command::Play, request).await?;
        debug!(track = %track.uri, position_ms, "Remote play issued");
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        let device_id = self.require_device()?;
        let request =
            HttpRequest::new(HttpMethod::Put, self.endpoint("/pause")).query("device_id", device_id);
        self.send(Command::Pause, request).await?;
        debug!("Remote pause issued");
        Ok(())
    }

    async fn position(&self) -> Option<PlaybackPosition> {
        let device_id = self.device_id()?;
        let request = self
            .authorize(HttpRequest::new(HttpMethod::Get, self.endpoint("")))
            .await
            .ok()?;

        let response = match self.http.execute(request).await {
            Ok(response) => response,
            Err(err) => {
                debug!(error = %err, "Position poll failed");
                return None;
            }
        };

        if response.status == 204 || !response.is_success() {
            if response.status == 401 {
                self.disconnect();
            }
            return None;
        }

        let state: PlayerStateBody = match response.json() {
            Ok(state) => state,
            Err(err) => {
                debug!(error = %err, "Unreadable player state");
                return None;
            }
        };

        let active_device = state.device.and_then(|d| d.id);
        if active_device.as_deref() != Some(device_id.as_str()) {
            debug!(
                active = active_device.as_deref().unwrap_or("none"),
                "Player state belongs to another device"
            );
            return None;
        }

        state
            .progress_ms
            .map(|position_ms| PlaybackPosition::new(position_ms, state.is_playing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::{BridgeError, DeviceReady, StaticTokenProvider};
    use mockall::mock;
    use mockall::predicate::*;

    mock! {
        pub Http {}

        #[async_trait]
        impl HttpClient for Http {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        }
    }

    mock! {
        pub Host {}

        #[async_trait]
        impl DeviceHost for Host {
            async fn launch(&self, access_token: &str) -> BridgeResult<DeviceReady>;
        }
    }

    const BASE: &str = "https://api.example.com/v1";

    fn ready_host() -> MockHost {
        let mut host = MockHost::new();
        host.expect_launch()
            .with(eq("token-1"))
            .times(1)
            .returning(|_| Ok(DeviceReady::new("dev-1")));
        host
    }

    fn transport(http: MockHttp, host: MockHost) -> RemoteTransport {
        RemoteTransport::new(
            Arc::new(http),
            Arc::new(StaticTokenProvider::new("token-1")),
            Arc::new(host),
            BASE,
            Duration::from_secs(10),
        )
    }

    #[tokio::test]
    async fn connect_is_idempotent() {
        let remote = transport(MockHttp::new(), ready_host());

        assert_eq!(remote.connect().await, ConnectStatus::Ready);
        assert_eq!(remote.connect().await, ConnectStatus::Ready);
        assert_eq!(remote.device_id().as_deref(), Some("dev-1"));
    }

    #[tokio::test]
    async fn connect_without_token_is_unavailable() {
        let remote = RemoteTransport::new(
            Arc::new(MockHttp::new()),
            Arc::new(StaticTokenProvider::signed_out()),
            Arc::new(MockHost::new()),
            BASE,
            Duration::from_secs(10),
        );

        assert_eq!(remote.connect().await, ConnectStatus::Unavailable);
    }

    #[tokio::test]
    async fn connect_launch_failure_is_unavailable() {
        let mut host = MockHost::new();
        host.expect_launch()
            .returning(|_| Err(BridgeError::NotAvailable("sdk blocked".into())));
        let remote = transport(MockHttp::new(), host);

        assert_eq!(remote.connect().await, ConnectStatus::Unavailable);
        assert!(remote.device_id().is_none());
    }

    #[tokio::test]
    async fn seek_targets_device_with_bearer_token() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .withf(|req| {
                req.method == HttpMethod::Put
                    && req.url == "https://api.example.com/v1/me/player/seek"
                    && req.query_value("position_ms") == Some("10000")
                    && req.query_value("device_id") == Some("dev-1")
                    && req.headers.get("Authorization").map(String::as_str)
                        == Some("Bearer token-1")
            })
            .times(1)
            .returning(|_| Ok(HttpResponse::new(204, Vec::new())));

        let remote = transport(http, ready_host());
        remote.connect().await;
        remote.seek(10_000).await.unwrap();
    }

    #[tokio::test]
    async fn play_sends_uri_and_offset() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .withf(|req| {
                let body: serde_json::Value =
                    serde_json::from_slice(req.body.as_deref().unwrap_or_default()).unwrap();
                req.url.ends_with("/me/player/play")
                    && body["uris"][0] == "spotify:track:abc"
                    && body["position_ms"] == 30_000
            })
            .times(1)
            .returning(|_| Ok(HttpResponse::new(204, Vec::new())));

        let remote = transport(http, ready_host());
        remote.connect().await;
        remote
            .play(&TrackRef::new("spotify:track:abc"), 30_000)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn commands_before_connect_are_unavailable() {
        let remote = transport(MockHttp::new(), MockHost::new());
        let err = remote.seek(0).await.unwrap_err();
        assert!(matches!(err, PlaybackError::TransportUnavailable(_)));
    }

    #[tokio::test]
    async fn unauthorized_clears_device_handle() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .returning(|_| Ok(HttpResponse::new(401, Vec::new())));

        let remote = transport(http, ready_host());
        remote.connect().await;

        let err = remote.seek(5).await.unwrap_err();
        assert!(!err.is_transient());
        assert!(remote.device_id().is_none());
    }

    #[tokio::test]
    async fn server_errors_are_retryable() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .returning(|_| Ok(HttpResponse::new(503, Vec::new())));

        let remote = transport(http, ready_host());
        remote.connect().await;

        let err = remote.seek(5).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn pause_when_already_paused_succeeds() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .returning(|_| Ok(HttpResponse::new(403, Vec::new())));

        let remote = transport(http, ready_host());
        remote.connect().await;
        assert!(remote.pause().await.is_ok());
    }

    #[tokio::test]
    async fn position_parses_player_state() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .withf(|req| req.method == HttpMethod::Get && req.url.ends_with("/me/player"))
            .returning(|_| {
                Ok(HttpResponse::new(
                    200,
                    r#"{"is_playing":true,"progress_ms":10042,"device":{"id":"dev-1"}}"#,
                ))
            });

        let remote = transport(http, ready_host());
        remote.connect().await;

        assert_eq!(
            remote.position().await,
            Some(PlaybackPosition::new(10_042, true))
        );
    }

    #[tokio::test]
    async fn position_unavailable_cases() {
        let mut http = MockHttp::new();
        let mut responses = vec![
            HttpResponse::new(204, Vec::new()),
            HttpResponse::new(
                200,
                r#"{"is_playing":true,"progress_ms":5,"device":{"id":"other"}}"#,
            ),
            HttpResponse::new(200, "not json"),
        ]
        .into_iter();
        http.expect_execute()
            .times(3)
            .returning(move |_| Ok(responses.next().unwrap()));

        let remote = transport(http, ready_host());
        remote.connect().await;

        assert_eq!(remote.position().await, None);
        assert_eq!(remote.position().await, None);
        assert_eq!(remote.position().await, None);
    }
}
