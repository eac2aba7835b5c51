//! # Core Configuration Module
//!
//! Host capability wiring for the snippet playback core.
//!
//! ## Overview
//!
//! The configuration system uses a builder to construct a [`CoreConfig`] that
//! holds every bridge the engine needs. It enforces fail-fast validation so a
//! host learns about a missing capability at startup, not on the first
//! `play_snippet` call.
//!
//! ## Capabilities
//!
//! - `HttpClient`: commands the remote device (desktop default: reqwest)
//! - `AccessTokenProvider` + `DeviceHost`: together enable the remote
//!   transport
//! - `MediaElement`: enables the local transport
//!
//! At least one transport must be fully wired. When both are, the remote
//! transport is primary and the local one is the fallback.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .token_provider(Arc::new(MyTokens))
//!     .device_host(Arc::new(MySdkHost))
//!     .media_element(Arc::new(MyAudioTag))
//!     .build()?;
//! ```
//!
//! ## Error Handling
//!
//! ```should_panic
//! use core_runtime::config::CoreConfig;
//!
//! // No transport can be built from an empty configuration.
//! let config = CoreConfig::builder()
//!     .build()
//!     .expect("Should fail - no playback transport configured");
//! ```

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use bridge_traits::{AccessTokenProvider, DeviceHost, HttpClient, MediaElement};
use std::sync::Arc;

/// Base URL of the remote player control API.
pub const DEFAULT_API_BASE_URL: &str = "https://api.spotify.com/v1";

const MAX_EVENT_BUS_CAPACITY: usize = 65_536;

/// Bridges and settings required to initialize the playback core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// HTTP client used for remote player commands
    pub http_client: Arc<dyn HttpClient>,

    /// Bearer token source for the remote API
    pub token_provider: Option<Arc<dyn AccessTokenProvider>>,

    /// Launches the remote playback device
    pub device_host: Option<Arc<dyn DeviceHost>>,

    /// In-process audio element for local playback
    pub media_element: Option<Arc<dyn MediaElement>>,

    /// Remote API base URL, without trailing slash
    pub api_base_url: String,

    /// Per-subscriber buffer of the broadcast event bus; `0` disables the bus
    pub event_bus_capacity: usize,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("http_client", &"HttpClient { ... }")
            .field(
                "token_provider",
                &self
                    .token_provider
                    .as_ref()
                    .map(|_| "AccessTokenProvider { ... }"),
            )
            .field(
                "device_host",
                &self.device_host.as_ref().map(|_| "DeviceHost { ... }"),
            )
            .field(
                "media_element",
                &self.media_element.as_ref().map(|_| "MediaElement { ... }"),
            )
            .field("api_base_url", &self.api_base_url)
            .field("event_bus_capacity", &self.event_bus_capacity)
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Both remote bridges are present.
    pub fn remote_enabled(&self) -> bool {
        self.token_provider.is_some() && self.device_host.is_some()
    }

    pub fn local_enabled(&self) -> bool {
        self.media_element.is_some()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - at least one transport is fully wired
    /// - the remote bridges are provided together
    /// - the API base URL is an absolute http(s) URL
    /// - the event bus capacity is within bounds
    pub fn validate(&self) -> Result<()> {
        if self.token_provider.is_some() != self.device_host.is_some() {
            let missing = if self.token_provider.is_none() {
                "AccessTokenProvider"
            } else {
                "DeviceHost"
            };
            return Err(Error::CapabilityMissing {
                capability: missing.to_string(),
                message: "Remote playback needs both an AccessTokenProvider and a DeviceHost. \
                          Provide the missing bridge or remove the other one to run local-only."
                    .to_string(),
            });
        }

        if !self.remote_enabled() && !self.local_enabled() {
            return Err(no_transport_error());
        }

        if self.remote_enabled() {
            let url = self.api_base_url.trim();
            if url.is_empty() {
                return Err(Error::Config("API base URL cannot be empty".to_string()));
            }
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(Error::Config(format!(
                    "API base URL must be an absolute http(s) URL, got '{}'",
                    url
                )));
            }
        }

        if self.event_bus_capacity > MAX_EVENT_BUS_CAPACITY {
            return Err(Error::Config(format!(
                "Event bus capacity exceeds maximum of {}",
                MAX_EVENT_BUS_CAPACITY
            )));
        }

        Ok(())
    }
}

fn no_transport_error() -> Error {
    Error::CapabilityMissing {
        capability: "Transport".to_string(),
        message: "No playback transport is configured. \
                  Remote: inject an AccessTokenProvider and a DeviceHost. \
                  Local: inject a MediaElement."
            .to_string(),
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Err(Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "HttpClient implementation is required for remote playback commands. \
                  Desktop: enable the 'desktop-shims' feature to use the default ReqwestHttpClient. \
                  Other hosts: inject a platform HTTP client."
            .to_string(),
    })
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client = ReqwestHttpClient::new()
        .map_err(|e| Error::Internal(format!("Failed to create default HttpClient: {}", e)))?;
    Ok(Arc::new(client))
}

/// Builder for constructing [`CoreConfig`] instances.
pub struct CoreConfigBuilder {
    http_client: Option<Arc<dyn HttpClient>>,
    token_provider: Option<Arc<dyn AccessTokenProvider>>,
    device_host: Option<Arc<dyn DeviceHost>>,
    media_element: Option<Arc<dyn MediaElement>>,
    api_base_url: String,
    event_bus_capacity: usize,
}

impl Default for CoreConfigBuilder {
    fn default() -> Self {
        Self {
            http_client: None,
            token_provider: None,
            device_host: None,
            media_element: None,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            event_bus_capacity: DEFAULT_EVENT_BUFFER_SIZE,
        }
    }
}

impl CoreConfigBuilder {
    /// Sets the HTTP client implementation.
    ///
    /// If not provided, the reqwest-based client is used when the
    /// `desktop-shims` feature is enabled.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn token_provider(mut self, provider: Arc<dyn AccessTokenProvider>) -> Self {
        self.token_provider = Some(provider);
        self
    }

    pub fn device_host(mut self, host: Arc<dyn DeviceHost>) -> Self {
        self.device_host = Some(host);
        self
    }

    pub fn media_element(mut self, element: Arc<dyn MediaElement>) -> Self {
        self.media_element = Some(element);
        self
    }

    /// Overrides the remote API base URL. A trailing slash is removed.
    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Sets the broadcast bus buffer size. `0` disables the bus.
    ///
    /// Default: 256
    pub fn event_bus_capacity(mut self, capacity: usize) -> Self {
        self.event_bus_capacity = capacity;
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// # Errors
    ///
    /// - [`Error::CapabilityMissing`] when no transport can be built, when
    ///   only half of the remote bridges were given, or when no HTTP client
    ///   is available for a remote setup
    /// - [`Error::Config`] for invalid values
    pub fn build(self) -> Result<CoreConfig> {
        let remote_requested = self.token_provider.is_some() || self.device_host.is_some();
        if !remote_requested && self.media_element.is_none() {
            return Err(no_transport_error());
        }

        let http_client = match self.http_client {
            Some(client) => client,
            None if remote_requested => provide_default_http_client()?,
            None => Arc::new(UnusedHttpClient),
        };

        let config = CoreConfig {
            http_client,
            token_provider: self.token_provider,
            device_host: self.device_host,
            media_element: self.media_element,
            api_base_url: self.api_base_url,
            event_bus_capacity: self.event_bus_capacity,
        };

        config.validate()?;

        Ok(config)
    }
}

/// Placeholder for local-only setups, which never issue HTTP requests.
struct UnusedHttpClient;

#[async_trait::async_trait]
impl HttpClient for UnusedHttpClient {
    async fn execute(
        &self,
        request: bridge_traits::HttpRequest,
    ) -> bridge_traits::error::Result<bridge_traits::HttpResponse> {
        Err(bridge_traits::BridgeError::NotAvailable(format!(
            "no HttpClient configured (request to {})",
            request.url
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::{DeviceReady, HttpRequest, HttpResponse, StaticTokenProvider};
    use std::time::Duration;

    struct MockHttpClient;

    #[async_trait]
    impl HttpClient for MockHttpClient {
        async fn execute(&self, _request: HttpRequest) -> BridgeResult<HttpResponse> {
            Ok(HttpResponse::new(204, Vec::new()))
        }
    }

    struct MockDeviceHost;

    #[async_trait]
    impl DeviceHost for MockDeviceHost {
        async fn launch(&self, _access_token: &str) -> BridgeResult<DeviceReady> {
            Ok(DeviceReady::new("dev-1"))
        }
    }

    struct MockMediaElement;

    #[async_trait]
    impl MediaElement for MockMediaElement {
        async fn load(&self, _source_url: &str) -> BridgeResult<()> {
            Ok(())
        }

        fn source(&self) -> Option<String> {
            None
        }

        fn set_current_time(&self, _position: Duration) -> BridgeResult<()> {
            Ok(())
        }

        fn current_time(&self) -> Option<Duration> {
            None
        }

        fn is_paused(&self) -> bool {
            true
        }

        async fn play(&self) -> BridgeResult<()> {
            Ok(())
        }

        fn pause(&self) {}
    }

    fn remote_builder() -> CoreConfigBuilder {
        CoreConfig::builder()
            .http_client(Arc::new(MockHttpClient))
            .token_provider(Arc::new(StaticTokenProvider::new("token")))
            .device_host(Arc::new(MockDeviceHost))
    }

    #[test]
    fn test_builder_remote_and_local() {
        let config = remote_builder()
            .media_element(Arc::new(MockMediaElement))
            .build()
            .expect("config should build");

        assert!(config.remote_enabled());
        assert!(config.local_enabled());
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.event_bus_capacity, DEFAULT_EVENT_BUFFER_SIZE);
    }

    #[test]
    fn test_local_only_needs_no_http_client() {
        let config = CoreConfig::builder()
            .media_element(Arc::new(MockMediaElement))
            .build()
            .expect("local-only config should build");

        assert!(!config.remote_enabled());
        assert!(config.local_enabled());
    }

    #[test]
    fn test_empty_builder_fails_fast() {
        let err = CoreConfig::builder().build().unwrap_err();
        match err {
            Error::CapabilityMissing { capability, .. } => assert_eq!(capability, "Transport"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_half_wired_remote_is_rejected() {
        let err = CoreConfig::builder()
            .http_client(Arc::new(MockHttpClient))
            .token_provider(Arc::new(StaticTokenProvider::new("token")))
            .media_element(Arc::new(MockMediaElement))
            .build()
            .unwrap_err();

        match err {
            Error::CapabilityMissing { capability, message } => {
                assert_eq!(capability, "DeviceHost");
                assert!(message.contains("AccessTokenProvider"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_api_base_url_trailing_slash_trimmed() {
        let config = remote_builder()
            .api_base_url("http://localhost:8080/v1/")
            .build()
            .unwrap();
        assert_eq!(config.api_base_url, "http://localhost:8080/v1");
    }

    #[test]
    fn test_invalid_api_base_url() {
        let err = remote_builder().api_base_url("localhost/v1").build().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_event_bus_capacity_bounds() {
        let err = remote_builder()
            .event_bus_capacity(MAX_EVENT_BUS_CAPACITY + 1)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let disabled = remote_builder().event_bus_capacity(0).build().unwrap();
        assert_eq!(disabled.event_bus_capacity, 0);
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_remote_without_http_client_requires_shims() {
        let err = CoreConfig::builder()
            .token_provider(Arc::new(StaticTokenProvider::new("token")))
            .device_host(Arc::new(MockDeviceHost))
            .build()
            .unwrap_err();
        match err {
            Error::CapabilityMissing { capability, .. } => assert_eq!(capability, "HttpClient"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[cfg(feature = "desktop-shims")]
    #[test]
    fn test_remote_without_http_client_uses_reqwest_default() {
        let config = CoreConfig::builder()
            .token_provider(Arc::new(StaticTokenProvider::new("token")))
            .device_host(Arc::new(MockDeviceHost))
            .build()
            .expect("desktop shims should provide an HttpClient");
        assert!(config.remote_enabled());
    }

    #[test]
    fn test_debug_hides_bridges() {
        let config = remote_builder().build().unwrap();
        let debug = format!("{:?}", config);
        assert!(debug.contains("HttpClient { ... }"));
        assert!(!debug.contains("token\""));
    }
}
