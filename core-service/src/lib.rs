//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (HTTP, access
//! tokens, the remote device host, the local media element) into the
//! snippet playback engine. Desktop hosts typically enable the
//! `desktop-shims` feature, which supplies a reqwest-backed HTTP client when
//! none is injected.
//!
//! ```no_run
//! # async fn example(
//! #     tokens: std::sync::Arc<dyn bridge_traits::AccessTokenProvider>,
//! #     host: std::sync::Arc<dyn bridge_traits::DeviceHost>,
//! # ) -> core_service::Result<()> {
//! use core_playback::{SnippetConfig, TrackRef};
//! use core_runtime::config::CoreConfig;
//!
//! let config = CoreConfig::builder()
//!     .token_provider(tokens)
//!     .device_host(host)
//!     .build()?;
//! let core = core_service::bootstrap(config, SnippetConfig::default())?;
//! core.engine()
//!     .play_snippet(TrackRef::new("spotify:track:6rqhFgbbKwnb9MLmUQDhG6"), 30_000, 1_000)
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod error;

pub use error::{CoreError, Result};

use std::sync::Arc;

use core_playback::{LocalTransport, RemoteTransport, SnippetConfig, SnippetEngine, Transport};
use core_runtime::config::CoreConfig;
use core_runtime::events::{EventBus, EventStream};
use core_runtime::logging::{init_logging, LoggingConfig};
use tracing::info;

#[cfg(feature = "desktop-shims")]
pub use bridge_desktop::ReqwestHttpClient;

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    config: Arc<CoreConfig>,
    engine: SnippetEngine,
    events: Option<EventBus>,
}

impl CoreService {
    pub fn engine(&self) -> &SnippetEngine {
        &self.engine
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Stream of every engine event, or `None` when the bus is disabled
    /// (`event_bus_capacity == 0`).
    pub fn events(&self) -> Option<EventStream> {
        self.events
            .as_ref()
            .map(|bus| EventStream::new(bus.subscribe()))
    }
}

/// Build the playback engine from host configuration.
///
/// The remote transport is primary whenever a token provider and device host
/// are configured; the local transport, when a media element is present,
/// serves as fallback (or as the only transport).
pub fn bootstrap(config: CoreConfig, snippet: SnippetConfig) -> Result<CoreService> {
    config.validate()?;

    let remote: Option<Arc<dyn Transport>> =
        match (config.token_provider.clone(), config.device_host.clone()) {
            (Some(tokens), Some(host)) => Some(Arc::new(RemoteTransport::new(
                Arc::clone(&config.http_client),
                tokens,
                host,
                config.api_base_url.clone(),
                snippet.device_ready_timeout,
            ))),
            _ => None,
        };
    let local: Option<Arc<dyn Transport>> = config
        .media_element
        .clone()
        .map(|element| Arc::new(LocalTransport::new(element)) as Arc<dyn Transport>);

    let mut builder = SnippetEngine::builder().config(snippet);
    match (remote, local) {
        (Some(remote), local) => {
            builder = builder.primary(remote);
            if let Some(local) = local {
                builder = builder.fallback(local);
            }
        }
        (None, Some(local)) => builder = builder.primary(local),
        (None, None) => {
            return Err(CoreError::CapabilityMissing {
                capability: "Transport".to_string(),
                message: "configure a device host or a media element".to_string(),
            })
        }
    }

    let events = (config.event_bus_capacity > 0).then(|| EventBus::new(config.event_bus_capacity));
    if let Some(bus) = &events {
        builder = builder.event_bus(bus.clone());
    }

    let engine = builder.build()?;
    info!(
        remote = config.remote_enabled(),
        local = config.local_enabled(),
        event_bus = events.is_some(),
        "Core service bootstrapped"
    );

    Ok(CoreService {
        config: Arc::new(config),
        engine,
        events,
    })
}

/// [`bootstrap`], after installing the global tracing subscriber.
pub fn bootstrap_with_logging(
    config: CoreConfig,
    snippet: SnippetConfig,
    logging: LoggingConfig,
) -> Result<CoreService> {
    init_logging(logging).map_err(|err| CoreError::InitializationFailed(err.to_string()))?;
    bootstrap(config, snippet)
}
