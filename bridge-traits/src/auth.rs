//! Credential supply.
//!
//! Obtaining and refreshing credentials is owned by the host's auth module;
//! the core only ever asks for "the current token, if any" right before it
//! needs one.

use async_trait::async_trait;

/// Source of bearer tokens for the remote playback API.
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    /// The current access token, refreshed by the host as needed.
    ///
    /// Returns `None` when the user is signed out or the refresh failed;
    /// callers treat that as "remote playback unavailable", not as an error.
    async fn access_token(&self) -> Option<String>;
}

/// Provider that always hands back the same token.
///
/// Useful for hosts that mint a token up front and rebuild the engine when it
/// changes, and for tests.
#[derive(Clone, Default)]
pub struct StaticTokenProvider {
    token: Option<String>,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    /// A provider representing a signed-out user.
    pub fn signed_out() -> Self {
        Self { token: None }
    }
}

impl std::fmt::Debug for StaticTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticTokenProvider")
            .field("has_token", &self.token.is_some())
            .finish()
    }
}

#[async_trait]
impl AccessTokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> Option<String> {
        self.token.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_provider_returns_token() {
        let provider = StaticTokenProvider::new("abc");
        assert_eq!(provider.access_token().await.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn signed_out_provider_returns_none() {
        assert!(StaticTokenProvider::signed_out().access_token().await.is_none());
    }

    #[test]
    fn debug_output_hides_token() {
        let rendered = format!("{:?}", StaticTokenProvider::new("super-secret"));
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("has_token: true"));
    }
}
