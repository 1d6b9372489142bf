//! Social provider adapters.
//!
//! Every provider goes through the same four steps: build an authorization
//! URL, exchange the returned code for tokens, look up who the tokens belong
//! to, and publish content. Only the wire formats differ, so each provider
//! implements [`Provider`] and the connection and fan-out orchestration lives
//! with the caller.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

pub mod config;
pub mod error;
pub mod mastodon;
pub mod reddit;

// Scriptable provider for integration tests in dependent crates.
pub mod mock;

pub use config::{MastodonConfig, RedditConfig};
pub use error::{ProviderError, Result};

/// Tokens returned by a successful code exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Lifetime in seconds, when the provider reports one.
    pub expires_in: Option<i64>,
}

/// The provider-side account the tokens belong to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderIdentity {
    pub provider_id: String,
    pub username: String,
    pub display_name: String,
}

/// The stored account a post is published through.
#[derive(Debug, Clone, Copy)]
pub struct PublishTarget<'a> {
    pub access_token: &'a str,
    pub instance_url: Option<&'a str>,
}

/// Provider-specific publish fields. Unused fields are ignored.
#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    pub subreddit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedPost {
    pub remote_post_id: String,
    pub url: Option<String>,
}

/// Where the browser lands after the OAuth redirect callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallbackTarget {
    /// Frontend page, relative to the frontend base URL.
    pub page: &'static str,
    /// Whether failures carry a `message` query parameter.
    pub include_error_message: bool,
}

#[async_trait]
pub trait Provider: Send + Sync {
    /// Lowercase identifier used in routes and stored on accounts.
    fn name(&self) -> &str;

    /// Human-readable name for messages ("Mastodon").
    fn display_name(&self) -> &str;

    fn callback_target(&self) -> CallbackTarget;

    /// Base URL recorded on accounts connected through this provider.
    fn instance_url(&self) -> Option<String>;

    /// Authorization-request URL carrying `state`.
    ///
    /// # Errors
    ///
    /// `ProviderError::Configuration` when client id or redirect URI is missing.
    fn authorization_url(&self, state: &str) -> Result<String>;

    /// Server-to-server exchange of an authorization code.
    async fn exchange_code(&self, code: &str) -> Result<TokenSet>;

    /// "Who am I" lookup for a bearer token.
    async fn fetch_identity(&self, access_token: &str) -> Result<ProviderIdentity>;

    /// Submit `content` through one account.
    async fn publish(
        &self,
        target: PublishTarget<'_>,
        content: &str,
        options: &PublishOptions,
    ) -> Result<PublishedPost>;
}

/// Providers available to the API, keyed by [`Provider::name`].
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn with(mut self, provider: Arc<dyn Provider>) -> Self {
        self.register(provider);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Pull a readable message out of a provider error body: OAuth's
/// `error_description`, then `error`, then `message`, else the raw text.
pub(crate) fn error_message(body: &str, fallback: &str) -> String {
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["error_description", "error", "message"] {
            if let Some(msg) = json.get(key).and_then(|v| v.as_str()) {
                return msg.to_string();
            }
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.chars().take(500).collect()
    }
}

/// Provider ids arrive as JSON strings or numbers.
pub(crate) fn id_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
