//! Mock provider for testing
//!
//! Simulates a provider without network access. Authorization codes have the
//! form `{identity}` or `{identity}:{anything}`; the exchange hands out the
//! token `access-{code}`, and the identity lookup maps a token back to the
//! identity part. Two codes with the same identity therefore reconnect the
//! same provider account with fresh tokens.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{ProviderError, Result};
use crate::{
    CallbackTarget, Provider, ProviderIdentity, PublishOptions, PublishTarget, PublishedPost, TokenSet,
};

/// A publish call as the mock saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedPublish {
    pub identity: String,
    pub content: String,
    pub subreddit: Option<String>,
}

/// Configuration for mock provider behavior
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Provider name (e.g., "mastodon", "reddit")
    pub name: String,

    /// Whether client credentials are present
    pub is_configured: bool,

    /// Whether code exchange should fail with an upstream 401
    pub exchange_fails: bool,

    /// Identities whose publish calls fail
    pub failing_identities: HashSet<String>,

    /// Every publish attempt in call order
    pub published: Arc<Mutex<Vec<RecordedPublish>>>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            is_configured: true,
            exchange_fails: false,
            failing_identities: HashSet::new(),
            published: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

pub struct MockProvider {
    config: MockConfig,
}

impl MockProvider {
    pub fn new(config: MockConfig) -> Self {
        Self { config }
    }

    pub fn named(name: &str) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            ..Default::default()
        })
    }

    pub fn publish_calls(&self) -> Vec<RecordedPublish> {
        self.config.published.lock().map(|p| p.clone()).unwrap_or_default()
    }

    fn require_configured(&self) -> Result<()> {
        if self.config.is_configured {
            Ok(())
        } else {
            Err(ProviderError::Configuration(format!("{} credentials not configured", self.config.name)))
        }
    }
}

/// `access-alice:2` -> `alice`
fn identity_of(access_token: &str) -> Option<&str> {
    let code = access_token.strip_prefix("access-")?;
    let identity = code.split(':').next()?;
    (!identity.is_empty()).then_some(identity)
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn display_name(&self) -> &str {
        &self.config.name
    }

    fn callback_target(&self) -> CallbackTarget {
        CallbackTarget {
            page: "views/accounts.html",
            include_error_message: true,
        }
    }

    fn instance_url(&self) -> Option<String> {
        Some(format!("https://{}.example", self.config.name))
    }

    fn authorization_url(&self, state: &str) -> Result<String> {
        self.require_configured()?;
        Ok(format!("https://{}.example/oauth/authorize?state={}", self.config.name, state))
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenSet> {
        self.require_configured()?;
        if self.config.exchange_fails {
            return Err(ProviderError::AuthExchange {
                status: 401,
                message: "invalid_grant".to_string(),
            });
        }

        Ok(TokenSet {
            access_token: format!("access-{}", code),
            refresh_token: Some(format!("refresh-{}", code)),
            expires_in: Some(3600),
        })
    }

    async fn fetch_identity(&self, access_token: &str) -> Result<ProviderIdentity> {
        let identity = identity_of(access_token).ok_or_else(|| ProviderError::IdentityFetch {
            status: 401,
            message: "The access token is invalid".to_string(),
        })?;

        Ok(ProviderIdentity {
            provider_id: format!("id-{}", identity),
            username: identity.to_string(),
            display_name: identity.to_uppercase(),
        })
    }

    async fn publish(
        &self,
        target: PublishTarget<'_>,
        content: &str,
        options: &PublishOptions,
    ) -> Result<PublishedPost> {
        let identity = identity_of(target.access_token).unwrap_or_default().to_string();

        if let Ok(mut published) = self.config.published.lock() {
            published.push(RecordedPublish {
                identity: identity.clone(),
                content: content.to_string(),
                subreddit: options.subreddit.clone(),
            });
        }

        if self.config.failing_identities.contains(&identity) {
            return Err(ProviderError::Publish {
                status: 422,
                message: format!("{} rejected the post", identity),
            });
        }

        Ok(PublishedPost {
            remote_post_id: format!("post-{}", identity),
            url: Some(format!("https://{}.example/@{}/1", self.config.name, identity)),
        })
    }
}
