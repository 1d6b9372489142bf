//! Per-provider OAuth client settings.
//!
//! Built once at startup and handed to the adapters. Credentials are kept as
//! `Option` so a server with one provider unconfigured still boots; the
//! adapter reports `ProviderError::Configuration` when it is used.

use crate::error::{ProviderError, Result};

pub const DEFAULT_REDDIT_USER_AGENT: &str = "socialhub/0.1";

#[derive(Debug, Clone, Default)]
pub struct MastodonConfig {
    /// Host name (`mastodon.social`) or full base URL.
    pub instance: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
}

/// Validated Mastodon settings, borrowed for one request.
pub(crate) struct MastodonCredentials<'a> {
    pub base_url: String,
    pub client_id: &'a str,
    pub client_secret: &'a str,
    pub redirect_uri: &'a str,
}

impl MastodonConfig {
    pub fn base_url(&self) -> Option<String> {
        let instance = self.instance.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        if instance.starts_with("http://") || instance.starts_with("https://") {
            Some(instance.trim_end_matches('/').to_string())
        } else {
            Some(format!("https://{}", instance.trim_end_matches('/')))
        }
    }

    pub(crate) fn credentials(&self) -> Result<MastodonCredentials<'_>> {
        let base_url = self.base_url().ok_or_else(|| {
            ProviderError::Configuration("Mastodon instance not configured. Please check MASTODON_INSTANCE.".into())
        })?;
        let (Some(client_id), Some(client_secret)) = (non_empty(&self.client_id), non_empty(&self.client_secret)) else {
            return Err(ProviderError::Configuration(
                "Mastodon credentials not configured. Please check MASTODON_CLIENT_ID and MASTODON_CLIENT_SECRET."
                    .into(),
            ));
        };
        let redirect_uri = non_empty(&self.redirect_uri).ok_or_else(|| {
            ProviderError::Configuration(
                "Mastodon redirect URI not configured. Please check MASTODON_REDIRECT_URI.".into(),
            )
        })?;

        Ok(MastodonCredentials {
            base_url,
            client_id,
            client_secret,
            redirect_uri,
        })
    }
}

#[derive(Debug, Clone)]
pub struct RedditConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
    /// Reddit rejects requests without an identifying agent.
    pub user_agent: String,
    /// `www` host serving authorize and access_token.
    pub auth_base: String,
    /// `oauth` host serving bearer-authenticated API calls.
    pub api_base: String,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_uri: None,
            user_agent: DEFAULT_REDDIT_USER_AGENT.to_string(),
            auth_base: "https://www.reddit.com".to_string(),
            api_base: "https://oauth.reddit.com".to_string(),
        }
    }
}

pub(crate) struct RedditCredentials<'a> {
    pub client_id: &'a str,
    pub client_secret: &'a str,
    pub redirect_uri: &'a str,
}

impl RedditConfig {
    pub(crate) fn credentials(&self) -> Result<RedditCredentials<'_>> {
        let client_id = non_empty(&self.client_id).ok_or_else(|| {
            ProviderError::Configuration("Reddit client ID not configured. Please check REDDIT_CLIENT_ID.".into())
        })?;
        let redirect_uri = non_empty(&self.redirect_uri).ok_or_else(|| {
            ProviderError::Configuration(
                "Reddit redirect URI not configured. Please check REDDIT_REDIRECT_URI.".into(),
            )
        })?;
        // Installed-app clients have no secret; Basic auth then uses an empty password.
        let client_secret = non_empty(&self.client_secret).unwrap_or("");

        Ok(RedditCredentials {
            client_id,
            client_secret,
            redirect_uri,
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}
