//! Mastodon adapter.
//!
//! Uses the instance's OAuth endpoints with a JSON token exchange, the
//! `verify_credentials` lookup, and public statuses for publishing. Accounts
//! remember their instance URL so a post goes to the server the account
//! lives on.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;
use url::Url;

use crate::config::MastodonConfig;
use crate::error::{ProviderError, Result};
use crate::{
    CallbackTarget, Provider, ProviderIdentity, PublishOptions, PublishTarget, PublishedPost, TokenSet,
    error_message, id_to_string,
};

const SCOPES: &str = "read write follow";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Account {
    id: serde_json::Value,
    username: String,
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Status {
    id: serde_json::Value,
    url: Option<String>,
}

pub struct MastodonProvider {
    config: MastodonConfig,
    http: reqwest::Client,
}

impl MastodonProvider {
    pub fn new(config: MastodonConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Provider for MastodonProvider {
    fn name(&self) -> &str {
        "mastodon"
    }

    fn display_name(&self) -> &str {
        "Mastodon"
    }

    fn callback_target(&self) -> CallbackTarget {
        CallbackTarget {
            page: "views/main.html",
            include_error_message: false,
        }
    }

    fn instance_url(&self) -> Option<String> {
        self.config.base_url()
    }

    fn authorization_url(&self, state: &str) -> Result<String> {
        let creds = self.config.credentials()?;
        let url = Url::parse_with_params(
            &format!("{}/oauth/authorize", creds.base_url),
            &[
                ("client_id", creds.client_id),
                ("redirect_uri", creds.redirect_uri),
                ("response_type", "code"),
                ("scope", SCOPES),
                ("state", state),
            ],
        )
        .map_err(|e| ProviderError::Configuration(format!("Invalid Mastodon instance URL: {}", e)))?;

        Ok(url.to_string())
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenSet> {
        let creds = self.config.credentials()?;

        let resp = self
            .http
            .post(format!("{}/oauth/token", creds.base_url))
            .json(&json!({
                "client_id": creds.client_id,
                "client_secret": creds.client_secret,
                "redirect_uri": creds.redirect_uri,
                "grant_type": "authorization_code",
                "code": code,
            }))
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(ProviderError::AuthExchange {
                status: status.as_u16(),
                message: error_message(&body, "Token exchange rejected"),
            });
        }

        let token: TokenResponse =
            serde_json::from_str(&body).map_err(|e| ProviderError::UnexpectedResponse(e.to_string()))?;
        let access_token = token.access_token.ok_or_else(|| ProviderError::AuthExchange {
            status: status.as_u16(),
            message: token.error.unwrap_or_else(|| "No access token in response".to_string()),
        })?;

        debug!("Mastodon token exchange succeeded");
        Ok(TokenSet {
            access_token,
            refresh_token: token.refresh_token,
            expires_in: token.expires_in,
        })
    }

    async fn fetch_identity(&self, access_token: &str) -> Result<ProviderIdentity> {
        let base_url = self
            .config
            .base_url()
            .ok_or_else(|| ProviderError::Configuration("Mastodon instance not configured".into()))?;

        let resp = self
            .http
            .get(format!("{}/api/v1/accounts/verify_credentials", base_url))
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::IdentityFetch {
                status: status.as_u16(),
                message: error_message(&body, "Could not verify credentials"),
            });
        }

        let account: Account = resp.json().await?;
        let provider_id = id_to_string(&account.id)
            .ok_or_else(|| ProviderError::UnexpectedResponse("account without id".into()))?;
        let display_name = account
            .display_name
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| account.username.clone());

        Ok(ProviderIdentity {
            provider_id,
            username: account.username,
            display_name,
        })
    }

    async fn publish(
        &self,
        target: PublishTarget<'_>,
        content: &str,
        _options: &PublishOptions,
    ) -> Result<PublishedPost> {
        let base_url = match target.instance_url {
            Some(url) if !url.is_empty() => url.trim_end_matches('/').to_string(),
            _ => self
                .config
                .base_url()
                .ok_or_else(|| ProviderError::Configuration("Mastodon instance not configured".into()))?,
        };

        let resp = self
            .http
            .post(format!("{}/api/v1/statuses", base_url))
            .bearer_auth(target.access_token)
            .json(&json!({
                "status": content,
                "visibility": "public",
            }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
                .unwrap_or_else(|| "Failed to post".to_string());
            return Err(ProviderError::Publish {
                status: status.as_u16(),
                message,
            });
        }

        let posted: Status = resp.json().await?;
        let remote_post_id = id_to_string(&posted.id)
            .ok_or_else(|| ProviderError::UnexpectedResponse("status without id".into()))?;

        Ok(PublishedPost {
            remote_post_id,
            url: posted.url,
        })
    }
}
