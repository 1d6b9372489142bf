//! Reddit adapter.
//!
//! Token exchange is form encoded with HTTP Basic client auth; API calls go
//! to the `oauth` host. Every request carries the configured `User-Agent`,
//! which Reddit requires of API clients.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::config::RedditConfig;
use crate::error::{ProviderError, Result};
use crate::{
    CallbackTarget, Provider, ProviderIdentity, PublishOptions, PublishTarget, PublishedPost, TokenSet,
    error_message, id_to_string,
};

const SCOPES: &str = "identity,submit,read";
const DEFAULT_SUBREDDIT: &str = "test";
const TITLE_MAX_CHARS: usize = 100;
const INSTANCE_URL: &str = "https://www.reddit.com";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Me {
    id: serde_json::Value,
    name: String,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    json: SubmitJson,
}

#[derive(Debug, Deserialize)]
struct SubmitJson {
    #[serde(default)]
    errors: Vec<Vec<serde_json::Value>>,
    data: Option<SubmitData>,
}

#[derive(Debug, Deserialize)]
struct SubmitData {
    id: serde_json::Value,
    url: Option<String>,
}

pub struct RedditProvider {
    config: RedditConfig,
    http: reqwest::Client,
}

impl RedditProvider {
    pub fn new(config: RedditConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }
}

/// Self-post titles are the first 100 characters of the content.
pub fn post_title(content: &str) -> String {
    content.chars().take(TITLE_MAX_CHARS).collect()
}

/// Flatten Reddit's `[[code, message, field], ...]` error triples.
fn submit_errors(errors: &[Vec<serde_json::Value>]) -> String {
    errors
        .iter()
        .map(|err| {
            let parts: Vec<&str> = err.iter().filter_map(|v| v.as_str()).collect();
            match parts.as_slice() {
                [code, message, ..] => format!("{}: {}", code, message),
                [code] => code.to_string(),
                [] => "unknown error".to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join("; ")
}

#[async_trait]
impl Provider for RedditProvider {
    fn name(&self) -> &str {
        "reddit"
    }

    fn display_name(&self) -> &str {
        "Reddit"
    }

    fn callback_target(&self) -> CallbackTarget {
        CallbackTarget {
            page: "views/accounts.html",
            include_error_message: true,
        }
    }

    fn instance_url(&self) -> Option<String> {
        Some(INSTANCE_URL.to_string())
    }

    fn authorization_url(&self, state: &str) -> Result<String> {
        let creds = self.config.credentials()?;
        let url = Url::parse_with_params(
            &format!("{}/api/v1/authorize", self.config.auth_base),
            &[
                ("client_id", creds.client_id),
                ("response_type", "code"),
                ("state", state),
                ("redirect_uri", creds.redirect_uri),
                ("duration", "permanent"),
                ("scope", SCOPES),
            ],
        )
        .map_err(|e| ProviderError::Configuration(format!("Invalid Reddit auth URL: {}", e)))?;

        Ok(url.to_string())
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenSet> {
        let creds = self.config.credentials()?;

        let resp = self
            .http
            .post(format!("{}/api/v1/access_token", self.config.auth_base))
            .basic_auth(creds.client_id, Some(creds.client_secret))
            .header(reqwest::header::USER_AGENT, &self.config.user_agent)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", creds.redirect_uri),
            ])
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

        // Reddit reports bad grants as 200 with an `error` field.
        let token: TokenResponse =
            serde_json::from_str(&body).map_err(|e| ProviderError::UnexpectedResponse(e.to_string()))?;
        let access_token = token.access_token.ok_or_else(|| ProviderError::AuthExchange {
            status: 400,
            message: token.error.unwrap_or_else(|| "No access token in response".to_string()),
        })?;

        debug!("Reddit token exchange succeeded");
        Ok(TokenSet {
            access_token,
            refresh_token: token.refresh_token,
            expires_in: token.expires_in,
        })
    }

    async fn fetch_identity(&self, access_token: &str) -> Result<ProviderIdentity> {
        let resp = self
            .http
            .get(format!("{}/api/v1/me", self.config.api_base))
            .bearer_auth(access_token)
            .header(reqwest::header::USER_AGENT, &self.config.user_agent)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::IdentityFetch {
                status: status.as_u16(),
                message: error_message(&body, "Could not load Reddit identity"),
            });
        }

        let me: Me = resp.json().await?;
        let provider_id =
            id_to_string(&me.id).ok_or_else(|| ProviderError::UnexpectedResponse("identity without id".into()))?;

        Ok(ProviderIdentity {
            provider_id,
            username: me.name.clone(),
            display_name: me.name,
        })
    }

    async fn publish(
        &self,
        target: PublishTarget<'_>,
        content: &str,
        options: &PublishOptions,
    ) -> Result<PublishedPost> {
        let subreddit = options
            .subreddit
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_SUBREDDIT);
        let title = post_title(content);

        let resp = self
            .http
            .post(format!("{}/api/submit", self.config.api_base))
            .bearer_auth(target.access_token)
            .header(reqwest::header::USER_AGENT, &self.config.user_agent)
            .form(&[
                ("api_type", "json"),
                ("kind", "self"),
                ("sr", subreddit),
                ("title", title.as_str()),
                ("text", content),
            ])
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(ProviderError::Publish {
                status: status.as_u16(),
                message: error_message(&body, "Failed to post"),
            });
        }

        let submitted: SubmitResponse =
            serde_json::from_str(&body).map_err(|e| ProviderError::UnexpectedResponse(e.to_string()))?;
        if !submitted.json.errors.is_empty() {
            return Err(ProviderError::Publish {
                status: status.as_u16(),
                message: submit_errors(&submitted.json.errors),
            });
        }

        let data = submitted
            .json
            .data
            .ok_or_else(|| ProviderError::UnexpectedResponse("submit response without data".into()))?;
        let remote_post_id =
            id_to_string(&data.id).ok_or_else(|| ProviderError::UnexpectedResponse("post without id".into()))?;

        Ok(PublishedPost {
            remote_post_id,
            url: data.url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn title_is_truncated_by_characters() {
        let long = "é".repeat(150);
        let title = post_title(&long);
        assert_eq!(title.chars().count(), 100);
        assert_eq!(post_title("short"), "short");
    }

    #[test]
    fn submit_errors_are_flattened() {
        let errors = vec![
            vec![json!("SUBREDDIT_NOEXIST"), json!("that subreddit doesn't exist"), json!("sr")],
            vec![json!("RATELIMIT")],
        ];
        assert_eq!(
            submit_errors(&errors),
            "SUBREDDIT_NOEXIST: that subreddit doesn't exist; RATELIMIT"
        );
    }

    #[test]
    fn authorization_url_requests_permanent_access() {
        let provider = RedditProvider::new(RedditConfig {
            client_id: Some("reddit-client".into()),
            client_secret: Some("s".into()),
            redirect_uri: Some("http://localhost:3001/api/reddit/callback".into()),
            ..Default::default()
        });

        let url = Url::parse(&provider.authorization_url("u1_1.sig").unwrap()).unwrap();
        assert_eq!(url.host_str(), Some("www.reddit.com"));
        assert_eq!(url.path(), "/api/v1/authorize");

        let params: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(params["client_id"], "reddit-client");
        assert_eq!(params["duration"], "permanent");
        assert_eq!(params["scope"], "identity,submit,read");
        assert_eq!(params["state"], "u1_1.sig");
    }
}
