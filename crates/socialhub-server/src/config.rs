use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, bail};

use socialhub_api::state::ApiConfig;
use socialhub_providers::{MastodonConfig, RedditConfig, config::DEFAULT_REDDIT_USER_AGENT};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "your-secret-key",
];

const DEFAULT_FRONTEND_URL: &str = "http://localhost:8081";
const DEFAULT_BACKEND_URL: &str = "http://localhost:3001";

pub struct ServerConfig {
    pub addr: SocketAddr,
    pub db_path: PathBuf,
    pub cors_origins: Vec<String>,
    pub api: ApiConfig,
    pub mastodon: MastodonConfig,
    pub reddit: RedditConfig,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let jwt_secret = var("SOCIALHUB_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("SOCIALHUB_JWT_SECRET is unset or still a placeholder. Set it in your .env file and restart.");
        }

        let host = var("SOCIALHUB_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = var("SOCIALHUB_PORT")
            .unwrap_or_else(|| "3001".into())
            .parse()
            .context("SOCIALHUB_PORT must be a port number")?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", host, port))?;

        let frontend_url = var("FRONTEND_URL").unwrap_or_else(|| DEFAULT_FRONTEND_URL.into());
        let backend_url = var("BACKEND_URL").unwrap_or_else(|| DEFAULT_BACKEND_URL.into());
        let backend_url = backend_url.trim_end_matches('/');

        let cors_origins = match var("CORS_ORIGINS") {
            Some(list) => list
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect(),
            None => vec![frontend_url.clone(), "http://127.0.0.1:8081".to_string()],
        };

        let mastodon = MastodonConfig {
            instance: var("MASTODON_INSTANCE"),
            client_id: var("MASTODON_CLIENT_ID"),
            client_secret: var("MASTODON_CLIENT_SECRET"),
            redirect_uri: var("MASTODON_REDIRECT_URI")
                .or_else(|| Some(format!("{}/api/mastodon/callback", backend_url))),
        };

        let reddit = RedditConfig {
            client_id: var("REDDIT_CLIENT_ID"),
            client_secret: var("REDDIT_CLIENT_SECRET"),
            redirect_uri: var("REDDIT_REDIRECT_URI")
                .or_else(|| Some(format!("{}/api/reddit/callback", backend_url))),
            user_agent: var("REDDIT_USER_AGENT").unwrap_or_else(|| DEFAULT_REDDIT_USER_AGENT.into()),
            ..Default::default()
        };

        let production = var("SOCIALHUB_ENV").is_some_and(|env| env.eq_ignore_ascii_case("production"));

        Ok(Self {
            addr,
            db_path: var("SOCIALHUB_DB_PATH").unwrap_or_else(|| "socialhub.db".into()).into(),
            cors_origins,
            api: ApiConfig {
                jwt_secret,
                frontend_url,
                expose_error_details: !production,
            },
            mastodon,
            reddit,
        })
    }
}
