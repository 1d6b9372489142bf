//! Drives the real adapters against local stand-ins for the provider APIs
//! and checks the request shapes each provider expects.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    Form, Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::{Value, json};

use socialhub_providers::mastodon::MastodonProvider;
use socialhub_providers::reddit::RedditProvider;
use socialhub_providers::{
    MastodonConfig, Provider, ProviderError, PublishOptions, PublishTarget, RedditConfig,
};

const REDDIT_BASIC: &str = "Basic cmVkZGl0LWNsaWVudDpyZWRkaXQtc2VjcmV0";
const REDDIT_AGENT: &str = "socialhub-tests/1.0";

type Seen = Arc<Mutex<Vec<HashMap<String, String>>>>;

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

// -- Mastodon stand-in --

async fn mastodon_token(Json(body): Json<Value>) -> impl IntoResponse {
    assert_eq!(body["client_id"], "masto-client");
    assert_eq!(body["client_secret"], "masto-secret");
    assert_eq!(body["grant_type"], "authorization_code");
    assert_eq!(body["redirect_uri"], "urn:ietf:wg:oauth:2.0:oob");

    if body["code"] == "good-code" {
        (StatusCode::OK, Json(json!({ "access_token": "masto-token", "token_type": "Bearer" })))
    } else {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid_grant", "error_description": "The provided authorization grant is invalid" })),
        )
    }
}

async fn mastodon_verify(headers: HeaderMap) -> impl IntoResponse {
    if bearer(&headers) == Some("masto-token") {
        (StatusCode::OK, Json(json!({ "id": "109", "username": "alice", "display_name": "" })))
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({ "error": "The access token is invalid" })))
    }
}

async fn mastodon_status(headers: HeaderMap, Json(body): Json<Value>) -> impl IntoResponse {
    assert_eq!(bearer(&headers), Some("masto-token"));
    assert_eq!(body["visibility"], "public");

    if body["status"] == "" {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": "Validation failed: Text can't be blank" })),
        );
    }
    (
        StatusCode::OK,
        Json(json!({ "id": "555", "url": "https://mastodon.example/@alice/555" })),
    )
}

async fn mastodon() -> MastodonProvider {
    let app = Router::new()
        .route("/oauth/token", post(mastodon_token))
        .route("/api/v1/accounts/verify_credentials", get(mastodon_verify))
        .route("/api/v1/statuses", post(mastodon_status));
    let addr = serve(app).await;

    MastodonProvider::new(MastodonConfig {
        instance: Some(format!("http://{}", addr)),
        client_id: Some("masto-client".into()),
        client_secret: Some("masto-secret".into()),
        redirect_uri: Some("urn:ietf:wg:oauth:2.0:oob".into()),
    })
}

#[tokio::test]
async fn mastodon_connect_and_publish() {
    let provider = mastodon().await;

    let tokens = provider.exchange_code("good-code").await.unwrap();
    assert_eq!(tokens.access_token, "masto-token");
    assert_eq!(tokens.refresh_token, None);

    let identity = provider.fetch_identity(&tokens.access_token).await.unwrap();
    assert_eq!(identity.provider_id, "109");
    assert_eq!(identity.username, "alice");
    assert_eq!(identity.display_name, "alice");

    let instance = provider.instance_url().unwrap();
    let posted = provider
        .publish(
            PublishTarget { access_token: "masto-token", instance_url: Some(&instance) },
            "hello fediverse",
            &PublishOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(posted.remote_post_id, "555");
    assert_eq!(posted.url.as_deref(), Some("https://mastodon.example/@alice/555"));
}

#[tokio::test]
async fn mastodon_errors_carry_status_and_message() {
    let provider = mastodon().await;

    let err = provider.exchange_code("stale-code").await.unwrap_err();
    assert_eq!(
        err,
        ProviderError::AuthExchange {
            status: 400,
            message: "The provided authorization grant is invalid".into(),
        }
    );

    let err = provider.fetch_identity("wrong").await.unwrap_err();
    assert!(matches!(err, ProviderError::IdentityFetch { status: 401, .. }));

    let err = provider
        .publish(
            PublishTarget { access_token: "masto-token", instance_url: None },
            "",
            &PublishOptions::default(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.detail(), "Validation failed: Text can't be blank");
    assert_eq!(err.upstream_status(), Some(422));
}

// -- Reddit stand-in --

async fn reddit_token(headers: HeaderMap, Form(form): Form<HashMap<String, String>>) -> impl IntoResponse {
    assert_eq!(headers.get(header::USER_AGENT).unwrap(), REDDIT_AGENT);
    assert_eq!(form["grant_type"], "authorization_code");
    assert_eq!(form["redirect_uri"], "http://localhost:3001/api/reddit/callback");

    if headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) != Some(REDDIT_BASIC) {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "message": "Unauthorized", "error": 401 })));
    }
    if form["code"] != "good-code" {
        // Reddit answers a bad grant with 200
        return (StatusCode::OK, Json(json!({ "error": "invalid_grant" })));
    }
    (
        StatusCode::OK,
        Json(json!({
            "access_token": "reddit-token",
            "refresh_token": "reddit-refresh",
            "expires_in": 86400,
            "scope": "identity submit read",
            "token_type": "bearer"
        })),
    )
}

async fn reddit_me(headers: HeaderMap) -> impl IntoResponse {
    assert_eq!(headers.get(header::USER_AGENT).unwrap(), REDDIT_AGENT);
    if bearer(&headers) == Some("reddit-token") {
        (StatusCode::OK, Json(json!({ "id": "abc12", "name": "alice_r" })))
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({ "message": "Unauthorized", "error": 401 })))
    }
}

async fn reddit_submit(
    State(seen): State<Seen>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> impl IntoResponse {
    assert_eq!(headers.get(header::USER_AGENT).unwrap(), REDDIT_AGENT);
    assert_eq!(bearer(&headers), Some("reddit-token"));
    seen.lock().unwrap().push(form.clone());

    if form["sr"] == "doesnotexist" {
        return Json(json!({
            "json": { "errors": [["SUBREDDIT_NOEXIST", "that subreddit doesn't exist", "sr"]] }
        }));
    }
    Json(json!({
        "json": {
            "errors": [],
            "data": {
                "id": "xyz",
                "name": "t3_xyz",
                "url": "https://www.reddit.com/r/test/comments/xyz/"
            }
        }
    }))
}

async fn reddit() -> (RedditProvider, Seen) {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/api/v1/access_token", post(reddit_token))
        .route("/api/v1/me", get(reddit_me))
        .route("/api/submit", post(reddit_submit))
        .with_state(seen.clone());
    let addr = serve(app).await;

    let provider = RedditProvider::new(RedditConfig {
        client_id: Some("reddit-client".into()),
        client_secret: Some("reddit-secret".into()),
        redirect_uri: Some("http://localhost:3001/api/reddit/callback".into()),
        user_agent: REDDIT_AGENT.into(),
        auth_base: format!("http://{}", addr),
        api_base: format!("http://{}", addr),
    });
    (provider, seen)
}

#[tokio::test]
async fn reddit_connect_and_publish() {
    let (provider, seen) = reddit().await;

    let tokens = provider.exchange_code("good-code").await.unwrap();
    assert_eq!(tokens.access_token, "reddit-token");
    assert_eq!(tokens.refresh_token.as_deref(), Some("reddit-refresh"));
    assert_eq!(tokens.expires_in, Some(86400));

    let identity = provider.fetch_identity(&tokens.access_token).await.unwrap();
    assert_eq!(identity.provider_id, "abc12");
    assert_eq!(identity.username, "alice_r");

    let content = "x".repeat(140);
    let posted = provider
        .publish(
            PublishTarget { access_token: "reddit-token", instance_url: None },
            &content,
            &PublishOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(posted.remote_post_id, "xyz");

    let seen = seen.lock().unwrap();
    let form = &seen[0];
    assert_eq!(form["api_type"], "json");
    assert_eq!(form["kind"], "self");
    assert_eq!(form["sr"], "test");
    assert_eq!(form["title"].len(), 100);
    assert_eq!(form["text"], content);
}

#[tokio::test]
async fn reddit_bad_grant_and_submit_errors() {
    let (provider, _) = reddit().await;

    let err = provider.exchange_code("stale-code").await.unwrap_err();
    assert_eq!(
        err,
        ProviderError::AuthExchange { status: 400, message: "invalid_grant".into() }
    );

    let err = provider
        .publish(
            PublishTarget { access_token: "reddit-token", instance_url: None },
            "hello",
            &PublishOptions { subreddit: Some("doesnotexist".into()) },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Publish { .. }));
    assert!(err.detail().starts_with("SUBREDDIT_NOEXIST"));
}
