use axum::{
    Extension, Json,
    extract::{Path, State},
};
use tracing::{info, warn};
use uuid::Uuid;

use socialhub_db::models::SocialAccountRow;
use socialhub_providers::{Provider, PublishOptions, PublishTarget};
use socialhub_types::api::{PublishRequest, PublishResponse, PublishResult};
use socialhub_types::models::PostStatus;

use crate::connect::lookup_provider;
use crate::error::ApiError;
use crate::middleware::Principal;
use crate::state::AppState;

/// Publish one piece of content through every selected account of a
/// provider. Succeeds at the HTTP level whenever at least one account was
/// attempted; per-account outcomes are in `results`.
pub async fn publish(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<PublishRequest>,
) -> Result<Json<PublishResponse>, ApiError> {
    let provider = lookup_provider(&state, &provider)?;

    if req.content.trim().is_empty() {
        return Err(ApiError::validation("Content is required"));
    }

    let user_id = principal.user_id.to_string();
    let selected: Option<Vec<String>> = req
        .account_ids
        .filter(|ids| !ids.is_empty())
        .map(|ids| ids.iter().map(Uuid::to_string).collect());

    let accounts = state
        .db
        .get_provider_accounts(&user_id, provider.name(), selected.as_deref())?;
    if accounts.is_empty() {
        return Err(ApiError::validation(format!(
            "No {} accounts connected",
            provider.display_name()
        )));
    }

    let options = PublishOptions {
        subreddit: req.subreddit.filter(|s| !s.trim().is_empty()),
    };
    let results = fan_out(provider.as_ref(), &accounts, &req.content, &options).await;

    let succeeded = results.iter().filter(|r| r.success).count();
    let failed = results.len() - succeeded;

    let post_id = Uuid::new_v4();
    record_post(&state, post_id, &user_id, &req.content, &results);

    info!(
        "Post {} via {}: {} succeeded, {} failed",
        post_id,
        provider.name(),
        succeeded,
        failed
    );

    let mut message = format!("Posted to {} {} account(s)", succeeded, provider.display_name());
    if failed > 0 {
        message.push_str(&format!(", {} failed", failed));
    }

    Ok(Json(PublishResponse {
        success: succeeded > 0,
        message,
        post_id,
        results,
    }))
}

/// Publish sequentially, one result per account in input order. A failing
/// account never stops the rest.
pub async fn fan_out(
    provider: &dyn Provider,
    accounts: &[SocialAccountRow],
    content: &str,
    options: &PublishOptions,
) -> Vec<PublishResult> {
    let mut results = Vec::with_capacity(accounts.len());

    for account in accounts {
        let account_id = Uuid::parse_str(&account.id).unwrap_or_else(|e| {
            warn!("Corrupt account id '{}': {}", account.id, e);
            Uuid::default()
        });
        let target = PublishTarget {
            access_token: &account.access_token,
            instance_url: account.instance_url.as_deref(),
        };

        let result = match provider.publish(target, content, options).await {
            Ok(post) => PublishResult {
                account_id,
                success: true,
                post_id: Some(post.remote_post_id),
                url: post.url,
                error: None,
            },
            Err(e) => {
                warn!("Publishing through {} account {} failed: {}", provider.name(), account.username, e);
                PublishResult {
                    account_id,
                    success: false,
                    post_id: None,
                    url: None,
                    error: Some(e.detail().to_string()),
                }
            }
        };
        results.push(result);
    }

    results
}

/// Persist the post and one history row per attempt. Recording failures are
/// logged; the publishes already happened.
fn record_post(state: &AppState, post_id: Uuid, user_id: &str, content: &str, results: &[PublishResult]) {
    let status = if results.iter().any(|r| r.success) {
        PostStatus::Published
    } else {
        PostStatus::Failed
    };
    let post_id = post_id.to_string();

    if let Err(e) = state.db.create_post(&post_id, user_id, content, status) {
        warn!("Failed to record post {}: {:#}", post_id, e);
        return;
    }

    for result in results {
        let outcome = match serde_json::to_string(result) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize publish result: {}", e);
                continue;
            }
        };
        let history_id = Uuid::new_v4().to_string();
        if let Err(e) = state.db.insert_post_history(
            &history_id,
            &post_id,
            &result.account_id.to_string(),
            &outcome,
        ) {
            warn!("Failed to record history for post {}: {:#}", post_id, e);
        }
    }
}
