use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::Redirect,
};
use chrono::{Duration, SecondsFormat, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use socialhub_db::models::NewSocialAccount;
use socialhub_providers::{Provider, ProviderError};
use socialhub_types::api::{AuthUrlResponse, CallbackQuery, ConnectRequest, ConnectResponse, ConnectedAccount};

use crate::error::ApiError;
use crate::middleware::Principal;
use crate::state::AppState;

pub(crate) fn lookup_provider(state: &AppState, name: &str) -> Result<Arc<dyn Provider>, ApiError> {
    state
        .providers
        .get(name)
        .ok_or_else(|| ApiError::NotFound(format!("Unknown provider: {}", name)))
}

/// Start the redirect flow: an authorization URL whose state is bound to the
/// caller.
pub async fn auth_url(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<AuthUrlResponse>, ApiError> {
    let provider = lookup_provider(&state, &provider)?;

    let oauth_state = state
        .state_signer
        .issue(&principal.user_id.to_string(), Utc::now().timestamp_millis());
    let auth_url = provider.authorization_url(&oauth_state)?;

    Ok(Json(AuthUrlResponse {
        success: true,
        auth_url,
        state: oauth_state,
    }))
}

/// Provider redirect target. Always answers with a browser redirect to the
/// frontend; failures carry an error marker instead of an error status.
pub async fn callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
) -> Result<Redirect, ApiError> {
    let provider = lookup_provider(&state, &provider)?;
    let target = provider.callback_target();

    let outcome = complete_callback(&state, provider.as_ref(), query).await;

    let mut params = url::form_urlencoded::Serializer::new(String::new());
    match outcome {
        Ok(account) => {
            info!("{} account {} connected via callback", provider.name(), account.username);
            params.append_pair(provider.name(), "connected");
        }
        Err(e) => {
            warn!("{} callback failed: {:?}", provider.name(), e);
            params.append_pair(provider.name(), "error");
            if target.include_error_message {
                params.append_pair("message", &e.to_string());
            }
        }
    }

    Ok(Redirect::to(&format!(
        "{}/{}?{}",
        state.frontend_url,
        target.page,
        params.finish()
    )))
}

async fn complete_callback(
    state: &AppState,
    provider: &dyn Provider,
    query: CallbackQuery,
) -> Result<ConnectedAccount, ApiError> {
    if let Some(denied) = query.error {
        return Err(ApiError::validation(format!("Authorization denied: {}", denied)));
    }

    let code = query
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ApiError::validation("Authorization code is required"))?;

    let user_id = query
        .state
        .as_deref()
        .and_then(|s| state.state_signer.verify(s, Utc::now().timestamp_millis()).ok())
        .and_then(|id| Uuid::parse_str(&id).ok())
        .ok_or_else(|| ApiError::validation("Invalid or expired state"))?;

    if state.db.get_user_by_id(&user_id.to_string())?.is_none() {
        return Err(ApiError::validation("Invalid or expired state"));
    }

    connect_account(state, provider, user_id, &code).await
}

/// Out-of-band connection: the user pastes the authorization code.
pub async fn connect(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<ConnectRequest>,
) -> Result<Json<ConnectResponse>, ApiError> {
    let provider = lookup_provider(&state, &provider)?;

    let code = req.code.trim();
    if code.is_empty() {
        return Err(ApiError::validation("Authorization code is required"));
    }

    let account = connect_account(&state, provider.as_ref(), principal.user_id, code).await?;

    Ok(Json(ConnectResponse {
        success: true,
        message: format!("{} account connected successfully", provider.display_name()),
        account,
    }))
}

/// Exchange `code`, identify the account, and store it. Reconnecting the same
/// provider account refreshes its tokens in place.
async fn connect_account(
    state: &AppState,
    provider: &dyn Provider,
    user_id: Uuid,
    code: &str,
) -> Result<ConnectedAccount, ApiError> {
    let tokens = provider
        .exchange_code(code)
        .await
        .map_err(|e| connect_failure(state, provider, e))?;

    let identity = provider
        .fetch_identity(&tokens.access_token)
        .await
        .map_err(|e| connect_failure(state, provider, e))?;

    let expires_at = tokens
        .expires_in
        .map(|secs| (Utc::now() + Duration::seconds(secs)).to_rfc3339_opts(SecondsFormat::Micros, true));
    let instance_url = provider.instance_url();
    let user_id = user_id.to_string();

    let (row, created) = state.db.upsert_social_account(&NewSocialAccount {
        user_id: &user_id,
        provider: provider.name(),
        provider_id: &identity.provider_id,
        username: &identity.username,
        access_token: &tokens.access_token,
        refresh_token: tokens.refresh_token.as_deref(),
        expires_at: expires_at.as_deref(),
        instance_url: instance_url.as_deref(),
    })?;

    info!(
        "{} {} account {} for user {}",
        if created { "Connected" } else { "Refreshed" },
        provider.name(),
        row.username,
        user_id
    );

    let id = Uuid::parse_str(&row.id).map_err(|e| ApiError::internal(format!("corrupt account id: {}", e)))?;

    Ok(ConnectedAccount {
        id,
        provider: row.provider,
        provider_id: row.provider_id,
        username: row.username,
        display_name: identity.display_name,
        instance_url: row.instance_url.unwrap_or_default(),
    })
}

/// Map a failed exchange or lookup to something safe to show the user.
fn connect_failure(state: &AppState, provider: &dyn Provider, err: ProviderError) -> ApiError {
    if let ProviderError::Configuration(msg) = err {
        return ApiError::Configuration(msg);
    }

    warn!("{} connection failed: {}", provider.name(), err);

    let message = match err.upstream_status() {
        Some(401) => "Invalid or expired authorization code. Please try again.".to_string(),
        Some(400) => "Invalid request. Please check your authorization code.".to_string(),
        _ => format!("Error connecting {} account", provider.display_name()),
    };

    ApiError::Provider {
        message,
        details: state.expose_error_details.then(|| err.to_string()),
    }
}
