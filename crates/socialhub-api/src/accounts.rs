use axum::{
    Extension, Json,
    extract::{Path, State},
};
use tracing::{info, warn};
use uuid::Uuid;

use socialhub_types::api::{AccountSummary, AccountsResponse, MessageResponse};

use crate::error::ApiError;
use crate::middleware::Principal;
use crate::parse_timestamp;
use crate::state::AppState;

/// The caller's connected accounts across all providers. Tokens never leave
/// the server.
pub async fn list_accounts(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<AccountsResponse>, ApiError> {
    let rows = state.db.get_social_accounts(&principal.user_id.to_string())?;

    let data = rows
        .into_iter()
        .filter_map(|row| {
            let id = Uuid::parse_str(&row.id)
                .map_err(|e| warn!("Skipping account with corrupt id '{}': {}", row.id, e))
                .ok()?;
            Some(AccountSummary {
                id,
                connected_at: parse_timestamp(&row.connected_at),
                provider: row.provider,
                username: row.username,
                instance_url: row.instance_url,
            })
        })
        .collect();

    Ok(Json(AccountsResponse { success: true, data }))
}

pub async fn delete_account(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<MessageResponse>, ApiError> {
    let not_found = || ApiError::NotFound("Account not found".to_string());

    // A malformed id cannot name any stored account.
    let account_id = Uuid::parse_str(&account_id).map_err(|_| not_found())?;

    let deleted = state
        .db
        .delete_social_account(&account_id.to_string(), &principal.user_id.to_string())?;

    if !deleted {
        return Err(not_found());
    }

    info!("User {} disconnected account {}", principal.username, account_id);

    Ok(Json(MessageResponse {
        success: true,
        message: "Account disconnected successfully".to_string(),
    }))
}
