use axum::{Extension, Json, extract::State};
use tracing::info;

use socialhub_crypto::{password::verify_password, totp};
use socialhub_db::models::UserRow;
use socialhub_types::api::{
    LoginResponse, MessageResponse, TotpDisableRequest, TotpLoginRequest, TotpSetupResponse, TotpVerifyRequest,
    TwoFactorStatusResponse,
};

use crate::auth::session_response;
use crate::error::ApiError;
use crate::middleware::Principal;
use crate::state::AppState;

const ISSUER: &str = "SocialHub";

fn current_user(state: &AppState, principal: &Principal) -> Result<UserRow, ApiError> {
    state
        .db
        .get_user_by_id(&principal.user_id.to_string())?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
}

/// Create a pending secret. It only takes effect once a code generated from
/// it is verified.
pub async fn generate(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<TotpSetupResponse>, ApiError> {
    let user = current_user(&state, &principal)?;
    if user.two_factor_enabled {
        return Err(ApiError::Conflict(
            "Two-factor authentication is already enabled".to_string(),
        ));
    }

    let secret = totp::generate_secret();
    let otpauth_url = totp::otpauth_url(&secret, &user.email, ISSUER);
    let qr_code = totp::qr_data_url(&otpauth_url)?;
    state.db.set_two_factor_secret(&user.id, &secret)?;

    Ok(Json(TotpSetupResponse {
        success: true,
        message: "Scan the QR code with your authenticator app".to_string(),
        otpauth_url,
        qr_code,
        manual_entry_key: secret.clone(),
        secret,
    }))
}

pub async fn verify(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<TotpVerifyRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let code = req.token.trim();
    if code.is_empty() {
        return Err(ApiError::validation("Verification code is required"));
    }

    let user = current_user(&state, &principal)?;
    let secret = user
        .two_factor_secret
        .as_deref()
        .ok_or_else(|| ApiError::validation("Two-factor setup has not been started"))?;

    if !totp::verify_now(secret, code)? {
        return Err(ApiError::validation("Invalid verification code"));
    }

    state.db.enable_two_factor(&user.id)?;
    info!("Two-factor enabled for {}", user.username);

    Ok(Json(MessageResponse {
        success: true,
        message: "Two-factor authentication enabled".to_string(),
    }))
}

/// Second login step for accounts with two-factor enabled.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<TotpLoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let email = req.email.trim();
    let code = req.token.trim();
    if email.is_empty() || code.is_empty() {
        return Err(ApiError::validation("Email and verification code are required"));
    }

    let user = state
        .db
        .get_user_by_email(email)?
        .filter(|u| u.two_factor_enabled)
        .ok_or_else(|| ApiError::validation("Two-factor authentication is not enabled for this account"))?;

    let secret = user
        .two_factor_secret
        .as_deref()
        .ok_or_else(|| ApiError::validation("Two-factor authentication is not enabled for this account"))?;

    if !totp::verify_now(secret, code)? {
        return Err(ApiError::validation("Invalid verification code"));
    }

    session_response(&state, &user, "Login successful").map(Json)
}

pub async fn disable(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<TotpDisableRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    if req.current_password.is_empty() {
        return Err(ApiError::validation("Current password is required"));
    }

    let user = current_user(&state, &principal)?;
    if !verify_password(&req.current_password, &user.password_hash)? {
        return Err(ApiError::validation("Incorrect password"));
    }

    state.db.disable_two_factor(&user.id)?;
    info!("Two-factor disabled for {}", user.username);

    Ok(Json(MessageResponse {
        success: true,
        message: "Two-factor authentication disabled".to_string(),
    }))
}

pub async fn status(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<TwoFactorStatusResponse>, ApiError> {
    let user = current_user(&state, &principal)?;

    Ok(Json(TwoFactorStatusResponse {
        success: true,
        two_factor_enabled: user.two_factor_enabled,
        has_secret: user.two_factor_secret.is_some(),
    }))
}
