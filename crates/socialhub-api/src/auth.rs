use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::info;
use uuid::Uuid;

use socialhub_crypto::password::{hash_password, verify_password};
use socialhub_db::{is_unique_violation, models::UserRow};
use socialhub_types::api::{
    LoginRequest, LoginResponse, ProfileResponse, RegisterRequest, RegisterResponse, UserSummary,
};

use crate::error::ApiError;
use crate::middleware::{Principal, create_token};
use crate::parse_timestamp;
use crate::state::AppState;

const MIN_PASSWORD_LEN: usize = 8;

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = req.username.trim();
    let email = req.email.trim();

    if username.is_empty() || email.is_empty() || req.password.is_empty() || req.confirm_password.is_empty() {
        return Err(ApiError::validation("All fields are required"));
    }
    if req.password != req.confirm_password {
        return Err(ApiError::validation("Passwords do not match"));
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::validation("Password must be at least 8 characters long"));
    }
    if !is_valid_email(email) {
        return Err(ApiError::validation("Please provide a valid email address"));
    }
    let username_len = username.chars().count();
    if !(3..=50).contains(&username_len) {
        return Err(ApiError::validation("Username must be between 3 and 50 characters"));
    }

    if state.db.get_user_by_email(email)?.is_some() {
        return Err(ApiError::Conflict("Email already registered".to_string()));
    }
    if state.db.get_user_by_username(username)?.is_some() {
        return Err(ApiError::Conflict("Username already taken".to_string()));
    }

    let password_hash = hash_password(&req.password)?;
    let user_id = Uuid::new_v4();

    // Two concurrent registrations can both pass the lookups above.
    if let Err(e) = state
        .db
        .create_user(&user_id.to_string(), username, email, &password_hash)
    {
        if is_unique_violation(&e) {
            return Err(ApiError::Conflict("Email or username already registered".to_string()));
        }
        return Err(e.into());
    }

    let user = state
        .db
        .get_user_by_id(&user_id.to_string())?
        .ok_or_else(|| ApiError::internal("user vanished after insert"))?;

    info!("Registered user {} ({})", user.username, user.id);

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            success: true,
            message: "User registered successfully".to_string(),
            user: user_summary(&user)?,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let email = req.email.trim();
    if email.is_empty() || req.password.is_empty() {
        return Err(ApiError::validation("Email and password are required"));
    }

    let invalid = || ApiError::Auth("Invalid email or password".to_string());

    let user = state.db.get_user_by_email(email)?.ok_or_else(invalid)?;
    if !verify_password(&req.password, &user.password_hash)? {
        return Err(invalid());
    }

    if user.two_factor_enabled {
        return Ok(Json(LoginResponse {
            success: true,
            message: "Two-factor authentication required".to_string(),
            requires_two_factor: true,
            token: None,
            user: None,
            email: Some(user.email),
        }));
    }

    session_response(&state, &user, "Login successful").map(Json)
}

pub async fn profile(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let user = state
        .db
        .get_user_by_id(&principal.user_id.to_string())?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(Json(ProfileResponse {
        success: true,
        id: principal.user_id,
        username: user.username,
        email: user.email,
        two_factor_enabled: user.two_factor_enabled,
        is_verified: user.is_verified,
        created_at: parse_timestamp(&user.created_at),
    }))
}

/// Issue a session token for `user`. Shared by password and second-factor
/// login.
pub(crate) fn session_response(state: &AppState, user: &UserRow, message: &str) -> Result<LoginResponse, ApiError> {
    let summary = user_summary(user)?;
    let token = create_token(&state.jwt_secret, summary.id, &user.username, &user.email)?;

    info!("User {} logged in", user.username);

    Ok(LoginResponse {
        success: true,
        message: message.to_string(),
        requires_two_factor: false,
        token: Some(token),
        user: Some(summary),
        email: None,
    })
}

pub(crate) fn user_summary(user: &UserRow) -> Result<UserSummary, ApiError> {
    let id = Uuid::parse_str(&user.id).map_err(|e| ApiError::internal(format!("corrupt user id: {}", e)))?;

    Ok(UserSummary {
        id,
        username: user.username.clone(),
        email: user.email.clone(),
        two_factor_enabled: user.two_factor_enabled,
        created_at: parse_timestamp(&user.created_at),
    })
}

/// `local@domain.tld`: no whitespace, one `@`, and a dot inside the domain.
fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    domain
        .char_indices()
        .any(|(i, c)| c == '.' && i > 0 && i < domain.len() - 1)
}

#[cfg(test)]
mod tests {
    use super::is_valid_email;

    #[test]
    fn email_shapes() {
        assert!(is_valid_email("alice@example.com"));
        assert!(is_valid_email("a.b+tag@mail.example.org"));
        assert!(!is_valid_email("alice"));
        assert!(!is_valid_email("alice@localhost"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("alice@.com"));
        assert!(!is_valid_email("alice@example."));
        assert!(!is_valid_email("al ice@example.com"));
        assert!(!is_valid_email("a@b@example.com"));
    }
}
