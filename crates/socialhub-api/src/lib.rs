pub mod accounts;
pub mod auth;
pub mod connect;
pub mod error;
pub mod middleware;
pub mod posting;
pub mod state;
pub mod two_factor;

use axum::{
    Json, Router, middleware as axum_middleware,
    routing::{delete, get, post},
};
use chrono::{DateTime, Utc};
use tracing::warn;

use socialhub_types::api::HealthResponse;

use crate::middleware::require_auth;
use crate::state::AppState;

/// All HTTP routes, mounted under `/api`. CORS and tracing layers are added
/// by the binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/2fa/login", post(two_factor::login))
        .route("/{provider}/callback", get(connect::callback))
        .route("/health", get(health));

    let protected_routes = Router::new()
        .route("/profile", get(auth::profile))
        .route("/2fa/generate", post(two_factor::generate))
        .route("/2fa/verify", post(two_factor::verify))
        .route("/2fa/disable", post(two_factor::disable))
        .route("/2fa/status", get(two_factor::status))
        .route("/{provider}/auth", get(connect::auth_url))
        .route("/{provider}/connect", post(connect::connect))
        .route("/{provider}/post", post(posting::publish))
        .route("/accounts", get(accounts::list_accounts))
        .route("/accounts/{id}", delete(accounts::delete_account))
        .route_layer(axum_middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .nest("/api", public_routes.merge(protected_routes))
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK",
        message: "SocialHub API is running",
        timestamp: Utc::now(),
    })
}

/// Parse a stored timestamp. Rows written by this crate are RFC 3339; plain
/// SQLite `datetime('now')` values are accepted as UTC.
pub(crate) fn parse_timestamp(value: &str) -> DateTime<Utc> {
    value
        .parse::<DateTime<Utc>>()
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", value, e);
            DateTime::default()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_timestamp_styles() {
        let rfc = parse_timestamp("2025-03-01T10:00:00.000000Z");
        let sqlite = parse_timestamp("2025-03-01 10:00:00");
        assert_eq!(rfc, sqlite);
        assert_eq!(parse_timestamp("garbage"), DateTime::<Utc>::default());
    }
}
