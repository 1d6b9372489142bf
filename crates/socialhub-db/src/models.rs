//! Database row types. These map directly to SQLite rows and stay
//! separate from the socialhub-types API shapes.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub two_factor_enabled: bool,
    pub two_factor_secret: Option<String>,
    pub is_verified: bool,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct SocialAccountRow {
    pub id: String,
    pub user_id: String,
    pub provider: String,
    pub provider_id: String,
    pub username: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<String>,
    pub instance_url: Option<String>,
    pub created_at: String,
    pub connected_at: String,
}

/// Input to the social account upsert. Identity is
/// (`user_id`, `provider`, `provider_id`); everything else is refreshed.
pub struct NewSocialAccount<'a> {
    pub user_id: &'a str,
    pub provider: &'a str,
    pub provider_id: &'a str,
    pub username: &'a str,
    pub access_token: &'a str,
    pub refresh_token: Option<&'a str>,
    pub expires_at: Option<&'a str>,
    pub instance_url: Option<&'a str>,
}

pub struct PostRow {
    pub id: String,
    pub user_id: String,
    pub content: String,
    pub is_instant: bool,
    pub scheduled_at: Option<String>,
    pub status: String,
    pub created_at: String,
}

pub struct PostHistoryRow {
    pub id: String,
    pub post_id: String,
    pub social_account_id: Option<String>,
    pub published_at: String,
    pub result: Option<String>,
}
