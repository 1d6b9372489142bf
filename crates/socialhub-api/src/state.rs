use std::sync::Arc;

use socialhub_crypto::state::StateSigner;
use socialhub_db::Database;
use socialhub_providers::ProviderRegistry;

pub type AppState = Arc<AppStateInner>;

/// Settings the API needs from the server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub jwt_secret: String,
    /// Base URL provider callbacks redirect the browser back to.
    pub frontend_url: String,
    /// Include raw provider errors in responses (non-production only).
    pub expose_error_details: bool,
}

pub struct AppStateInner {
    pub db: Database,
    pub providers: ProviderRegistry,
    pub jwt_secret: String,
    pub state_signer: StateSigner,
    pub frontend_url: String,
    pub expose_error_details: bool,
}

impl AppStateInner {
    pub fn new(db: Database, providers: ProviderRegistry, config: ApiConfig) -> anyhow::Result<AppState> {
        let state_signer = StateSigner::new(&config.jwt_secret)?;

        Ok(Arc::new(Self {
            db,
            providers,
            jwt_secret: config.jwt_secret,
            state_signer,
            frontend_url: config.frontend_url.trim_end_matches('/').to_string(),
            expose_error_details: config.expose_error_details,
        }))
    }
}
